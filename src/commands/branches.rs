use std::collections::HashSet;

use crate::branches::BranchReconstructor;
use crate::commands::lineage_handlers::{CommandContext, exit_with_error};
use crate::error::LineageError;
use crate::git::GitGateway;
use crate::models::{ContributorRole, FeatureBranch};
use crate::utils::short_hash;

pub const DEFAULT_SINCE_DAYS: u32 = 30;

#[derive(Debug, PartialEq, Eq)]
pub struct BranchesArgs {
    pub since_days: u32,
    pub processed: HashSet<String>,
    pub json: bool,
}

pub fn parse_branches_args(args: &[String]) -> Result<BranchesArgs, LineageError> {
    let mut parsed = BranchesArgs {
        since_days: DEFAULT_SINCE_DAYS,
        processed: HashSet::new(),
        json: false,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--json" => parsed.json = true,
            "--since-days" => {
                i += 1;
                let value = args.get(i).ok_or_else(|| {
                    LineageError::Generic("--since-days requires a value".to_string())
                })?;
                parsed.since_days = value.parse::<u32>().map_err(|_| {
                    LineageError::Generic(format!("Invalid --since-days value: {}", value))
                })?;
            }
            "--processed" => {
                i += 1;
                let value = args.get(i).ok_or_else(|| {
                    LineageError::Generic("--processed requires a commit hash".to_string())
                })?;
                parsed.processed.insert(value.clone());
            }
            other => {
                return Err(LineageError::Generic(format!(
                    "Unknown branches argument: {}",
                    other
                )));
            }
        }
        i += 1;
    }
    Ok(parsed)
}

pub fn handle_branches(global_args: &[String], args: &[String]) {
    if let Err(e) = run_branches(global_args, args) {
        exit_with_error(e);
    }
}

fn run_branches(global_args: &[String], args: &[String]) -> Result<(), LineageError> {
    let parsed = parse_branches_args(args)?;
    let ctx = CommandContext::open(global_args)?;

    // Processed hashes may be abbreviated
    let mut processed = HashSet::new();
    for hash in &parsed.processed {
        processed.insert(ctx.repo.resolve_commit(hash)?);
    }

    let reconstructor = BranchReconstructor::new(&ctx.repo, &ctx.config, ctx.logger.clone());
    let branches = reconstructor.reconstruct_feature_branches(parsed.since_days, &processed);

    if parsed.json {
        println!("{}", serde_json::to_string(&branches)?);
    } else if branches.is_empty() {
        eprintln!(
            "No feature branches merged in the last {} day(s)",
            parsed.since_days
        );
    } else {
        for branch in &branches {
            print_branch(branch);
        }
    }
    Ok(())
}

fn print_branch(branch: &FeatureBranch) {
    println!(
        "{}  merged {} in {}  ({} commit{})",
        branch.name,
        branch.merged_at.format("%Y-%m-%d"),
        short_hash(&branch.merge_commit.hash),
        branch.commits.len(),
        if branch.commits.len() == 1 { "" } else { "s" }
    );
    println!("  {}", branch.description);

    let people: Vec<String> = branch
        .contributors
        .iter()
        .map(|c| match c.role {
            ContributorRole::Author => format!(
                "{} ({} commit{}, +{}/-{})",
                c.name,
                c.commit_count,
                if c.commit_count == 1 { "" } else { "s" },
                c.lines_added,
                c.lines_removed
            ),
            ContributorRole::Merger => format!("{} (merger)", c.name),
            ContributorRole::CoAuthor => format!("{} (co-author)", c.name),
        })
        .collect();
    println!("  Contributors: {}", people.join(", "));

    if let Some(pr) = &branch.pull_request
        && let Some(number) = pr.number
    {
        println!("  Pull request: #{}", number);
    }
    if let Some(takeaways) = &branch.key_takeaways {
        for takeaway in takeaways {
            println!("  - {}", takeaway);
        }
    }
    println!();
}
