use std::fs;

use crate::commands::lineage_handlers::{CommandContext, exit_with_error};
use crate::error::LineageError;
use crate::git::GitGateway;
use crate::models::Commit;
use crate::rewrite::{
    ConventionalMessageSuggester, DigestTokenAuthority, FixedMessageSuggester, MessageSuggester,
    RewriteExecutor, RewritePlan, RewritePlanner, RewriteState, SafetyGate,
};
use crate::utils::short_hash;

/// Messages given with `--message` win; everything else gets a conventional-commit suggestion.
struct CliMessageSuggester {
    fixed: FixedMessageSuggester,
    fallback: ConventionalMessageSuggester,
}

impl MessageSuggester for CliMessageSuggester {
    fn suggest(&self, commit: &Commit) -> Result<String, LineageError> {
        match self.fixed.suggest(commit) {
            Err(LineageError::NotFound(_)) => self.fallback.suggest(commit),
            other => other,
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PlanArgs {
    pub commits: Vec<String>,
    pub messages: Vec<(String, String)>,
    pub output: Option<String>,
}

pub fn parse_plan_args(args: &[String]) -> Result<PlanArgs, LineageError> {
    let mut parsed = PlanArgs::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--message" | "-m" => {
                i += 1;
                let value = args.get(i).ok_or_else(|| {
                    LineageError::Generic("--message requires <commit>=<message>".to_string())
                })?;
                let Some((commit, message)) = value.split_once('=') else {
                    return Err(LineageError::Generic(format!(
                        "Invalid --message value (expected <commit>=<message>): {}",
                        value
                    )));
                };
                if commit.is_empty() || message.trim().is_empty() {
                    return Err(LineageError::Generic(format!(
                        "Invalid --message value (expected <commit>=<message>): {}",
                        value
                    )));
                }
                parsed
                    .messages
                    .push((commit.to_string(), message.to_string()));
            }
            "--output" | "-o" => {
                i += 1;
                let value = args.get(i).ok_or_else(|| {
                    LineageError::Generic("--output requires a file path".to_string())
                })?;
                parsed.output = Some(value.clone());
            }
            other if other.starts_with('-') => {
                return Err(LineageError::Generic(format!(
                    "Unknown plan argument: {}",
                    other
                )));
            }
            other => parsed.commits.push(other.to_string()),
        }
        i += 1;
    }
    if parsed.commits.is_empty() {
        return Err(LineageError::Generic(
            "plan requires at least one commit".to_string(),
        ));
    }
    Ok(parsed)
}

/// Key each `--message` by the full hash of the planned commit it names.
///
/// A key that resolves to no planned commit is an error rather than a silent fallback.
pub fn fixed_messages(
    gateway: &dyn GitGateway,
    commits: &[String],
    messages: &[(String, String)],
) -> Result<FixedMessageSuggester, LineageError> {
    let mut targets = Vec::with_capacity(commits.len());
    for commit in commits {
        targets.push(gateway.resolve_commit(commit)?);
    }

    let mut fixed = FixedMessageSuggester::default();
    for (commit, message) in messages {
        let hash = gateway.resolve_commit(commit)?;
        if !targets.contains(&hash) {
            return Err(LineageError::Generic(format!(
                "--message names {} ({}), which is not a planned commit",
                commit,
                short_hash(&hash)
            )));
        }
        fixed.insert(&hash, message);
    }
    Ok(fixed)
}

pub fn handle_safety(global_args: &[String], args: &[String]) {
    match run_safety(global_args, args) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => exit_with_error(e),
    }
}

fn run_safety(global_args: &[String], args: &[String]) -> Result<bool, LineageError> {
    let json = args.iter().any(|a| a == "--json");
    let commits: Vec<String> = args.iter().filter(|a| *a != "--json").cloned().collect();
    if commits.is_empty() {
        return Err(LineageError::Generic(
            "safety requires at least one commit".to_string(),
        ));
    }

    let ctx = CommandContext::open(global_args)?;
    let mut resolved = Vec::with_capacity(commits.len());
    for commit in &commits {
        resolved.push(ctx.repo.resolve_commit(commit)?);
    }
    let assessment = SafetyGate::new(&ctx.repo, &ctx.config).perform_safety_checks(&resolved);

    if json {
        println!("{}", serde_json::to_string(&assessment)?);
    } else {
        if assessment.safe {
            println!("Safe to rewrite {} commit(s)", resolved.len());
        } else {
            println!(
                "Unsafe: {}",
                assessment.reason.as_deref().unwrap_or("unknown reason")
            );
        }
        for warning in &assessment.warnings {
            println!("  warning: {}", warning);
        }
        for recommendation in &assessment.recommendations {
            println!("  hint: {}", recommendation);
        }
    }
    Ok(assessment.safe)
}

pub fn handle_plan(global_args: &[String], args: &[String]) {
    if let Err(e) = run_plan(global_args, args) {
        exit_with_error(e);
    }
}

fn run_plan(global_args: &[String], args: &[String]) -> Result<(), LineageError> {
    let parsed = parse_plan_args(args)?;
    let ctx = CommandContext::open(global_args)?;

    let suggester = CliMessageSuggester {
        fixed: fixed_messages(&ctx.repo, &parsed.commits, &parsed.messages)?,
        fallback: ConventionalMessageSuggester,
    };
    let tokens = DigestTokenAuthority;
    let planner = RewritePlanner::new(
        &ctx.repo,
        &ctx.config,
        ctx.logger.clone(),
        &suggester,
        &tokens,
    );
    let plan = planner.create_rewrite_plan(&parsed.commits)?;
    let json = serde_json::to_string_pretty(&plan)?;

    match &parsed.output {
        Some(path) => {
            fs::write(path, format!("{}\n", json))?;
            eprintln!("Plan written to {}", path);
        }
        None => println!("{}", json),
    }

    if plan.safety_check.safe {
        eprintln!(
            "Run `git-lineage rewrite --plan <file> --token {}` before {} to apply it",
            plan.confirmation_token,
            plan.expires_at.format("%H:%M:%S UTC")
        );
    } else {
        eprintln!(
            "This plan cannot be executed: {}",
            plan.safety_check
                .reason
                .as_deref()
                .unwrap_or("safety checks failed")
        );
    }
    Ok(())
}

pub fn handle_rewrite(global_args: &[String], args: &[String]) {
    if let Err(e) = run_rewrite(global_args, args) {
        exit_with_error(e);
    }
}

fn run_rewrite(global_args: &[String], args: &[String]) -> Result<(), LineageError> {
    let mut plan_path: Option<String> = None;
    let mut token: Option<String> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--plan" => {
                i += 1;
                plan_path = Some(args.get(i).cloned().ok_or_else(|| {
                    LineageError::Generic("--plan requires a file path".to_string())
                })?);
            }
            "--token" => {
                i += 1;
                token = Some(args.get(i).cloned().ok_or_else(|| {
                    LineageError::Generic("--token requires a value".to_string())
                })?);
            }
            other => {
                return Err(LineageError::Generic(format!(
                    "Unknown rewrite argument: {}",
                    other
                )));
            }
        }
        i += 1;
    }
    let plan_path =
        plan_path.ok_or_else(|| LineageError::Generic("rewrite requires --plan".to_string()))?;
    let token =
        token.ok_or_else(|| LineageError::Generic("rewrite requires --token".to_string()))?;

    let plan: RewritePlan = serde_json::from_str(&fs::read_to_string(&plan_path)?)?;
    let ctx = CommandContext::open(global_args)?;
    let tokens = DigestTokenAuthority;
    let executor = RewriteExecutor::for_repository(&ctx.repo, &ctx.config, ctx.logger.clone(), &tokens);
    let result = executor.rewrite_commit_messages(&plan, &token)?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    for commit in &result.commits {
        match (&commit.new_hash, &commit.error) {
            (Some(new_hash), _) if commit.success => eprintln!(
                "{} -> {}",
                short_hash(&commit.original_hash),
                short_hash(new_hash)
            ),
            (_, error) => eprintln!(
                "{} failed: {}",
                short_hash(&commit.original_hash),
                error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
    eprintln!(
        "Backup kept at branch {} and tag {}",
        result.backup.branch_name, result.backup.tag_name
    );

    if result.state == RewriteState::PartiallyFailed {
        exit_with_error(LineageError::PartialFailure {
            failed: result.failed_count(),
            total: result.commits.len(),
        });
    }
    Ok(())
}

pub fn handle_rollback(global_args: &[String], args: &[String]) {
    if let Err(e) = run_rollback(global_args, args) {
        exit_with_error(e);
    }
}

fn run_rollback(global_args: &[String], args: &[String]) -> Result<(), LineageError> {
    let [backup_ref] = args else {
        return Err(LineageError::Generic(
            "rollback requires exactly one backup branch or tag".to_string(),
        ));
    };

    let ctx = CommandContext::open(global_args)?;
    let tokens = DigestTokenAuthority;
    let executor = RewriteExecutor::for_repository(&ctx.repo, &ctx.config, ctx.logger.clone(), &tokens);
    let head = executor.rollback_to_backup(backup_ref)?;

    println!(
        "{}",
        serde_json::json!({
            "state": RewriteState::RolledBack,
            "backup_ref": backup_ref,
            "head": head,
        })
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::diff::DiffParser;
    use crate::git::test_utils::TmpRepo;
    use crate::logging::Logger;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_plan_args() {
        let parsed = parse_plan_args(&args(&[
            "abc1234",
            "--message",
            "abc1234=fix: handle empty input",
            "def5678",
            "-o",
            "plan.json",
        ]))
        .unwrap();
        assert_eq!(parsed.commits, vec!["abc1234", "def5678"]);
        assert_eq!(
            parsed.messages,
            vec![(
                "abc1234".to_string(),
                "fix: handle empty input".to_string()
            )]
        );
        assert_eq!(parsed.output.as_deref(), Some("plan.json"));
    }

    #[test]
    fn test_parse_plan_args_message_may_contain_equals() {
        let parsed = parse_plan_args(&args(&["abc1", "-m", "abc1=chore: set a=b"])).unwrap();
        assert_eq!(parsed.messages[0].1, "chore: set a=b");
    }

    #[test]
    fn test_message_keys_resolve_to_planned_commits() {
        let tmp = TmpRepo::new().unwrap();
        tmp.write_file("a.txt", "a\n").unwrap();
        let first = tmp.commit("initial").unwrap();
        tmp.write_file("b.txt", "b\n").unwrap();
        let head = tmp.commit("wip").unwrap();

        let fixed = fixed_messages(
            tmp.repo(),
            &args(&["HEAD"]),
            &[("HEAD".to_string(), "feat: my words".to_string())],
        )
        .unwrap();
        let commit = DiffParser::new(tmp.repo(), &Config::default(), Logger::quiet())
            .read_commit(&head)
            .unwrap();
        assert_eq!(fixed.suggest(&commit).unwrap(), "feat: my words");

        let err = fixed_messages(
            tmp.repo(),
            &args(&["HEAD"]),
            &[(first[..8].to_string(), "fix: elsewhere".to_string())],
        )
        .unwrap_err();
        assert!(err.to_string().contains("not a planned commit"));

        assert!(matches!(
            fixed_messages(
                tmp.repo(),
                &args(&["HEAD"]),
                &[("no-such-rev".to_string(), "fix: x".to_string())],
            ),
            Err(LineageError::NotFound(_))
        ));
    }

    #[test]
    fn test_parse_plan_args_errors() {
        assert!(parse_plan_args(&[]).is_err());
        assert!(parse_plan_args(&args(&["abc1", "--message"])).is_err());
        assert!(parse_plan_args(&args(&["abc1", "--message", "no-equals"])).is_err());
        assert!(parse_plan_args(&args(&["abc1", "--message", "abc1=  "])).is_err());
        assert!(parse_plan_args(&args(&["abc1", "--force"])).is_err());
    }
}
