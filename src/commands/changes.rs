use crate::commands::lineage_handlers::{CommandContext, exit_with_error};
use crate::diff::DiffParser;
use crate::error::LineageError;
use crate::models::FileStatus;
use crate::utils::short_hash;

pub fn handle_changes(global_args: &[String], args: &[String]) {
    if let Err(e) = run_changes(global_args, args) {
        exit_with_error(e);
    }
}

fn run_changes(global_args: &[String], args: &[String]) -> Result<(), LineageError> {
    let mut json = false;
    let mut commit: Option<&str> = None;
    for arg in args {
        match arg.as_str() {
            "--json" => json = true,
            other if other.starts_with("--") => {
                return Err(LineageError::Generic(format!(
                    "Unknown changes argument: {}",
                    other
                )));
            }
            other if commit.is_none() => commit = Some(other),
            other => {
                return Err(LineageError::Generic(format!(
                    "changes takes a single commit, got extra argument {}",
                    other
                )));
            }
        }
    }
    let commit = commit
        .ok_or_else(|| LineageError::Generic("changes requires a commit".to_string()))?;

    let ctx = CommandContext::open(global_args)?;
    let parser = DiffParser::new(&ctx.repo, &ctx.config, ctx.logger.clone());
    let commit = parser.read_commit(commit)?;

    if json {
        println!("{}", serde_json::to_string(&commit)?);
        return Ok(());
    }

    println!("{} {}", short_hash(&commit.hash), commit.subject());
    println!("Author: {} <{}>", commit.author_name, commit.author_email);
    println!("Date:   {}", commit.timestamp.to_rfc3339());
    println!();
    println!("{}", commit.changes.summary);
    for file in &commit.changes.file_changes {
        let marker = match file.status {
            FileStatus::Added => "A",
            FileStatus::Modified => "M",
            FileStatus::Deleted => "D",
            FileStatus::Renamed => "R",
        };
        let counts = if file.binary {
            "binary".to_string()
        } else {
            format!("+{} -{}", file.insertions, file.deletions)
        };
        match &file.previous_filename {
            Some(previous) => println!(
                "  {} {:>12}  {} -> {}  [{}]",
                marker,
                counts,
                previous,
                file.filename,
                file.category.as_str()
            ),
            None => println!(
                "  {} {:>12}  {}  [{}]",
                marker,
                counts,
                file.filename,
                file.category.as_str()
            ),
        }
    }
    for warning in &commit.changes.integrity_warnings {
        println!("  warning: {}", warning);
    }
    Ok(())
}
