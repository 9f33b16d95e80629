use crate::commands;
use crate::config::Config;
use crate::error::LineageError;
use crate::git::{Repository, find_repository};
use crate::logging::Logger;

/// What every repository command needs: configuration, a logger and the repository.
pub struct CommandContext {
    pub config: Config,
    pub logger: Logger,
    pub repo: Repository,
}

impl CommandContext {
    pub fn open(global_args: &[String]) -> Result<CommandContext, LineageError> {
        let config = Config::load(&Logger::stderr(false));
        let logger = Logger::stderr(config.debug());
        let repo = find_repository(global_args, &config)?;
        logger.debug(&format!("Using repository at {}", repo.workdir().display()));
        Ok(CommandContext {
            config,
            logger,
            repo,
        })
    }
}

/// Entry point for `git-lineage [-C <path>] <command> [args...]`.
pub fn handle_lineage(args: &[String]) {
    let mut global_args: Vec<String> = Vec::new();
    let mut rest = args;
    while rest.len() >= 2 && rest[0] == "-C" {
        global_args.push("-C".to_string());
        global_args.push(rest[1].clone());
        rest = &rest[2..];
    }

    if rest.is_empty() {
        print_help();
        return;
    }

    let command_args = &rest[1..];
    match rest[0].as_str() {
        "help" | "--help" | "-h" => {
            print_help();
        }
        "version" | "--version" | "-v" => {
            if cfg!(debug_assertions) {
                println!("{} (debug)", env!("CARGO_PKG_VERSION"));
            } else {
                println!(env!("CARGO_PKG_VERSION"));
            }
        }
        "branches" => commands::branches::handle_branches(&global_args, command_args),
        "changes" => commands::changes::handle_changes(&global_args, command_args),
        "safety" => commands::rewrite::handle_safety(&global_args, command_args),
        "plan" => commands::rewrite::handle_plan(&global_args, command_args),
        "rewrite" => commands::rewrite::handle_rewrite(&global_args, command_args),
        "rollback" => commands::rewrite::handle_rollback(&global_args, command_args),
        other => {
            eprintln!("Unknown git-lineage command: {}", other);
            print_help();
            std::process::exit(1);
        }
    }
}

/// Print `e` and exit with status 1.
pub fn exit_with_error(e: LineageError) -> ! {
    eprintln!("Error: {}", e);
    std::process::exit(1);
}

fn print_help() {
    eprintln!("git-lineage - feature-branch history and safe commit message rewriting");
    eprintln!();
    eprintln!("Usage: git-lineage [-C <path>] <command> [args...]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  branches           Reconstruct feature branches from recent merge commits");
    eprintln!("    --since-days <n>       Look back n days (default 30)");
    eprintln!("    --processed <hash>     Skip a merge already handled (repeatable)");
    eprintln!("    --json                 Output in JSON format");
    eprintln!("  changes <commit>   Show the structured changes of one commit");
    eprintln!("    --json                 Output in JSON format");
    eprintln!("  safety <commit>... Check whether commits can be rewritten safely");
    eprintln!("    --json                 Output in JSON format");
    eprintln!("  plan <commit>...   Plan a message rewrite and print the plan as JSON");
    eprintln!("    --message <commit>=<msg>  Use this message instead of a suggestion (repeatable)");
    eprintln!("    --output <file>           Write the plan to a file instead of stdout");
    eprintln!("  rewrite            Execute a plan");
    eprintln!("    --plan <file>          Plan produced by `plan`");
    eprintln!("    --token <token>        The plan's confirmation token");
    eprintln!("  rollback <ref>     Hard-reset the current branch to a backup branch or tag");
    eprintln!("  version, -v        Print the git-lineage version");
    eprintln!("  help, -h           Show this help message");
    eprintln!();
}
