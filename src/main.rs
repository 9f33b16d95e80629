use clap::Parser;
use git_lineage::commands::lineage_handlers;

#[derive(Parser)]
#[command(name = "git-lineage")]
#[command(about = "feature-branch history and safe commit message rewriting", long_about = None)]
#[command(disable_help_flag = true, disable_version_flag = true)]
struct Cli {
    /// Command and arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    lineage_handlers::handle_lineage(&cli.args);
}
