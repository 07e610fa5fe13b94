use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "mcpeval",
    version,
    about = "Run tool-use benchmark tasks against one or more MCP servers"
)]
pub struct Cli {
    /// Configuration file (defaults to config/mcpeval.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// MCP server as `path_or_package[:args][^KEY=value,...]`; replaces the configured servers
    #[arg(long = "server", value_name = "SPEC")]
    pub servers: Vec<String>,
    /// Task file: JSON array, `{ "tasks": [...] }` or JSON Lines
    #[arg(long)]
    pub tasks: PathBuf,
    /// Run ledger to append trajectories to and resume from
    #[arg(long)]
    pub output: Option<PathBuf>,
    #[arg(long)]
    pub provider: Option<String>,
    #[arg(long)]
    pub model: Option<String>,
    #[arg(long)]
    pub max_turns: Option<u32>,
    #[arg(long)]
    pub concurrency: Option<usize>,
    /// Per tool call timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub tool_timeout: Option<u64>,
    /// Ignore the ledger and run every task again
    #[arg(long)]
    pub force_rerun: bool,
    /// Rerun tasks whose latest ledger record is an error
    #[arg(long)]
    pub retry_errors: bool,
    /// System prompt for every conversation
    #[arg(long)]
    pub system: Option<String>,
    /// Debug logging (RUST_LOG still takes precedence)
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn servers_are_repeatable_and_flags_parse() {
        let cli = Cli::try_parse_from([
            "mcpeval",
            "--tasks",
            "tasks.json",
            "--server",
            "weather.py",
            "--server",
            "@acme/hotels^API_KEY=x",
            "--max-turns",
            "5",
            "--retry-errors",
            "-v",
        ])
        .expect("parse");
        assert_eq!(cli.servers.len(), 2);
        assert_eq!(cli.max_turns, Some(5));
        assert!(cli.retry_errors && cli.verbose && !cli.force_rerun);
    }

    #[test]
    fn tasks_are_required() {
        assert!(Cli::try_parse_from(["mcpeval"]).is_err());
    }
}
