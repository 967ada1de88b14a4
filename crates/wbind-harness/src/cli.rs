use clap::{Parser, Subcommand};

use crate::error::Result;
use crate::inspect::{WatchizeArgs, run_watchize};
use crate::logging::{self, ENV_LOG, LogFormat};
use crate::replay::{ReplayArgs, run_replay};

#[derive(Debug, Parser)]
#[command(
    name = "wbind-harness",
    about = "Replay edit scripts against observable resource payloads",
    version
)]
pub struct Cli {
    /// Log output format (written to stderr).
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Log filter directive, e.g. `debug` or `wbind_core=trace`.
    #[arg(long, global = true, env = ENV_LOG)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Apply an edit script to a payload and report commits.
    Replay(ReplayArgs),

    /// Round-trip a document through an observable graph.
    Watchize(WatchizeArgs),
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}

pub fn run(cli: Cli) -> Result<()> {
    logging::init(cli.log_format, cli.log_level.as_deref())?;
    match cli.command {
        Commands::Replay(args) => run_replay(args),
        Commands::Watchize(args) => run_watchize(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_replay_with_globals() {
        let cli = Cli::try_parse_from([
            "wbind-harness",
            "replay",
            "--payload",
            "p.json",
            "--script",
            "s.json",
            "--json",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Commands::Replay(args) => {
                assert!(args.json);
                assert!(args.store.is_none());
            }
            Commands::Watchize(_) => panic!("wrong subcommand"),
        }
    }
}
