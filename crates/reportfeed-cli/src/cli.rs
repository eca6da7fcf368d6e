//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::commands::auth::AuthCommand;
use crate::commands::reports::ReportsCommand;
use crate::commands::theme::ThemeCommand;
use crate::commands::trend::TrendCommand;

/// Terminal client for reportfeed.
#[derive(Parser, Debug)]
#[command(name = "reportfeed")]
#[command(author, version = env!("REPORTFEED_VERSION"), about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Backend URL: file:// for a local store, http(s):// for a hosted project.
    /// Defaults to a local store in the data directory.
    #[arg(long, env = "REPORTFEED_BACKEND", global = true)]
    pub backend: Option<String>,

    /// Anonymous API key of the hosted project
    #[arg(long, env = "REPORTFEED_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// Directory for the session, preferences and the default local store
    #[arg(long, env = "REPORTFEED_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in, sign up and manage the profile
    Auth(AuthCommand),

    /// List, create and watch reports
    Reports(ReportsCommand),

    /// Show the latest trend analysis
    Trend(TrendCommand),

    /// Show or toggle the colour theme
    Theme(ThemeCommand),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn arguments_are_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "reportfeed",
            "reports",
            "list",
            "--backend",
            "file:///tmp/store",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.global.backend.as_deref(), Some("file:///tmp/store"));
        assert_eq!(cli.global.verbose, 2);
    }
}
