//! reportfeed - terminal client for the reportfeed backend.
//!
//! Hosts the screen bindings from `reportfeed-live` on a terminal: one-shot
//! commands for listing and creating, and `watch` commands that keep a live
//! query running until stdin closes.

mod app;
mod cli;
mod commands;
mod output;
mod session;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use commands::{auth, reports, theme, trend};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.global.verbose, cli.global.json_logs);

    match cli.command {
        Commands::Auth(cmd) => auth::handle(cmd, &cli.global).await,
        Commands::Reports(cmd) => reports::handle(cmd, &cli.global).await,
        Commands::Trend(cmd) => trend::handle(cmd, &cli.global).await,
        Commands::Theme(cmd) => theme::handle(cmd, &cli.global).await,
    }
}

fn init_logging(verbosity: u8, json: bool) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so stdout stays parseable.
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}
