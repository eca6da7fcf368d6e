//! Trend analysis commands.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde_json::json;

use reportfeed_live::LiveState;
use reportfeed_live::screens::TrendCapsule;

use super::watch;
use crate::app::{App, NOT_SIGNED_IN};
use crate::cli::GlobalArgs;
use crate::output;
use crate::session::Backend;

type Capsule = TrendCapsule<Arc<Backend>, Arc<Backend>>;

#[derive(Args, Debug)]
pub struct TrendCommand {
    #[command(subcommand)]
    pub command: TrendSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum TrendSubcommand {
    /// Show the latest trend analysis
    Show(ShowArgs),

    /// Keep the latest analysis on screen as new ones arrive
    Watch,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn handle(cmd: TrendCommand, global: &GlobalArgs) -> Result<()> {
    let app = App::open(global).await?;
    let capsule = Capsule::new(app.backend.clone(), app.backend.clone())
        .context("Failed to set up trend view")?;

    match cmd.command {
        TrendSubcommand::Show(args) => show(&capsule, args).await,
        TrendSubcommand::Watch => watch::host(capsule.live(), render).await,
    }
}

async fn show(capsule: &Capsule, args: ShowArgs) -> Result<()> {
    capsule.live().activate().await;
    let state = capsule.live().state();
    capsule.live().deactivate();

    match &state {
        LiveState::Unauthenticated => bail!(NOT_SIGNED_IN),
        LiveState::Error { message, .. } => {
            return Err(anyhow!(message.clone()).context("Failed to load trend analysis"));
        }
        _ => {}
    }

    let latest = Capsule::latest_in(&state);
    if args.json {
        return output::json(&json!({ "trends": latest }));
    }
    print_latest(latest.as_deref());
    Ok(())
}

fn render(state: &LiveState) -> Result<()> {
    match state {
        LiveState::Ready(_) | LiveState::Empty => print_latest(Capsule::latest_in(state).as_deref()),
        other => output::status(other),
    }
    Ok(())
}

fn print_latest(latest: Option<&str>) {
    println!("{}", "Trend analysis".bold());
    match latest {
        Some(text) => println!("{}", text),
        None => println!("{}", "No trend analysis available yet.".dimmed()),
    }
}
