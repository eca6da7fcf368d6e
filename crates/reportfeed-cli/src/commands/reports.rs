//! Report commands.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Subcommand};
use colored::Colorize;

use reportfeed_live::LiveState;
use reportfeed_live::screens::{Report, ReportsFeed};

use super::watch;
use crate::app::{App, NOT_SIGNED_IN};
use crate::cli::GlobalArgs;
use crate::output;
use crate::session::Backend;

type Feed = ReportsFeed<Arc<Backend>, Arc<Backend>>;

#[derive(Args, Debug)]
pub struct ReportsCommand {
    #[command(subcommand)]
    pub command: ReportsSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum ReportsSubcommand {
    /// List your reports, newest first
    List(ListArgs),

    /// Create a report
    Create(CreateArgs),

    /// Keep the list on screen and refresh it as reports change
    Watch,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Report title (defaults to "Untitled Report")
    #[arg(long)]
    pub title: Option<String>,

    /// Report body
    pub content: String,
}

pub async fn handle(cmd: ReportsCommand, global: &GlobalArgs) -> Result<()> {
    let app = App::open(global).await?;
    let feed = ReportsFeed::new(app.backend.clone(), app.backend.clone())
        .context("Failed to set up reports feed")?;

    match cmd.command {
        ReportsSubcommand::List(args) => list(&feed, args).await,
        ReportsSubcommand::Create(args) => create(&feed, args).await,
        ReportsSubcommand::Watch => watch::host(feed.live(), render).await,
    }
}

async fn list(feed: &Feed, args: ListArgs) -> Result<()> {
    feed.live().activate().await;
    let state = feed.live().state();
    feed.live().deactivate();

    let reports = match &state {
        LiveState::Unauthenticated => bail!(NOT_SIGNED_IN),
        LiveState::Error { message, .. } => {
            return Err(anyhow!(message.clone()).context("Failed to load reports"));
        }
        _ => Feed::decode(&state)?,
    };

    if args.json {
        output::json(&reports)?;
        return Ok(());
    }
    print_reports(&reports);
    Ok(())
}

async fn create(feed: &Feed, args: CreateArgs) -> Result<()> {
    let report = feed
        .create_report(args.title.as_deref(), &args.content)
        .await
        .map_err(|e| {
            if e.is_auth() {
                anyhow!(NOT_SIGNED_IN)
            } else {
                anyhow!(e).context("Failed to create report")
            }
        })?;

    output::success("Report created");
    println!();
    output::report(&report);
    Ok(())
}

fn render(state: &LiveState) -> Result<()> {
    match state {
        LiveState::Ready(_) => {
            println!("{}", "──".dimmed());
            print_reports(&Feed::decode(state)?);
        }
        LiveState::Error { stale: Some(_), .. } => {
            output::status(state);
            print_reports(&Feed::decode(state)?);
        }
        other => output::status(other),
    }
    Ok(())
}

fn print_reports(reports: &[Report]) {
    if reports.is_empty() {
        println!("{}", "No reports yet.".dimmed());
        return;
    }
    for (i, report) in reports.iter().enumerate() {
        if i > 0 {
            println!();
        }
        output::report(report);
    }
}
