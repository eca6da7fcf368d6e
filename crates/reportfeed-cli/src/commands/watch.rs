//! Hosts a live query on the terminal until stdin closes.

use anyhow::{Context, Result, bail};
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use reportfeed_core::{RemoteStore, SessionProvider};
use reportfeed_live::{LiveQuery, LiveState, RefreshReason};

use crate::app::NOT_SIGNED_IN;

/// Activate `live`, render every state it publishes, and map stdin lines to
/// refreshes: an empty line pulls to refresh, `f` reports regained focus,
/// `q` or end of input stops.
pub async fn host<S, P>(
    live: &LiveQuery<S, P>,
    render: impl Fn(&LiveState) -> Result<()>,
) -> Result<()>
where
    S: RemoteStore + 'static,
    P: SessionProvider + 'static,
{
    live.activate().await;
    if live.state() == LiveState::Unauthenticated {
        bail!(NOT_SIGNED_IN);
    }

    eprintln!(
        "{}",
        "Watching. Enter: refresh, f: focus regained, q: quit.".dimmed()
    );

    let mut states = live.watch();
    let first = states.borrow_and_update().clone();
    render(&first)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let outcome = loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let state = states.borrow_and_update().clone();
                if let Err(e) = render(&state) {
                    break Err(e);
                }
                if state == LiveState::Unauthenticated {
                    break Err(anyhow::anyhow!(NOT_SIGNED_IN));
                }
            }
            line = lines.next_line() => {
                let line = match line.context("Failed to read stdin") {
                    Ok(Some(line)) => line,
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(e),
                };
                // Results arrive as state changes, so the loop keeps rendering
                // and reading input while a fetch runs.
                let reason = match line.trim() {
                    "" => RefreshReason::PullToRefresh,
                    "f" => RefreshReason::FocusRegained,
                    "q" => break Ok(()),
                    other => {
                        eprintln!("{} {}", "Unknown input:".yellow(), other);
                        continue;
                    }
                };
                if !live.request_refresh(reason) {
                    debug!(%reason, "refresh not accepted");
                }
            }
        }
    };

    debug!("Stopping watch");
    live.deactivate();
    outcome
}
