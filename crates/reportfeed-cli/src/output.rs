//! Output formatting helpers.

use anyhow::Result;
use chrono::Local;
use colored::Colorize;
use serde::Serialize;

use reportfeed_core::Identity;
use reportfeed_live::LiveState;
use reportfeed_live::screens::Report;

/// Print a success message.
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print an error message.
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a labeled field.
pub fn field(label: &str, value: &str) {
    println!("{}: {}", label.dimmed(), value);
}

/// Print a value as compact JSON.
pub fn json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string(value)?;
    println!("{}", json);
    Ok(())
}

/// Print a value as pretty-printed JSON.
pub fn json_pretty<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn identity(identity: &Identity) {
    field("User", identity.id.as_str());
    if let Some(email) = &identity.email {
        field("Email", email);
    }
    if let Some(name) = &identity.display_name {
        field("Name", name);
    }
}

/// One report as a header line plus its body.
pub fn report(report: &Report) {
    let created = report.created_at.with_timezone(&Local);
    println!(
        "{} {} {}",
        created.format("%Y-%m-%d %H:%M").to_string().dimmed(),
        report.title().bold(),
        format!("({})", report.id).dimmed()
    );
    for line in report.body().lines() {
        println!("  {}", line);
    }
}

/// A one-line status for states that carry no records of their own.
pub fn status(state: &LiveState) {
    match state {
        LiveState::Loading => eprintln!("{}", "Loading...".dimmed()),
        LiveState::Empty => eprintln!("{}", "No data yet.".dimmed()),
        LiveState::Error { message, stale } => {
            error(message);
            if stale.is_some() {
                eprintln!("{}", "Showing the last loaded data.".dimmed());
            }
        }
        LiveState::Unauthenticated => error("Session ended. Run 'reportfeed auth login'."),
        LiveState::Ready(_) => {}
    }
}
