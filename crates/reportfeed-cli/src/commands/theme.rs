//! Theme preference commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

use reportfeed_live::{Theme, ThemeStore};

use crate::app;
use crate::cli::GlobalArgs;
use crate::output;

/// Terminals give no reliable light/dark hint.
const PLATFORM_DEFAULT: Theme = Theme::Light;

#[derive(Args, Debug)]
pub struct ThemeCommand {
    #[command(subcommand)]
    pub command: ThemeSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum ThemeSubcommand {
    /// Show the current theme
    Show(ShowArgs),

    /// Switch between light and dark
    Toggle,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Print the colour palette as JSON
    #[arg(long)]
    pub palette: bool,
}

pub async fn handle(cmd: ThemeCommand, global: &GlobalArgs) -> Result<()> {
    let store = ThemeStore::new(PLATFORM_DEFAULT, app::preferences(global)?);
    let theme = store.load().await;

    match cmd.command {
        ThemeSubcommand::Show(args) => {
            if args.palette {
                output::json_pretty(theme.palette())?;
            } else {
                output::field("Theme", theme.as_str());
            }
        }
        ThemeSubcommand::Toggle => {
            let theme = store.toggle().await;
            output::success(&format!("Theme set to {}", theme.to_string().bold()));
        }
    }
    Ok(())
}
