//! Authentication and profile commands.

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Subcommand};
use colored::Colorize;

use reportfeed_live::screens::{LoginScreen, ProfileSettings, SignupError, SignupForm, SignupScreen};

use crate::app::{App, NOT_SIGNED_IN};
use crate::cli::GlobalArgs;
use crate::output;
use crate::session::storage;

#[derive(Args, Debug)]
pub struct AuthCommand {
    #[command(subcommand)]
    pub command: AuthSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum AuthSubcommand {
    /// Sign in with email and password
    Login(LoginArgs),

    /// Create an account and sign in
    Signup(SignupArgs),

    /// Sign out and forget remembered credentials
    Logout,

    /// Display the signed-in user
    Whoami(WhoamiArgs),

    /// Change the display name
    UpdateName(UpdateNameArgs),
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Account email (defaults to the remembered one)
    #[arg(long)]
    pub email: Option<String>,

    /// Account password (defaults to the remembered one)
    #[arg(long)]
    pub password: Option<String>,

    /// Remember the credentials for next time (stored in plain text)
    #[arg(long, conflicts_with = "forget")]
    pub remember: bool,

    /// Forget previously remembered credentials
    #[arg(long)]
    pub forget: bool,
}

#[derive(Args, Debug)]
pub struct SignupArgs {
    /// Account email
    #[arg(long)]
    pub email: String,

    /// Account password
    #[arg(long)]
    pub password: String,

    /// Password confirmation (defaults to --password)
    #[arg(long)]
    pub confirm_password: Option<String>,

    /// Display name
    #[arg(long)]
    pub name: String,
}

#[derive(Args, Debug)]
pub struct WhoamiArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct UpdateNameArgs {
    /// New display name
    pub name: String,
}

pub async fn handle(cmd: AuthCommand, global: &GlobalArgs) -> Result<()> {
    match cmd.command {
        AuthSubcommand::Login(args) => login(args, global).await,
        AuthSubcommand::Signup(args) => signup(args, global).await,
        AuthSubcommand::Logout => logout(global).await,
        AuthSubcommand::Whoami(args) => whoami(args, global).await,
        AuthSubcommand::UpdateName(args) => update_name(args, global).await,
    }
}

async fn login(args: LoginArgs, global: &GlobalArgs) -> Result<()> {
    let app = App::open(global).await?;
    let screen = LoginScreen::new(app.backend.clone(), app.prefs.clone());

    let (email, password, remember) = match (args.email, args.password) {
        (Some(email), Some(password)) => (email, password, args.remember),
        (email, password) => {
            let remembered = screen
                .prefill()
                .await
                .context("Failed to read remembered credentials")?
                .context("No remembered credentials. Pass --email and --password.")?;
            (
                email.unwrap_or_else(|| remembered.email().to_string()),
                password.unwrap_or_else(|| remembered.password().to_string()),
                !args.forget,
            )
        }
    };

    eprintln!("{}", "Signing in...".dimmed());
    let session = screen
        .submit(&email, &password, remember)
        .await
        .context("Failed to sign in")?;
    storage::save_session(&app.prefs, app.backend.url(), &session)
        .await
        .context("Failed to save session")?;

    output::success("Signed in");
    println!();
    output::identity(&session.identity);
    output::field("Backend", &app.backend.url().to_string());
    Ok(())
}

async fn signup(args: SignupArgs, global: &GlobalArgs) -> Result<()> {
    let app = App::open(global).await?;
    let screen = SignupScreen::new(app.backend.clone(), app.backend.clone());

    let form = SignupForm {
        display_name: args.name,
        email: args.email,
        confirm_password: args.confirm_password.unwrap_or_else(|| args.password.clone()),
        password: args.password,
    };

    eprintln!("{}", "Creating account...".dimmed());
    match screen.submit(&form).await {
        Ok(session) => {
            storage::save_session(&app.prefs, app.backend.url(), &session)
                .await
                .context("Failed to save session")?;
            output::success("Account created");
            println!();
            output::identity(&session.identity);
            Ok(())
        }
        Err(SignupError::ProfileNotCreated { session, source }) => {
            // The account exists and is signed in; keep the session.
            storage::save_session(&app.prefs, app.backend.url(), &session)
                .await
                .context("Failed to save session")?;
            output::identity(&session.identity);
            Err(anyhow!(source).context("Account created, but the profile could not be saved"))
        }
        Err(SignupError::Account(e)) => Err(anyhow!(e).context("Failed to sign up")),
    }
}

async fn logout(global: &GlobalArgs) -> Result<()> {
    let app = App::open(global).await?;
    let settings = ProfileSettings::new(app.backend.clone(), app.backend.clone(), app.prefs.clone());

    settings.sign_out().await.context("Failed to sign out")?;
    storage::clear_session(&app.prefs).await?;

    output::success("Signed out");
    Ok(())
}

async fn whoami(args: WhoamiArgs, global: &GlobalArgs) -> Result<()> {
    let app = App::open(global).await?;
    let settings = ProfileSettings::new(app.backend.clone(), app.backend.clone(), app.prefs.clone());

    let identity = match settings.load().await {
        Ok(identity) => identity,
        Err(e) if e.is_auth() => bail!(NOT_SIGNED_IN),
        Err(e) => return Err(e).context("Failed to load profile"),
    };

    if args.json {
        output::json(&identity)?;
    } else {
        output::identity(&identity);
        output::field("Backend", &app.backend.url().to_string());
    }
    Ok(())
}

async fn update_name(args: UpdateNameArgs, global: &GlobalArgs) -> Result<()> {
    let app = App::open(global).await?;
    let settings = ProfileSettings::new(app.backend.clone(), app.backend.clone(), app.prefs.clone());

    let identity = settings
        .update_display_name(&args.name)
        .await
        .context("Failed to update display name")?;

    output::success("Display name updated");
    println!();
    output::identity(&identity);
    Ok(())
}
