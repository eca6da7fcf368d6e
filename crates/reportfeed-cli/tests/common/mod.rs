#![allow(dead_code)]

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use url::Url;

pub const PASSWORD: &str = "test-password";

/// `file://` URL of the store kept under `dir`.
pub fn store_url(dir: &Path) -> String {
    Url::from_directory_path(dir.join("store"))
        .expect("Failed to convert path to file URL")
        .to_string()
}

fn command(args: &[&str], dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_reportfeed"));
    cmd.args(args);
    cmd.env("REPORTFEED_DATA_DIR", dir.join("data"));
    cmd.env("REPORTFEED_BACKEND", store_url(dir));
    cmd.env_remove("REPORTFEED_API_KEY");
    cmd.env_remove("RUST_LOG");
    cmd.env("NO_COLOR", "1");
    cmd
}

/// Run the CLI with its data directory and local store under `dir`.
pub fn run_cli(args: &[&str], dir: &Path) -> Output {
    command(args, dir)
        .stdin(Stdio::null())
        .output()
        .expect("Failed to execute CLI")
}

/// Run the CLI and expect success.
pub fn run_cli_success(args: &[&str], dir: &Path) -> String {
    let output = run_cli(args, dir);
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!("CLI command failed: {:?}\nstderr: {}", args, stderr);
    }
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Run the CLI feeding `input` on stdin.
pub fn run_cli_with_stdin(args: &[&str], dir: &Path, input: &str) -> Output {
    let mut child = command(args, dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to execute CLI");
    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(input.as_bytes())
        .expect("Failed to write stdin");
    child.wait_with_output().expect("Failed to wait for CLI")
}

/// Create an account named after `email` and leave it signed in.
pub fn sign_up(dir: &Path, email: &str) -> String {
    run_cli_success(
        &[
            "auth",
            "signup",
            "--email",
            email,
            "--password",
            PASSWORD,
            "--name",
            "Test User",
        ],
        dir,
    )
}
