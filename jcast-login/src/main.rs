//! jcast-login - Save a logged-in browser session for unattended publishing
//!
//! Opens a visible browser at the platform's login page and waits for a
//! person to sign in (QR code, SMS, password: whatever the site asks for).
//! Once the logged-in page shows up, cookies and local storage are written to
//! the platform's credential file, which `jcast-post` and `jcast-send` replay.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use libjournalcast::browser::chromium::ChromiumLauncher;
use libjournalcast::browser::BrowserLauncher;
use libjournalcast::credentials::{capture_after_login, CredentialStore};
use libjournalcast::logging;
use libjournalcast::platforms::login_target;
use libjournalcast::{Config, JournalcastError, PlatformKind};
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Pause after login before capturing, so the site finishes writing its session
const SETTLE_DELAY: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "jcast-login")]
#[command(version)]
#[command(about = "Log in to a platform and save the session")]
#[command(long_about = "\
jcast-login - Log in to a platform and save the session

DESCRIPTION:
    Opens a browser window at the login page of X or RedNote. Log in by
    hand; once the logged-in page appears the session is saved to the
    platform's auth_file from the config (or --output).

    Run it again whenever a publish run reports an expired session.

USAGE:
    jcast-login x
    jcast-login rednote --output ~/rednote-auth.json
    jcast-login rednote --timeout 10m

EXIT CODES:
    0 - Session saved
    1 - Runtime error
    2 - Login not completed in time
    3 - Invalid input
")]
struct Cli {
    /// Platform to log in to (x, rednote)
    platform: String,

    /// Where to write the session (default: auth_file from the config)
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Configuration file (default: ~/.config/journalcast/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// How long to wait for the login to finish
    #[arg(long, default_value = "5m", value_name = "DURATION")]
    timeout: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::init_default(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<JournalcastError>()
            .map(JournalcastError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let platform: PlatformKind = cli.platform.parse()?;
    let timeout = humantime::parse_duration(&cli.timeout).map_err(|e| {
        JournalcastError::InvalidInput(format!("Invalid timeout '{}': {}", cli.timeout, e))
    })?;
    let output = match cli.output {
        Some(path) => path,
        None => {
            let config = match &cli.config {
                Some(path) => Config::load_from_path(path)?,
                None => Config::load()?,
            };
            config.auth_file(platform)?
        }
    };
    let store = CredentialStore::new(output);
    if store.exists() {
        warn!(path = %store.path().display(), "Existing session will be replaced");
    }

    let target = login_target(platform);
    let mut page = ChromiumLauncher::new(false).launch().await?;
    println!(
        "Log in to {} in the browser window. Waiting up to {}...",
        platform,
        humantime::format_duration(timeout)
    );

    let captured = capture_after_login(page.as_ref(), &target, timeout, POLL_INTERVAL, SETTLE_DELAY).await;
    if let Err(e) = page.close().await {
        warn!(error = %e, "Failed to close browser");
    }
    let snapshot = captured?;

    store.save(&snapshot)?;
    info!(platform = %platform, cookies = snapshot.cookies.len(), "Session saved");
    println!("Session saved to {}", store.path().display());
    Ok(())
}
