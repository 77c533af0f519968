//! jcast-send - Background daemon for scheduled publishing
//!
//! Checks for a Ready journal entry every `schedule.publish_every` and sends
//! the missing-entry reminder once a day at `schedule.reminder_at`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::{Local, NaiveTime};
use clap::Parser;
use libjournalcast::logging;
use libjournalcast::scheduling::{until_next_daily, RunGate};
use libjournalcast::service::{JournalcastService, ReminderOutcome};
use libjournalcast::source::{today, MemorySource};
use libjournalcast::Config;
use tokio::time::{interval_at, sleep, Duration, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "jcast-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled journal publishing")]
#[command(long_about = "\
jcast-send - Background daemon for scheduled journal publishing

DESCRIPTION:
    jcast-send is a long-running daemon that publishes today's journal entry
    as soon as it is marked Ready, and emails a reminder in the evening if
    no entry has been written.

    A publish check runs at startup and then every `publish_every`. A check
    that comes due while the previous one is still running is skipped.

USAGE:
    # Run in foreground (logs to stderr)
    jcast-send

    # Enable verbose logging
    jcast-send --verbose

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the run in progress)

CONFIGURATION:
    Configuration file: ~/.config/journalcast/config.toml

    [schedule]
    publish_every = \"2h\"     # how often to look for a Ready entry
    reminder_at = \"20:00\"    # local time of the reminder check
    run_at_startup = true

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Credentials missing or session expired (with --once)
")]
struct Cli {
    /// Configuration file (default: ~/.config/journalcast/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Read entries from a JSON file instead of Notion
    #[arg(long, value_name = "FILE")]
    entry: Option<PathBuf>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging (useful for debugging)")]
    verbose: bool,

    /// Run once and exit (for testing)
    #[arg(long, hide = true)]
    #[arg(help = "Run the publish check once and exit (for testing)")]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::init_default(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<libjournalcast::JournalcastError>()
            .map(|e| e.exit_code())
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    let interval = config.schedule.publish_interval()?;
    let reminder_at = config.schedule.reminder_time()?;
    let run_at_startup = config.schedule.run_at_startup;

    let service = match &cli.entry {
        Some(path) => {
            let source = MemorySource::from_json_file(path)?;
            JournalcastService::with_source(config, Arc::new(source))?
        }
        None => JournalcastService::from_config(config)?,
    };
    let service = Arc::new(service);

    if cli.once {
        let report = service.publish(None).await?;
        info!("{}", report.render_text());
        info!("jcast-send: ran publish check once, exiting");
        return Ok(());
    }

    info!(
        every = ?interval,
        reminder_at = %reminder_at,
        "jcast-send daemon starting"
    );
    run_daemon_loop(service, interval, reminder_at, run_at_startup).await?;
    info!("jcast-send daemon stopped");
    Ok(())
}

/// Main daemon loop
async fn run_daemon_loop(
    service: Arc<JournalcastService>,
    interval: Duration,
    reminder_at: NaiveTime,
    run_at_startup: bool,
) -> Result<()> {
    let publish_gate = RunGate::new();
    let remind_gate = RunGate::new();

    let first = if run_at_startup {
        Instant::now()
    } else {
        Instant::now() + interval
    };
    let mut publish_ticks = interval_at(first, interval);
    publish_ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let until_reminder = until_next_daily(&Local::now(), reminder_at);

        tokio::select! {
            _ = &mut shutdown => {
                info!("Received shutdown signal, stopping gracefully...");
                break;
            }
            _ = publish_ticks.tick() => {
                spawn_publish(&service, &publish_gate);
            }
            _ = sleep(until_reminder) => {
                spawn_reminder(&service, &remind_gate);
            }
        }
    }

    // Let a publish in flight finish so the entry status stays consistent
    publish_gate.wait_idle().await;
    remind_gate.wait_idle().await;
    Ok(())
}

fn spawn_publish(service: &Arc<JournalcastService>, gate: &RunGate) {
    let Some(permit) = gate.try_enter() else {
        warn!("Previous publish run still in progress, skipping this trigger");
        return;
    };
    let service = Arc::clone(service);
    tokio::spawn(async move {
        let _permit = permit;
        match service.publish(None).await {
            Ok(report) if !report.attempted() => {
                info!("No journal entry ready, nothing to publish");
            }
            Ok(report) => {
                info!(
                    run_id = %report.run_id,
                    status_updated = report.status_updated,
                    "Publish run finished\n{}",
                    report.render_text()
                );
            }
            Err(e) if e.is_fatal() => {
                error!(error = %e, "Publish run aborted, fix the session before the next trigger");
            }
            Err(e) => error!(error = %e, "Publish run failed"),
        }
    });
}

fn spawn_reminder(service: &Arc<JournalcastService>, gate: &RunGate) {
    let Some(permit) = gate.try_enter() else {
        warn!("Reminder check already running, skipping");
        return;
    };
    let service = Arc::clone(service);
    tokio::spawn(async move {
        let _permit = permit;
        match service.remind(today()).await {
            Ok(ReminderOutcome::Sent) => info!("Reminder sent"),
            Ok(ReminderOutcome::EntryExists) => info!("Entry written today, no reminder"),
            Ok(ReminderOutcome::SendFailed) => warn!("Reminder could not be delivered"),
            Err(e) => error!(error = %e, "Reminder check failed"),
        }
    });
}

/// Resolves on the first SIGINT or SIGTERM
#[cfg(unix)]
async fn shutdown_signal() {
    use futures::stream::StreamExt;
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook_tokio::Signals;

    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(e) => {
            warn!(error = %e, "Signal setup failed, falling back to Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    let handle = signals.handle();
    if let Some(signal) = signals.next().await {
        info!(signal, "Shutdown signal received");
    }
    handle.close();
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
