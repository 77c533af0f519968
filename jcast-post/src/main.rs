//! jcast-post - Publish today's journal entry once
//!
//! Runs the orchestrator a single time (or the reminder check) and prints a
//! per-platform summary. Meant for cron jobs and manual runs; `jcast-send` is
//! the long-running alternative.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use libjournalcast::logging;
use libjournalcast::service::{DraftPreview, JournalcastService, ReminderOutcome};
use libjournalcast::source::{today, MemorySource};
use libjournalcast::{Config, JournalcastError, PublishPolicy, RunReport};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "jcast-post")]
#[command(version)]
#[command(about = "Publish today's journal entry to X and RedNote")]
#[command(long_about = "\
jcast-post - Publish today's journal entry to X and RedNote

DESCRIPTION:
    Fetches today's Ready entry from Notion, adapts it per platform and
    publishes it through a browser using the sessions saved by jcast-login.
    The entry is marked Published only when the publish policy is met.

USAGE:
    # Publish with the configured policy
    jcast-post publish

    # Mark as published if at least one platform succeeds
    jcast-post publish --policy any

    # Show the drafts without opening a browser
    jcast-post publish --dry-run

    # Publish a local entry file instead of Notion
    jcast-post --entry entry.json publish

    # Email a reminder if today's entry is missing
    jcast-post remind

EXIT CODES:
    0 - Success (or nothing to publish)
    1 - Publish policy not met, or a runtime error
    2 - Credentials missing or session expired (run jcast-login)
    3 - Invalid input
")]
struct Cli {
    /// Configuration file (default: ~/.config/journalcast/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Read entries from a JSON file instead of Notion
    #[arg(long, global = true, value_name = "FILE")]
    entry: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish today's Ready entry
    Publish {
        /// When to mark the entry published: all platforms succeed, or any
        #[arg(long, value_name = "all|any")]
        policy: Option<String>,

        /// Build and print the drafts without publishing
        #[arg(long)]
        dry_run: bool,
    },

    /// Send the reminder email if no entry exists for the day
    Remind {
        /// Day to check (default: today)
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: Option<NaiveDate>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::init_default(cli.verbose);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<JournalcastError>()
                .map(JournalcastError::exit_code)
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let service = match &cli.entry {
        Some(path) => {
            debug!(path = %path.display(), "Using local entry file");
            let source = MemorySource::from_json_file(path)?;
            JournalcastService::with_source(config, Arc::new(source))?
        }
        None => JournalcastService::from_config(config)?,
    };

    match cli.command {
        Command::Publish { policy, dry_run } => {
            let policy = policy
                .as_deref()
                .map(str::parse::<PublishPolicy>)
                .transpose()?;
            if dry_run {
                let previews = service.preview().await?;
                print_previews(previews.as_deref(), cli.format)?;
                return Ok(0);
            }
            let report = service.publish(policy).await?;
            print_report(&report, cli.format)?;
            Ok(report_exit_code(&report))
        }
        Command::Remind { date } => {
            let date = date.unwrap_or_else(today);
            let outcome = service.remind(date).await?;
            print_reminder(date, outcome, cli.format)?;
            Ok(match outcome {
                ReminderOutcome::SendFailed => 1,
                ReminderOutcome::EntryExists | ReminderOutcome::Sent => 0,
            })
        }
    }
}

/// 0 when nothing was due or the policy was met and recorded
fn report_exit_code(report: &RunReport) -> i32 {
    if !report.attempted() || (report.status_updated && report.status_error.is_none()) {
        0
    } else {
        1
    }
}

fn print_report(report: &RunReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => println!("{}", report.render_text()),
        OutputFormat::Json => println!("{}", report.render_json()?),
    }
    Ok(())
}

fn print_previews(previews: Option<&[DraftPreview]>, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&previews.unwrap_or_default())
                .context("Failed to serialize drafts")?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            let Some(previews) = previews else {
                println!("No journal entry ready for today");
                return Ok(());
            };
            for preview in previews {
                println!("== {} ==", preview.platform);
                if !preview.title.is_empty() {
                    println!("Title: {}", preview.title);
                }
                if let Some(media) = &preview.media {
                    println!("Media: {}", media);
                }
                if preview.segments.is_empty() {
                    println!("{}", preview.body);
                } else {
                    for segment in &preview.segments {
                        println!("{}", segment);
                        println!("---");
                    }
                }
                println!();
            }
        }
    }
    Ok(())
}

fn print_reminder(
    date: NaiveDate,
    outcome: ReminderOutcome,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({ "date": date, "outcome": outcome });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => match outcome {
            ReminderOutcome::EntryExists => println!("Entry exists for {}, no reminder sent", date),
            ReminderOutcome::Sent => println!("Reminder sent for {}", date),
            ReminderOutcome::SendFailed => println!("Reminder for {} could not be sent", date),
        },
    }
    Ok(())
}
