//! Rollcall tracker - operator command line
//!
//! Feeds recognition events into the tracker by hand and prints ledgers,
//! reports and the audit log. Camera capture and recognition run elsewhere
//! and call the library directly.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use rollcall_common::config::{
    database_path, default_config_path, resolve_root_folder, write_config,
};
use rollcall_common::human_time::format_hm;
use rollcall_common::time::{self, parse_date, parse_timestamp, parse_year_month};
use rollcall_common::{RecognitionEvent, TrackerConfig};
use rollcall_tracker::report::{
    render_directory, render_ledger, render_monthly_report, render_presence, status_log_csv,
};
use rollcall_tracker::{AttendanceTracker, ManualCheckout, Outcome};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for rollcall-tracker
#[derive(Parser, Debug)]
#[command(name = "rollcall-tracker")]
#[command(about = "Attendance ledger engine for face-recognition check-ins")]
#[command(version)]
struct Args {
    /// Root folder holding the attendance database
    #[arg(short, long, env = "ROLLCALL_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long, env = "ROLLCALL_CONFIG")]
    config: Option<PathBuf>,

    /// Print ledgers, reports and listings as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a recognition event for a name
    Record {
        name: String,
        /// Event time, `YYYY-MM-DD HH:MM[:SS]`; defaults to now
        #[arg(long)]
        at: Option<String>,
        /// Recognizer confidence carried into the audit log
        #[arg(long, default_value_t = 1.0)]
        confidence: f32,
    },
    /// Check out someone who is inside, ignoring the cooldown
    Checkout {
        name: String,
        #[arg(long)]
        at: Option<String>,
    },
    /// Print one person's ledger for a month (`YYYY-MM`)
    Ledger { name: String, month: String },
    /// Print the summary of everyone for a month (`YYYY-MM`)
    Report { month: String },
    /// Show who is in or out on a day (`YYYY-MM-DD`, defaults to today)
    Presence {
        #[arg(long)]
        date: Option<String>,
    },
    /// List enrolled identities
    Directory,
    /// Write the audit log as CSV to stdout or a file
    ExportLog {
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Only entries for this name or identity id
        #[arg(long)]
        name: Option<String>,
        /// First day to include (`YYYY-MM-DD`)
        #[arg(long)]
        from: Option<String>,
        /// Last day to include (`YYYY-MM-DD`)
        #[arg(long)]
        to: Option<String>,
    },
    /// Write the effective configuration to the config file
    InitConfig {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

fn event_time(at: Option<&str>) -> Result<chrono::NaiveDateTime> {
    match at {
        Some(text) => parse_timestamp(text).ok_or_else(|| anyhow!("invalid timestamp '{}'", text)),
        None => Ok(time::now()),
    }
}

fn day(text: Option<&str>) -> Result<Option<chrono::NaiveDate>> {
    text.map(|text| parse_date(text).ok_or_else(|| anyhow!("invalid date '{}'", text)))
        .transpose()
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to serialize output")?);
    Ok(())
}

fn year_month(text: &str) -> Result<(i32, u32)> {
    parse_year_month(text).ok_or_else(|| anyhow!("invalid month '{}', expected YYYY-MM", text))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let config = TrackerConfig::load(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    // RUST_LOG wins over the configured level
    let level = &config.logging.level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("rollcall_tracker={},rollcall_common={}", level, level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Command::InitConfig { force } = args.command {
        if config_path.exists() && !force {
            return Err(anyhow!(
                "{} already exists; pass --force to replace it",
                config_path.display()
            ));
        }
        write_config(&config, &config_path)
            .with_context(|| format!("Failed to write config {}", config_path.display()))?;
        println!("Configuration written to {}", config_path.display());
        return Ok(());
    }

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    let db_path = database_path(&root_folder);
    info!("Root folder: {}", root_folder.display());

    let tracker = AttendanceTracker::open(config, &db_path)
        .await
        .context("Failed to open attendance database")?;

    match args.command {
        Command::Record {
            name,
            at,
            confidence,
        } => {
            let event = RecognitionEvent::new(name, confidence, event_time(at.as_deref())?);
            match tracker.process(&event).await.context("Failed to record event")? {
                Outcome::Ignored => println!("Ignored unrecognized face"),
                Outcome::Suppressed {
                    identity,
                    remaining,
                } => println!(
                    "{} ({}) seen recently; try again in {}s",
                    identity.name,
                    identity.id,
                    remaining.num_seconds()
                ),
                Outcome::Recorded { identity, applied } => println!(
                    "{} ({}) {} at {}",
                    identity.name,
                    identity.id,
                    applied.transition,
                    event.timestamp.format("%H:%M:%S")
                ),
            }
        }
        Command::Checkout { name, at } => {
            let at = event_time(at.as_deref())?;
            match tracker
                .manual_checkout(&name, at)
                .await
                .context("Failed to check out")?
            {
                ManualCheckout::CheckedOut { identity, applied } => println!(
                    "{} ({}) checked out, worked {}",
                    identity.name,
                    identity.id,
                    format_hm(applied.record.total_secs().unwrap_or(0))
                ),
                ManualCheckout::NotCheckedIn { identity } => {
                    println!("{} is not checked in", identity.name)
                }
            }
        }
        Command::Ledger { name, month } => {
            let (year, month) = year_month(&month)?;
            let (identity, ledger) = tracker.ledger(&name, year, month).await?;
            if args.json {
                print_json(&ledger)?;
            } else {
                print!("{}", render_ledger(&identity, &ledger));
            }
        }
        Command::Report { month } => {
            let (year, month) = year_month(&month)?;
            let rows = tracker.monthly_report(year, month).await?;
            if args.json {
                print_json(&rows)?;
            } else {
                print!("{}", render_monthly_report(year, month, &rows));
            }
        }
        Command::Presence { date } => {
            let date = day(date.as_deref())?.unwrap_or_else(time::today);
            let entries = tracker.presence(date).await?;
            if args.json {
                print_json(&entries)?;
            } else {
                print!("{}", render_presence(&entries));
            }
        }
        Command::Directory => {
            let entries = tracker.directory().await?;
            if args.json {
                print_json(&entries)?;
            } else {
                print!("{}", render_directory(&entries));
            }
        }
        Command::ExportLog {
            output,
            name,
            from,
            to,
        } => {
            let entries = tracker
                .export_log(name.as_deref(), day(from.as_deref())?, day(to.as_deref())?)
                .await?;
            let csv = status_log_csv(&entries);
            match output {
                Some(path) => {
                    std::fs::write(&path, csv)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!("Audit log written to {}", path.display());
                }
                None => print!("{}", csv),
            }
        }
        Command::InitConfig { .. } => {}
    }

    Ok(())
}
