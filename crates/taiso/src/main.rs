//! taiso - radio calisthenics tracker
//!
//! This is the command-line front end. It wires together:
//! - Configuration loading
//! - Store initialization
//! - Timezone resolution and error reporting
//! - Record keeping, migration and streaks
//! - Timezone change monitoring

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use nix::sys::signal::Signal;
use std::path::PathBuf;
use std::sync::Arc;
use taiso_api::{CalendarDate, ExerciseRecord, ExerciseType, ExerciseTypeFilter, RecordFilter};
use taiso_config::{Settings, load_or_default};
use taiso_core::{RecordStore, TimezoneChangeDetector};
use taiso_store::{RecordStorage, SqliteStorage};
use taiso_tz::{TimezoneErrorReporter, TimezoneResolver};
use taiso_util::default_config_path;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// taiso - track your daily radio calisthenics
#[derive(Parser, Debug)]
#[command(name = "taiso")]
#[command(about = "Track daily radio calisthenics across timezones", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/taiso/config.toml)
    #[arg(short, long, env = "TAISO_CONFIG", default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set TAISO_DATA_DIR env var)
    #[arg(short, long, env = "TAISO_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a completed exercise now
    Record {
        /// Which routine was performed
        exercise: ExerciseType,
    },

    /// List records
    List {
        /// Only records stored under this date (YYYY-MM-DD)
        #[arg(long, conflicts_with_all = ["from", "to", "timezone"])]
        date: Option<String>,

        /// Display timezone (default: configured or detected)
        #[arg(long)]
        timezone: Option<String>,

        /// First date to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Last date to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Routine to include
        #[arg(long = "type", value_enum, default_value_t = TypeArg::Both)]
        exercise_type: TypeArg,
    },

    /// Show the current streak and statistics
    Streak,

    /// Show records grouped by calendar day
    Calendar {
        /// Display timezone (default: configured or detected)
        #[arg(long)]
        timezone: Option<String>,
    },

    /// Upgrade stored legacy records to timezone-aware ones
    Migrate,

    /// Watch for timezone changes until interrupted
    Watch,

    /// Check timezone settings and print the error log
    Errors,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TypeArg {
    First,
    Second,
    Both,
}

impl From<TypeArg> for ExerciseTypeFilter {
    fn from(arg: TypeArg) -> Self {
        match arg {
            TypeArg::First => ExerciseTypeFilter::First,
            TypeArg::Second => ExerciseTypeFilter::Second,
            TypeArg::Both => ExerciseTypeFilter::Both,
        }
    }
}

/// Wired-up application state
struct App {
    settings: Settings,
    reporter: Arc<TimezoneErrorReporter>,
    resolver: Arc<TimezoneResolver>,
    records: RecordStore,
    json: bool,
}

impl App {
    fn new(args: &Args) -> Result<Self> {
        let settings = load_or_default(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        let settings = match &args.data_dir {
            Some(data_dir) => Settings {
                data_dir: data_dir.clone(),
                ..settings
            },
            None => settings,
        };

        std::fs::create_dir_all(&settings.data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", settings.data_dir))?;

        let db_path = settings.database_path();
        let storage: Arc<dyn RecordStorage> = Arc::new(
            SqliteStorage::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );
        info!(db_path = %db_path.display(), "Store initialized");

        let reporter = Arc::new(TimezoneErrorReporter::with_capacity(settings.error_log_capacity));
        reporter.subscribe(|message, severity| {
            eprintln!("[{}] {}", severity.as_str(), message);
        });

        let resolver = Arc::new(TimezoneResolver::system(reporter.clone()));
        let records = RecordStore::new(storage, resolver.clone());

        Ok(Self {
            settings,
            reporter,
            resolver,
            records,
            json: args.json,
        })
    }

    /// Configured display zone, else the detected one
    fn display_timezone(&self, requested: Option<String>) -> String {
        requested
            .or_else(|| self.settings.display_timezone.clone())
            .unwrap_or_else(|| self.resolver.current_timezone())
    }

    async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Record { exercise } => self.record(exercise).await,
            Command::List {
                date,
                timezone,
                from,
                to,
                exercise_type,
            } => {
                let records = match date {
                    Some(date) => self.records.records_for_date(&date).await,
                    None => {
                        let filter = RecordFilter {
                            start_date: from,
                            end_date: to,
                            exercise_type: exercise_type.into(),
                            timezone: Some(self.display_timezone(timezone)),
                        };
                        self.records.records_matching(&filter).await
                    }
                };
                self.print_records(&records)
            }
            Command::Streak => self.streak().await,
            Command::Calendar { timezone } => self.calendar(timezone).await,
            Command::Migrate => self.migrate().await,
            Command::Watch => self.watch().await,
            Command::Errors => self.errors(),
        }
    }

    async fn record(&self, exercise: ExerciseType) -> Result<()> {
        let record = self
            .records
            .record(exercise, None)
            .await
            .context("Failed to record exercise")?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&record)?);
        } else {
            println!(
                "Recorded {} on {} ({})",
                exercise.label(),
                record.date,
                record.timezone.as_deref().unwrap_or("UTC")
            );
        }
        Ok(())
    }

    fn print_records(&self, records: &[ExerciseRecord]) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(records)?);
            return Ok(());
        }

        if records.is_empty() {
            println!("No records");
            return Ok(());
        }
        for record in records {
            println!("{}", describe(record));
        }
        Ok(())
    }

    async fn streak(&self) -> Result<()> {
        let stats = self.records.stats().await;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
            return Ok(());
        }

        println!("Current streak: {} day(s)", stats.current_streak);
        println!("Longest streak: {} day(s)", stats.longest_streak);
        println!("Total records: {}", stats.total_records);
        if let (Some(first), Some(last)) = (&stats.first_record_date, &stats.last_record_date) {
            println!("Recorded from {} to {}", first, last);
        }
        Ok(())
    }

    async fn calendar(&self, timezone: Option<String>) -> Result<()> {
        let timezone = self.display_timezone(timezone);
        let records = self.records.records_converted_to(Some(&timezone)).await;
        let days: Vec<CalendarDate> = self
            .records
            .projector()
            .convert_for_calendar(&records, &timezone);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&days)?);
            return Ok(());
        }

        println!("Calendar ({})", timezone);
        for day in &days {
            let kinds: Vec<&str> = day.records.iter().map(|r| r.exercise_type.as_str()).collect();
            println!("  {}  {}", day.local_date_string, kinds.join(", "));
        }
        Ok(())
    }

    async fn migrate(&self) -> Result<()> {
        let report = self
            .records
            .migration()
            .migrate_all_stored()
            .await
            .context("Migration failed")?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!(
                "Scanned {} day(s), rewrote {}, migrated {} record(s)",
                report.groups_scanned, report.groups_written, report.records_migrated
            );
            if report.records_unmigrated > 0 {
                println!("{} record(s) could not be migrated", report.records_unmigrated);
            }
        }
        Ok(())
    }

    async fn watch(&self) -> Result<()> {
        let detector = TimezoneChangeDetector::new(self.resolver.clone(), self.settings.poll_interval);
        detector.on_change(|new, old| {
            println!("Timezone changed: {} -> {}", old, new);
        });

        let mut sigterm = signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        // Resuming from a stop is the terminal's "visible again"
        let mut sigcont = signal(SignalKind::from_raw(Signal::SIGCONT as i32))
            .context("Failed to create SIGCONT handler")?;

        println!(
            "Watching timezone {} (every {}s, Ctrl-C to stop)",
            detector.last_seen_timezone(),
            detector.poll_interval().as_secs()
        );
        detector.start_monitoring();

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down");
                    break;
                }
                _ = sigcont.recv() => {
                    debug!("Resumed, checking timezone");
                    detector.set_visibility(true);
                }
            }
        }

        detector.stop_monitoring();
        Ok(())
    }

    fn errors(&self) -> Result<()> {
        // Exercise detection and the configured zone so failures land in the log
        let current = self.resolver.current_info();
        if let Some(tz) = &self.settings.display_timezone {
            self.resolver.info_for(tz, None);
        }

        let log = self.reporter.error_log();
        if self.json {
            println!("{}", serde_json::to_string_pretty(&log)?);
            return Ok(());
        }

        println!("Detected timezone: {} (offset {:+} min)", current.timezone, current.offset);
        if log.is_empty() {
            println!("No timezone errors");
            return Ok(());
        }
        for entry in &log {
            println!(
                "{} [{}] {} -> {}",
                entry.timestamp,
                entry.kind.as_str(),
                entry.message,
                entry.fallback_action
            );
        }
        Ok(())
    }
}

/// One-line description of a record
fn describe(record: &ExerciseRecord) -> String {
    let time = record
        .local_wall_clock()
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    let zone = record.timezone.as_deref().unwrap_or("legacy");
    format!("{} {} {} ({})", record.date, time, record.exercise_type.label(), zone)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    debug!(version = env!("CARGO_PKG_VERSION"), "taiso starting");

    if taiso_util::is_mock_time_active() {
        warn!("Mock time is active");
    }

    let app = App::new(&args)?;
    app.run(args.command).await
}
