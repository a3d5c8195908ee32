//! League CLI - Command-line interface for Sleep League
//!
//! Commands:
//! - summarize: Build a sleep summary from nightly records
//! - validate: Validate nightly record schema
//! - status: Derive a competition status from its window

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use sleep_league::config::{ConfigError, LeagueConfig};
use sleep_league::schema::{parse_instant, RawNightlyRecord, RecordAdapter};
use sleep_league::store::{MemoryStore, UserRepository};
use sleep_league::types::{User, UserId};
use sleep_league::{derive_status, LeagueError, SleepLog, LEAGUE_VERSION};

/// League - Sleep metrics and competition engine
#[derive(Parser)]
#[command(name = "league")]
#[command(version = LEAGUE_VERSION)]
#[command(about = "Summarize sleep records and evaluate competitions", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a sleep summary from nightly records
    Summarize {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// User the records belong to
        #[arg(long, default_value = "local")]
        user: String,

        /// Clock override (RFC 3339)
        #[arg(long)]
        now: Option<String>,

        /// Pretty-print the summary
        #[arg(long)]
        pretty: bool,
    },

    /// Validate nightly record schema
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Derive a competition status from its window
    Status {
        /// Window start (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        start: String,

        /// Window end (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        end: String,

        /// Clock override (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        now: Option<String>,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), LeagueCliError> {
    let config = match &cli.config {
        Some(path) => LeagueConfig::load(path)?,
        None => LeagueConfig::default(),
    };
    init_logging(&config.logging.filter);

    match cli.command {
        Commands::Summarize {
            input,
            input_format,
            user,
            now,
            pretty,
        } => cmd_summarize(&input, input_format, &user, now.as_deref(), pretty, &config),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Status { start, end, now } => cmd_status(&start, &end, now.as_deref()),
    }
}

fn init_logging(fallback: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn cmd_summarize(
    input: &Path,
    input_format: InputFormat,
    user: &str,
    now: Option<&str>,
    pretty: bool,
    config: &LeagueConfig,
) -> Result<(), LeagueCliError> {
    let records = read_records(input, input_format)?;
    if records.is_empty() {
        return Err(LeagueCliError::NoRecords);
    }
    let now = match now {
        Some(s) => parse_time(s)?,
        None => Utc::now(),
    };

    let store = Arc::new(MemoryStore::new());
    let user_id = UserId::new(user);
    store.insert(&User::new(user, now).with_device_connected())?;

    let log = SleepLog::new(
        store.clone(),
        store.clone(),
        store.clone(),
        config.records.clone(),
    );
    log.sync(&user_id, &records, now)?;
    let summary = log.summary(&user_id, now)?;

    if pretty {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", serde_json::to_string(&summary)?);
    }
    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), LeagueCliError> {
    let records = read_records(input, input_format)?;
    let results = RecordAdapter::validate_records(&records);

    let report = ValidationReport {
        total_records: records.len(),
        valid_records: records.len() - results.len(),
        invalid_records: results.len(),
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                date: r.date.clone(),
                error: r.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total records:   {}", report.total_records);
        println!("Valid records:   {}", report.valid_records);
        println!("Invalid records: {}", report.invalid_records);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Night {:?} (index {}): {}", err.date, err.index, err.error);
            }
        }
    }

    if report.invalid_records > 0 {
        Err(LeagueCliError::ValidationFailed(report.invalid_records))
    } else {
        Ok(())
    }
}

fn cmd_status(start: &str, end: &str, now: Option<&str>) -> Result<(), LeagueCliError> {
    let start = parse_time(start)?;
    let end = parse_time(end)?;
    let now = match now {
        Some(s) => parse_time(s)?,
        None => Utc::now(),
    };

    println!("{}", derive_status(start, end, now));
    Ok(())
}

fn read_records(input: &Path, input_format: InputFormat) -> Result<Vec<RawNightlyRecord>, LeagueCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let records = match input_format {
        InputFormat::Ndjson => RecordAdapter::parse_ndjson(&input_data)?,
        InputFormat::Json => RecordAdapter::parse_array(&input_data)?,
    };
    Ok(records)
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, LeagueCliError> {
    parse_instant(s).map_err(|_| LeagueCliError::BadInstant(s.to_string()))
}

// Error types

#[derive(Debug)]
enum LeagueCliError {
    Io(io::Error),
    Config(ConfigError),
    League(LeagueError),
    Json(serde_json::Error),
    NoRecords,
    ValidationFailed(usize),
    BadInstant(String),
}

impl From<io::Error> for LeagueCliError {
    fn from(e: io::Error) -> Self {
        LeagueCliError::Io(e)
    }
}

impl From<ConfigError> for LeagueCliError {
    fn from(e: ConfigError) -> Self {
        LeagueCliError::Config(e)
    }
}

impl From<LeagueError> for LeagueCliError {
    fn from(e: LeagueError) -> Self {
        LeagueCliError::League(e)
    }
}

impl From<sleep_league::StoreError> for LeagueCliError {
    fn from(e: sleep_league::StoreError) -> Self {
        LeagueCliError::League(e.into())
    }
}

impl From<serde_json::Error> for LeagueCliError {
    fn from(e: serde_json::Error) -> Self {
        LeagueCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<LeagueCliError> for CliError {
    fn from(e: LeagueCliError) -> Self {
        match e {
            LeagueCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            LeagueCliError::Config(e) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the TOML configuration file".to_string()),
            },
            LeagueCliError::League(LeagueError::Validation(msg)) => CliError {
                code: "VALIDATION_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'league validate' for details".to_string()),
            },
            LeagueCliError::League(e) => CliError {
                code: "LEAGUE_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            LeagueCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            LeagueCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No records found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            LeagueCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            LeagueCliError::BadInstant(value) => CliError {
                code: "INVALID_TIME".to_string(),
                message: format!("Cannot parse time {:?}", value),
                hint: Some("Use RFC 3339 (2024-03-14T00:00:00Z) or YYYY-MM-DD".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_records: usize,
    valid_records: usize,
    invalid_records: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    date: String,
    error: String,
}
