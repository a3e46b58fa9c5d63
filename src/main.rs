use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};
use tracing::Level;

use loadrisk::config::AppConfig;
use loadrisk::logging::{init_logging, LogLevel};
use loadrisk::{
    Database, DetailedReport, FatigueRecord, FatigueStore, HistoryTable, RiskError, RiskPipeline,
    SessionLoadScorer, SessionRecord, StageOutcome,
};

/// LoadRisk - Athlete Load and Injury Risk CLI
///
/// Forecasts training load, classifies fatigue and injury risk from an
/// athlete's history, and scores completed sessions in real time.
#[derive(Parser)]
#[command(name = "loadrisk")]
#[command(author = "LoadRisk Contributors")]
#[command(version)]
#[command(about = "Athlete load forecasting and injury risk CLI", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Overrides the database location from the config
    #[arg(short, long, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Forecast load and classify risk from a training history
    Predict {
        /// History file (JSON rows, {"training_data": [...]}, or CSV)
        #[arg(long, value_name = "FILE")]
        history: PathBuf,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Score a completed session and store the fatigue record
    Score {
        /// Athlete identifier
        #[arg(short, long)]
        athlete: String,

        /// Session duration in minutes
        #[arg(long)]
        duration: i64,

        /// Rating of perceived exertion (1-10)
        #[arg(long)]
        rpe: i64,

        /// Print the stored record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the most recent fatigue record for an athlete
    Latest {
        /// Athlete identifier
        #[arg(short, long)]
        athlete: String,

        /// Number of records to show, newest first
        #[arg(short, long, default_value = "1")]
        limit: usize,
    },

    /// Show or initialize configuration
    Config {
        /// Print the effective configuration
        #[arg(short, long)]
        show: bool,

        /// Write a default configuration file
        #[arg(short, long)]
        init: bool,
    },
}

#[derive(Tabled)]
struct ForecastRow {
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Predicted load")]
    load: String,
}

#[derive(Tabled)]
struct FatigueRow {
    #[tabled(rename = "Recorded at")]
    recorded_at: String,
    #[tabled(rename = "Load")]
    load: i64,
    #[tabled(rename = "Fatigue")]
    fatigue: i64,
    #[tabled(rename = "Risk")]
    risk: String,
    #[tabled(rename = "Recommendation")]
    recommendation: String,
}

impl From<&FatigueRecord> for FatigueRow {
    fn from(record: &FatigueRecord) -> Self {
        Self {
            recorded_at: record.recorded_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            load: record.session_load,
            fatigue: record.fatigue_level,
            risk: if record.injury_risk_flag { "yes" } else { "no" }.to_string(),
            recommendation: record.recommendation.to_string(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    if cli.verbose > 0 {
        config.logging.level = LogLevel::from_verbosity(cli.verbose);
    }
    init_logging(&config.logging)?;

    let database_path = cli
        .database
        .clone()
        .unwrap_or_else(|| config.database.path.clone());

    match cli.command {
        Commands::Predict { history, json } => {
            let table = load_history(&history)?;
            let detailed = RiskPipeline::with_config(config.pipeline()).run_detailed(&table);

            if json {
                println!("{}", serde_json::to_string_pretty(&detailed.report)?);
            } else {
                print_report(&detailed);
            }
        }

        Commands::Score {
            athlete,
            duration,
            rpe,
            json,
        } => {
            let db = open_database(&database_path)?;
            let scorer = SessionLoadScorer::with_config(config.session.clone());
            let (score, record) = scorer
                .score_and_record(&db, &SessionRecord::new(athlete, duration, rpe))
                .map_err(|e| {
                    log_risk_error(&e);
                    anyhow::anyhow!(e.user_message())
                })?;

            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                println!("{}", "Session scored".green().bold());
                println!("  Session load: {}", score.session_load);
                println!("  Fatigue level: {}", score.fatigue_level);
                if score.risk_flag {
                    println!("  Injury risk: {}", "HIGH".red().bold());
                } else {
                    println!("  Injury risk: {}", "normal".green());
                }
                println!("  Recommendation: {}", score.recommendation.to_string().cyan());
            }
        }

        Commands::Latest { athlete, limit } => {
            let db = open_database(&database_path)?;
            let records = db.fatigue_history(&athlete, limit.max(1))?;

            if records.is_empty() {
                println!("{}", format!("No sessions recorded for {}", athlete).yellow());
            } else {
                let rows: Vec<FatigueRow> = records.iter().map(FatigueRow::from).collect();
                let mut table = Table::new(rows);
                table.with(Style::rounded());
                println!("{}", format!("Fatigue records for {}", athlete).blue().bold());
                println!("{}", table);
            }
        }

        Commands::Config { show, init } => {
            if init {
                let path = cli
                    .config
                    .clone()
                    .unwrap_or_else(AppConfig::default_config_path);
                let mut defaults = AppConfig::default();
                defaults.save_to_file(&path)?;
                println!(
                    "{}",
                    format!("✓ Wrote default configuration to {}", path.display()).green()
                );
            }
            if show || !init {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

fn load_history(path: &Path) -> Result<HistoryTable> {
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    if is_csv {
        let file = File::open(path)
            .with_context(|| format!("Failed to open history file: {}", path.display()))?;
        Ok(HistoryTable::from_csv_reader(file)?)
    } else {
        let payload = fs::read_to_string(path)
            .with_context(|| format!("Failed to read history file: {}", path.display()))?;
        Ok(HistoryTable::from_json_str(&payload)?)
    }
}

fn open_database(path: &Path) -> Result<Database> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }
    }
    Database::new(path).with_context(|| format!("Failed to open database: {}", path.display()))
}

fn print_report(detailed: &DetailedReport) {
    let report = &detailed.report;

    println!("{}", "Load trend".cyan().bold());
    if report.tendencia.is_empty() {
        println!("  {}", "No forecast available".yellow());
    } else {
        let rows: Vec<ForecastRow> = report
            .tendencia
            .iter()
            .map(|point| ForecastRow {
                date: point.date.to_string(),
                load: format!("{:.1}", point.predicted_load),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{}", table);
    }

    println!("{}", "Risk summary".cyan().bold());
    println!("  Fatigue class: {}", format_label(report.riesgo_fatiga));
    println!("  Injury class: {}", format_label(report.riesgo_lesion));
    match report.exactitud_modelo_lesion {
        Some(accuracy) => println!("  Injury model accuracy: {:.1}%", accuracy * 100.0),
        None => println!("  Injury model accuracy: {}", "not trained".dimmed()),
    }

    for (stage, outcome) in [
        ("trend", &detailed.trend),
        ("fatigue", &detailed.fatigue),
        ("injury", &detailed.injury),
    ] {
        if let StageOutcome::Fallback { reason } = outcome {
            println!("  {} {}: {}", "⚠".yellow(), stage, reason.dimmed());
        }
    }
}

fn log_risk_error(err: &RiskError) {
    let level = err.severity().to_tracing_level();
    if level == Level::ERROR {
        tracing::error!(status = err.status_code(), error = %err, "Request failed");
    } else if level == Level::WARN {
        tracing::warn!(status = err.status_code(), error = %err, "Request rejected");
    } else {
        tracing::info!(status = err.status_code(), error = %err, "Request not completed");
    }
}

fn format_label(label: Option<i64>) -> ColoredString {
    match label {
        Some(0) => "0".green(),
        Some(value) => value.to_string().red().bold(),
        None => "unavailable".yellow(),
    }
}
