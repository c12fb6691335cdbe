use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use costpulse::analysis::BaselineModeler;
use costpulse::config::EngineConfig;
use costpulse::forecast::{analyze_variance, ForecastRequest};
use costpulse::model::{monthly_totals, sanitize_records, CostObservation, RawCostRecord, ResourceRecord};

#[derive(Parser)]
#[command(
    name = "costpulse",
    about = "Cloud cost baselines, anomaly detection and spend forecasting",
    version,
    long_about = None
)]
struct Cli {
    /// TOML config file (defaults to $COSTPULSE_CONFIG, then ./costpulse.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit baseline models to a cost series and report the selected one
    Baseline {
        /// JSON array of cost records
        #[arg(long)]
        input: PathBuf,
    },

    /// Flag anomalous cost observations and attribute their causes
    Detect {
        /// JSON array of cost records
        #[arg(long)]
        input: PathBuf,

        /// JSON array of resource records used for attribution
        #[arg(long)]
        resources: Option<PathBuf>,
    },

    /// Project monthly spend from a cost series
    Forecast {
        /// JSON array of cost records, summed per calendar month
        #[arg(long)]
        input: PathBuf,

        /// JSON forecast request; overrides the flags below
        #[arg(long)]
        request: Option<PathBuf>,

        #[arg(long, default_value = "default")]
        budget_id: String,

        /// Months to project
        #[arg(long, default_value = "12")]
        months: usize,

        /// Annual growth rate as a fraction (0.15 = 15%)
        #[arg(long)]
        growth: Option<f64>,

        /// Confidence level of the band, in (0, 1)
        #[arg(long)]
        confidence: Option<f64>,
    },

    /// Compare actual spend with the forecast and a budget
    Variance {
        /// JSON array of cost records, summed per calendar month
        #[arg(long)]
        input: PathBuf,

        #[arg(long, default_value = "default")]
        budget_id: String,

        /// Actual spend for the current month
        #[arg(long)]
        actual: f64,

        /// Budget amount for the current month
        #[arg(long)]
        budget: f64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::load_or_default(),
    };
    init_tracing(&config);
    config.validate().context("invalid configuration")?;

    match cli.command {
        Commands::Baseline { input } => {
            let observations = read_observations(&input)?;
            tracing::info!(count = observations.len(), "establishing baseline");
            let baseline = BaselineModeler::new(config.baseline).establish(&observations);
            print_json(&baseline)?;
        }
        Commands::Detect { input, resources } => {
            let observations = read_observations(&input)?;
            let resources: Vec<ResourceRecord> = match resources {
                Some(path) => read_json(&path)?,
                None => Vec::new(),
            };
            let result = config.detector().detect(&observations, &resources);
            print_json(&result)?;
        }
        Commands::Forecast {
            input,
            request,
            budget_id,
            months,
            growth,
            confidence,
        } => {
            let observations = read_observations(&input)?;
            let request = match request {
                Some(path) => read_json(&path)?,
                None => {
                    let mut req = ForecastRequest::new(budget_id, months)
                        .with_confidence_level(confidence.unwrap_or(config.forecast.confidence_level));
                    if let Some(rate) = growth {
                        req = req.with_growth(rate);
                    }
                    req
                }
            };
            let monthly = monthly_totals(&observations);
            tracing::info!(months = monthly.len(), "projecting from monthly totals");
            let baseline = BaselineModeler::new(config.baseline).establish(&monthly);
            let forecast = config.projector().project(&baseline, &request)?;
            print_json(&forecast)?;
        }
        Commands::Variance {
            input,
            budget_id,
            actual,
            budget,
        } => {
            if !actual.is_finite() || !budget.is_finite() {
                bail!("actual spend and budget must be finite numbers");
            }
            let monthly = monthly_totals(&read_observations(&input)?);
            let baseline = BaselineModeler::new(config.baseline).establish(&monthly);
            let request = ForecastRequest::new(budget_id, 1)
                .with_confidence_level(config.forecast.confidence_level);
            let forecast = config.projector().project(&baseline, &request)?;
            let variance = analyze_variance(&forecast, actual, budget);
            print_json(&variance)?;
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout carries only result JSON.
fn init_tracing(config: &EngineConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn read_observations(path: &Path) -> Result<Vec<CostObservation>> {
    let records: Vec<RawCostRecord> = read_json(path)?;
    Ok(sanitize_records(&records))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
