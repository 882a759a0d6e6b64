#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line interface for the zone safety engine.
//!
//! Uses `indicatif-log-bridge` (via [`zone_safety_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod output;
mod run;

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use uuid::Uuid;
use zone_safety_engine::{EngineConfig, ZoneQuery, ZoneSafetyEngine};
use zone_safety_etl_models::{DateRange, RunRequest};
use zone_safety_metrics_models::RiskTier;

#[derive(Parser)]
#[command(name = "zone_safety", about = "Zone safety scoring engine")]
struct Cli {
    /// Config file (defaults to the built-in configuration)
    #[arg(long, global = true, env = "ZONE_SAFETY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch incidents and compute zone scores
    Run {
        /// Fetch only what is new since the last stored incident
        #[arg(long)]
        incremental: bool,
        /// Comma-separated zone codes to score (default: all)
        #[arg(long)]
        zones: Option<String>,
        /// Recompute even if scores for the date already exist
        #[arg(long)]
        force: bool,
        /// First day to fetch (requires --to)
        #[arg(long, requires = "to")]
        from: Option<NaiveDate>,
        /// Last day to fetch; also the calculation date
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,
        /// Calculation date (default: today)
        #[arg(long, conflicts_with = "to")]
        as_of: Option<NaiveDate>,
    },
    /// Show one job
    Status {
        job_id: Uuid,
    },
    /// List recent jobs
    Jobs {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Show a zone's score
    Score {
        zone: String,
        /// Calculation date (default: the zone's latest)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// List zones with their latest scores, most dangerous first
    Zones {
        /// Only zones in this tier (e.g. VERY_HIGH)
        #[arg(long)]
        risk_tier: Option<RiskTier>,
        #[arg(long, default_value = "20")]
        limit: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
    },
    /// Show stored incident and score coverage
    Availability,
    /// Show a zone's score history
    History {
        zone: String,
        #[arg(long, default_value = "90")]
        days: u32,
    },
    /// Detect anomalous zones
    Anomalies {
        /// Rolling window the model reads: 7, 30, or 90 days
        #[arg(long, default_value = "30")]
        window_days: u32,
    },
    /// Segment zones into clusters
    Clusters,
    /// Combined anomalies, clusters, and forecasts
    Insights,
    /// Forecast a zone's safety score
    Predict {
        zone: String,
    },
    /// Print the effective configuration
    Config,
}

fn parse_zones(zones: &str) -> Vec<String> {
    zones
        .split(',')
        .map(str::trim)
        .filter(|z| !z.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn build_request(
    incremental: bool,
    zones: Option<&str>,
    force: bool,
    range: Option<(NaiveDate, NaiveDate)>,
    as_of: Option<NaiveDate>,
) -> Result<RunRequest, Box<dyn std::error::Error>> {
    let mut request = if incremental {
        RunRequest::incremental()
    } else {
        RunRequest::default()
    }
    .with_force_refresh(force);

    if let Some(zones) = zones {
        request = request.with_zones(parse_zones(zones));
    }
    if let Some((from, to)) = range {
        request = request.with_date_range(DateRange::new(from, to)?);
    }
    if let Some(as_of) = as_of {
        request = request.with_as_of(as_of);
    }

    Ok(request)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = zone_safety_cli_utils::init_logger();
    let cli = Cli::parse();

    let config = EngineConfig::load(cli.config.as_deref())?;

    if matches!(cli.command, Commands::Config) {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let engine = ZoneSafetyEngine::open(&config)?;

    match cli.command {
        Commands::Run {
            incremental,
            zones,
            force,
            from,
            to,
            as_of,
        } => {
            let request =
                build_request(incremental, zones.as_deref(), force, from.zip(to), as_of)?;
            let job = run::run_job(&engine, &multi, request).await?;
            output::print_json(&job)?;
            if let Some(error) = job.error {
                return Err(format!("Job {} failed: {error}", job.id).into());
            }
        }
        Commands::Status { job_id } => {
            let job = engine
                .status(job_id)?
                .ok_or_else(|| format!("Unknown job: {job_id}"))?;
            output::print_json(&job)?;
        }
        Commands::Jobs { limit } => output::print_jobs(&engine.list_jobs(limit)?),
        Commands::Score { zone, date } => {
            let score = engine
                .get_score(&zone, date)?
                .ok_or_else(|| format!("No score for zone {zone}"))?;
            output::print_json(&score)?;
        }
        Commands::Zones {
            risk_tier,
            limit,
            offset,
        } => {
            let mut query = ZoneQuery::default().with_limit(limit).with_offset(offset);
            query.risk_tier = risk_tier;
            output::print_zones(&engine.list_zones(&query)?);
        }
        Commands::Availability => output::print_json(&engine.data_availability()?)?,
        Commands::History { zone, days } => {
            output::print_history(&engine.score_history(&zone, days)?);
        }
        Commands::Anomalies { window_days } => {
            output::print_json(&engine.anomalies(window_days)?)?;
        }
        Commands::Clusters => output::print_json(&engine.clusters()?)?,
        Commands::Insights => output::print_json(&engine.insights())?,
        Commands::Predict { zone } => output::print_json(&engine.predict(&zone)?)?,
        Commands::Config => {}
    }

    Ok(())
}
