//! wxedge CLI
//!
//! Thin pass-through over the engine: run a cycle against a market snapshot,
//! resolve due trades from an outcome file, print the ledger, check config.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wxedge::config::{AppConfig, LoggingSection};
use wxedge::oracle::sources::StaticSource;
use wxedge::persistence::{CsvLedger, LedgerReport};
use wxedge::strategy::{Providers, TradingEngine};

/// Weather market signal & risk engine (paper trading only)
#[derive(Parser, Debug)]
#[command(name = "wxedge")]
#[command(version, about = "Forecast-vs-market signal and risk engine for weather outcome markets")]
struct Args {
    /// Evaluate as of this instant (RFC 3339) instead of now
    #[arg(long, global = true)]
    now: Option<DateTime<Utc>>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one cycle (resolve, scan, execute) against a market snapshot
    Scan {
        /// JSON file with `events` and `forecasts`
        snapshot: PathBuf,
        /// JSON file with `settlements` and `observations` for the resolve pass
        #[arg(long)]
        outcomes: Option<PathBuf>,
        /// Scan only; print signals without touching the ledger
        #[arg(long)]
        dry_run: bool,
    },
    /// Resolve due trades from an outcome file
    Resolve {
        /// JSON file with `settlements` and `observations`
        outcomes: PathBuf,
    },
    /// Print a ledger summary
    Report,
    /// Validate configuration and print the effective settings
    CheckConfig,
}

fn init_logging(logging: &LoggingSection) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let app = AppConfig::load()?;
    init_logging(&app.logging);

    let engine_config = app.validate().context("Invalid configuration")?;
    let now = args.now.unwrap_or_else(Utc::now);
    info!(config = %app, %now, "wxedge starting");

    match args.command {
        Command::CheckConfig => {
            println!("Configuration OK");
            println!("{app}");
            println!("data_dir={}", app.persistence.data_dir);
        }
        Command::Report => {
            let ledger = CsvLedger::open(&app.persistence.data_dir)?;
            print!("{}", LedgerReport::build(&ledger));
        }
        Command::Resolve { outcomes } => {
            let source = StaticSource::from_outcome_file(&outcomes)?;
            let ledger = CsvLedger::open(&app.persistence.data_dir)?;
            let mut engine = TradingEngine::new(engine_config, ledger)?;
            let summary = engine.resolve(&source, &source, now).await?;
            println!(
                "Resolved {} (W{} / L{} / V{}), pnl ${:.2}; {} pending date, {} unavailable",
                summary.resolved,
                summary.wins,
                summary.losses,
                summary.voids,
                summary.total_pnl,
                summary.skipped_future,
                summary.unavailable
            );
        }
        Command::Scan {
            snapshot,
            outcomes,
            dry_run,
        } => {
            let markets = StaticSource::from_market_file(&snapshot)?;
            let outcomes = match outcomes {
                Some(path) => StaticSource::from_outcome_file(&path)?,
                None => StaticSource::default(),
            };
            let ledger = CsvLedger::open(&app.persistence.data_dir)?;
            let mut engine = TradingEngine::new(engine_config, ledger)?;

            if dry_run {
                let scan = engine.scan(&markets, &markets, now).await?;
                for c in &scan.candidates {
                    let s = &c.signal;
                    println!(
                        "{} {} {} p={:.3} m={:.3} edge={:+.3} kelly={:.4} ${:.2} [{}]",
                        s.instrument_id,
                        s.side,
                        s.bucket_label,
                        s.modeled_probability,
                        s.market_price,
                        s.edge,
                        s.applied_fraction,
                        s.recommended_notional,
                        s.confidence
                    );
                }
                for skip in &scan.skips {
                    println!("skip {} {}: {}", skip.event_id, skip.reason, skip.detail);
                }
            } else {
                let providers = Providers {
                    markets: &markets,
                    forecasts: &markets,
                    settlements: &outcomes,
                    observations: &outcomes,
                };
                let report = engine.run_cycle(&providers, now).await?;
                print!("{report}");
            }
        }
    }

    Ok(())
}
