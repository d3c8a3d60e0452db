// src/main.rs

//! realty_etl: scrape rental listings, decode them into typed columns,
//! geocode their addresses and load the result into SQLite.

mod config;
mod context;
mod db;
mod domain;
mod errors;
mod geocode;
mod pipeline;
mod scraper;
mod transform;

#[cfg(test)]
mod tests;

use clap::{ArgAction, Parser, Subcommand};
use log::{error, info};
use std::process::ExitCode;

use crate::config::Config;
use crate::context::RunContext;
use crate::db::{init_db, Database};
use crate::errors::Result;
use crate::geocode::{AddressResolver, ArcGisGeocoder};
use crate::pipeline::{Pipeline, PipelineOutcome, RunFlags};
use crate::scraper::{refresh_proxies, Extractor, Fetcher};
use crate::transform::Transformer;

#[derive(Parser, Debug)]
#[command(name = "realty_etl", version, about = "Rental listings ETL")]
struct Cli {
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract, transform and load today's listings
    Run {
        #[arg(long, action = ArgAction::Set, default_value_t = true)]
        parse: bool,
        #[arg(long, action = ArgAction::Set, default_value_t = true)]
        transform: bool,
        /// Replace today's rows in the source table
        #[arg(long, action = ArgAction::Set, default_value_t = false)]
        overwrite_source: bool,
        /// Replace today's rows in the destination table
        #[arg(long, action = ArgAction::Set, default_value_t = false)]
        overwrite_destination: bool,
    },
    /// Re-transform raw batches stored in the source table
    Rebuild {
        /// Only the newest batch, replacing its destination rows
        #[arg(long)]
        latest: bool,
    },
    /// Refresh the proxy list file from the public proxy list
    Proxies,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            init_logging("info");
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.logging.level);

    let result = match cli.command {
        Command::Run {
            parse,
            transform,
            overwrite_source,
            overwrite_destination,
        } => {
            let flags = RunFlags {
                parse,
                transform,
                overwrite_source,
                overwrite_destination,
            };
            with_pipeline(config, |pipeline| pipeline.run(flags))
        }
        Command::Rebuild { latest } => with_pipeline(config, |pipeline| pipeline.rebuild(latest)),
        Command::Proxies => refresh_proxies(&config.extraction).map(|_| PipelineOutcome::Completed),
    };

    match result {
        Ok(PipelineOutcome::Completed) => ExitCode::SUCCESS,
        Ok(PipelineOutcome::EmptyAtStage(stage)) => {
            info!("Run finished early at the {stage} stage");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Wires stores, geocoder, transformer and extractor, then hands the
/// pipeline to `job`.
fn with_pipeline<F>(config: Config, job: F) -> Result<PipelineOutcome>
where
    F: FnOnce(&Pipeline<'_>) -> Result<PipelineOutcome>,
{
    let ctx = RunContext::today(config);
    let cfg = &ctx.config;

    let source = Database::new("source", cfg.database.source.as_str());
    let destination = Database::new("destination", cfg.database.destination.as_str());
    // The schema only declares the address cache, which lives in the source store.
    if let Some(schema) = &cfg.database.schema {
        init_db(&source, schema)?;
    }

    let geocoder = ArcGisGeocoder::new(&cfg.geocoder)?;
    let resolver = AddressResolver::new(&source, &geocoder, cfg);
    let transformer = Transformer::new(cfg, resolver)?;
    let extractor = Extractor::new(&ctx, Fetcher::from_config(&cfg.extraction)?)?;

    job(&Pipeline::new(
        &ctx,
        &extractor,
        &transformer,
        &source,
        &destination,
    ))
}
