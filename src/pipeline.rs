// src/pipeline.rs

//! Sequences extract, transform and load for one run date.

use chrono::NaiveDate;
use log::{info, warn};
use std::fmt;

use crate::context::RunContext;
use crate::db::{DateFilter, Store, WriteMode};
use crate::domain::{Table, Value, DATE_PARSED};
use crate::errors::{EtlError, Result};
use crate::scraper::Extract;
use crate::transform::Transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunFlags {
    pub parse: bool,
    pub transform: bool,
    pub overwrite_source: bool,
    pub overwrite_destination: bool,
}

impl Default for RunFlags {
    fn default() -> Self {
        Self {
            parse: true,
            transform: true,
            overwrite_source: false,
            overwrite_destination: false,
        }
    }
}

/// Where a run found nothing to hand on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    SourceRead,
    Transform,
}

impl Stage {
    pub fn empty_message(self) -> &'static str {
        match self {
            Stage::Extract => "There is no raw data parsed",
            Stage::SourceRead => {
                "There is no raw data stored in the source database with the current date"
            }
            Stage::Transform => "There is no data left after transformation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extract => "extract",
            Stage::SourceRead => "source read",
            Stage::Transform => "transform",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    Completed,
    EmptyAtStage(Stage),
}

pub struct Pipeline<'a> {
    ctx: &'a RunContext,
    extractor: &'a dyn Extract,
    transformer: &'a dyn Transform,
    source: &'a dyn Store,
    destination: &'a dyn Store,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        ctx: &'a RunContext,
        extractor: &'a dyn Extract,
        transformer: &'a dyn Transform,
        source: &'a dyn Store,
        destination: &'a dyn Store,
    ) -> Self {
        Self {
            ctx,
            extractor,
            transformer,
            source,
            destination,
        }
    }

    pub fn run(&self, flags: RunFlags) -> Result<PipelineOutcome> {
        if !flags.parse && !flags.transform {
            warn!("Neither parsing nor transforming is requested");
            return Ok(PipelineOutcome::Completed);
        }

        info!("=== STARTING ETL PIPELINE ===");
        let outcome = self.run_stages(flags)?;
        if let PipelineOutcome::EmptyAtStage(stage) = outcome {
            warn!("{}", stage.empty_message());
        }
        info!("=== ENDING ETL PIPELINE ===");
        Ok(outcome)
    }

    fn run_stages(&self, flags: RunFlags) -> Result<PipelineOutcome> {
        let tables = &self.ctx.config.tables;

        let extracted = if flags.parse {
            let extraction = self.extractor.extract()?;
            if extraction.stats.pages_failed > 0 {
                warn!(
                    "{} of {} index pages could not be fetched",
                    extraction.stats.pages_failed,
                    extraction.stats.pages_failed + extraction.stats.pages_visited
                );
            }
            let raw = extraction.table;
            if raw.is_empty() {
                return Ok(PipelineOutcome::EmptyAtStage(Stage::Extract));
            }
            self.load(self.source, &tables.source, &raw, flags.overwrite_source)?;
            Some(raw)
        } else {
            None
        };

        if !flags.transform {
            return Ok(PipelineOutcome::Completed);
        }

        let raw = match extracted {
            Some(raw) => raw,
            None => self
                .source
                .read(&tables.source, DateFilter::On(self.ctx.run_date))?,
        };
        if raw.is_empty() {
            return Ok(PipelineOutcome::EmptyAtStage(Stage::SourceRead));
        }

        let transformed = self.transformer.transform(raw)?;
        if transformed.is_empty() {
            return Ok(PipelineOutcome::EmptyAtStage(Stage::Transform));
        }
        self.load(
            self.destination,
            &tables.destination,
            &transformed,
            flags.overwrite_destination,
        )?;

        Ok(PipelineOutcome::Completed)
    }

    /// Re-transforms raw batches already in the source table, one
    /// `date_parsed` batch at a time. `latest` rebuilds only the newest
    /// batch, replacing its destination rows. Otherwise the destination
    /// table is recreated from every stored batch.
    pub fn rebuild(&self, latest: bool) -> Result<PipelineOutcome> {
        info!("=== STARTING REBUILD ===");
        let outcome = self.rebuild_batches(latest)?;
        if let PipelineOutcome::EmptyAtStage(stage) = outcome {
            warn!("{}", stage.empty_message());
        }
        info!("=== ENDING REBUILD ===");
        Ok(outcome)
    }

    fn rebuild_batches(&self, latest: bool) -> Result<PipelineOutcome> {
        let tables = &self.ctx.config.tables;
        let filter = if latest {
            DateFilter::Latest
        } else {
            DateFilter::All
        };

        let raw = self.source.read(&tables.source, filter)?;
        if raw.is_empty() {
            return Ok(PipelineOutcome::EmptyAtStage(Stage::SourceRead));
        }

        let mut batches = raw.partition_by(DATE_PARSED);
        batches.sort_by(|(a, _), (b, _)| a.as_str().cmp(&b.as_str()));

        let mut written = 0;
        for (date, batch) in batches {
            info!("Rebuilding batch {} ({} rows)", batch_label(&date), batch.len());
            let transformed = self.transformer.transform(batch)?;
            if transformed.is_empty() {
                continue;
            }

            let mode = if latest {
                let removed = self
                    .destination
                    .delete_for_date(&tables.destination, parse_batch_date(&date)?)?;
                info!(
                    "Removed {removed} rows dated {} from {}",
                    batch_label(&date),
                    tables.destination
                );
                WriteMode::Append
            } else if written == 0 {
                WriteMode::Replace
            } else {
                WriteMode::Append
            };
            written += self
                .destination
                .write(&tables.destination, &transformed, mode)?;
        }

        if written == 0 {
            return Ok(PipelineOutcome::EmptyAtStage(Stage::Transform));
        }
        info!("Rebuilt {written} rows into {}", tables.destination);
        Ok(PipelineOutcome::Completed)
    }

    /// Appends `rows`, first clearing the run date's rows when asked to.
    fn load(&self, store: &dyn Store, table: &str, rows: &Table, overwrite: bool) -> Result<()> {
        if overwrite {
            let removed = store.delete_for_date(table, self.ctx.run_date)?;
            info!(
                "Removed {removed} rows dated {} from {table}",
                self.ctx.date_key()
            );
        }
        store.write(table, rows, WriteMode::Append)?;
        Ok(())
    }
}

fn batch_label(date: &Value) -> &str {
    date.as_str().unwrap_or("undated")
}

fn parse_batch_date(date: &Value) -> Result<NaiveDate> {
    let text = date
        .as_str()
        .ok_or_else(|| EtlError::storage(format!("batch has no {DATE_PARSED}")))?;
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|e| EtlError::storage(format!("bad {DATE_PARSED} '{text}': {e}")))
}
