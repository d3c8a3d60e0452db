// src/context.rs

use chrono::{Local, NaiveDate};

use crate::config::Config;
use crate::db::date_key;

/// What every stage of one run shares: the loaded configuration and the
/// date stamped on (and used to scope overwrites of) its rows.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub config: Config,
    pub run_date: NaiveDate,
}

impl RunContext {
    pub fn new(config: Config, run_date: NaiveDate) -> Self {
        Self { config, run_date }
    }

    pub fn today(config: Config) -> Self {
        Self::new(config, Local::now().date_naive())
    }

    pub fn date_key(&self) -> String {
        date_key(self.run_date)
    }
}
