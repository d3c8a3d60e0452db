// extractor.rs
use ::scraper::{Html, Selector};
use log::{info, warn};
use std::thread;
use std::time::Duration;
use url::Url;

use crate::context::RunContext;
use crate::domain::{RawListing, Table, Value, DATE_PARSED, OFFER_ID};
use crate::errors::{EtlError, Result};
use crate::scraper::fetcher::{Fetcher, HttpTransport, Transport};
use crate::scraper::selectors::{compile_selection, FieldSelector};

/// Produces the raw listing table for one run.
pub trait Extract {
    fn extract(&self) -> Result<Extraction>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub parsed: usize,
    pub skipped: usize,
    pub pages_visited: usize,
    pub pages_failed: usize,
}

#[derive(Debug)]
pub struct Extraction {
    pub table: Table,
    pub stats: ExtractStats,
}

pub struct Extractor<'a, T: Transport = HttpTransport> {
    ctx: &'a RunContext,
    fetcher: Fetcher<T>,
    link: Selector,
    fields: Vec<FieldSelector>,
    detail_base: Url,
    spacing: Duration,
}

impl<'a, T: Transport> Extractor<'a, T> {
    pub fn new(ctx: &'a RunContext, fetcher: Fetcher<T>) -> Result<Self> {
        let cfg = &ctx.config.extraction;

        let fields = cfg
            .fields
            .iter()
            .map(FieldSelector::new)
            .collect::<Result<Vec<_>>>()?;
        let detail_base = Url::parse(&cfg.detail_url)
            .map_err(|e| EtlError::config(format!("Invalid detail_url {}: {e}", cfg.detail_url)))?;

        Ok(Self {
            ctx,
            fetcher,
            link: compile_selection(&cfg.link)?,
            fields,
            detail_base,
            spacing: Duration::from_millis(cfg.request_spacing_ms),
        })
    }

    #[cfg(test)]
    pub fn fetcher(&self) -> &Fetcher<T> {
        &self.fetcher
    }

    fn index_url(&self, page: usize) -> String {
        let base = &self.ctx.config.extraction.index_url;
        let sep = if base.contains('?') { '&' } else { '?' };
        format!("{base}{sep}page={page}")
    }

    /// `href` attributes of every detail link on an index page.
    fn links(&self, html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        document
            .select(&self.link)
            .filter_map(|el| el.value().attr("href"))
            .map(str::to_string)
            .collect()
    }

    fn scrape_detail(&self, href: &str, offer_id: i64) -> Option<RawListing> {
        let url = match self.detail_base.join(href) {
            Ok(url) => url,
            Err(e) => {
                warn!("Cannot build a detail URL from {href}: {e}");
                return None;
            }
        };

        let fetched = self.fetcher.fetch(url.as_str());
        thread::sleep(self.spacing);

        match fetched {
            Ok(html) => {
                let document = Html::parse_document(&html);
                let values = self.fields.iter().map(|f| f.extract(&document)).collect();
                Some(RawListing { offer_id, values })
            }
            Err(failure) => {
                warn!("{failure}");
                None
            }
        }
    }
}

impl<T: Transport> Extract for Extractor<'_, T> {
    fn extract(&self) -> Result<Extraction> {
        info!("STARTING PARSING STAGE");

        let mut columns: Vec<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();
        columns.push(OFFER_ID);
        let mut table = Table::new(columns);
        let mut stats = ExtractStats::default();

        for page in 0..self.ctx.config.extraction.page_count {
            let index = match self.fetcher.fetch(&self.index_url(page)) {
                Ok(html) => html,
                Err(failure) => {
                    warn!("Index page {page} skipped: {failure}");
                    stats.pages_failed += 1;
                    continue;
                }
            };
            stats.pages_visited += 1;

            for href in self.links(&index) {
                let Some(offer_id) = offer_id_from_href(&href) else {
                    warn!("Link {href} does not end with a numeric offer id, skipping");
                    continue;
                };
                match self.scrape_detail(&href, offer_id) {
                    Some(listing) => {
                        table.push_row(listing.into_row());
                        stats.parsed += 1;
                    }
                    None => stats.skipped += 1,
                }
            }

            info!(
                "Page {page}: parsed = {}, skipped = {}",
                stats.parsed, stats.skipped
            );
        }

        let dropped = table.dedup_by(OFFER_ID);
        if dropped > 0 {
            info!("Dropped {dropped} duplicate offers");
        }
        table.fill_column(DATE_PARSED, Value::Text(self.ctx.date_key()));

        info!(
            "Parsed = {}, skipped = {}, pages visited = {}, pages failed = {}",
            stats.parsed, stats.skipped, stats.pages_visited, stats.pages_failed
        );
        info!("ENDING PARSING STAGE");
        Ok(Extraction { table, stats })
    }
}

/// Last non-empty path segment of a link, as an integer.
pub fn offer_id_from_href(href: &str) -> Option<i64> {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    path.split('/')
        .filter(|s| !s.is_empty())
        .last()
        .and_then(|s| s.parse().ok())
}
