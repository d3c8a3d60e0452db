// src/tests/utils.rs
use chrono::NaiveDate;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::config::Config;
use crate::context::RunContext;
use crate::db::{date_key, Database};
use crate::domain::{Table, Value, DATE_PARSED, OFFER_ID};
use crate::errors::Result;
use crate::geocode::geocoder::GeocodeError;
use crate::geocode::{Coordinates, Geocoder};
use crate::scraper::extractor::{ExtractStats, Extraction};
use crate::scraper::fetcher::Transport;
use crate::scraper::{Extract, ScraperError};
use crate::transform::Transform;

pub const SAMPLE_CONFIG: &str = r#"
[database]
source = ":memory:"
destination = ":memory:"

[extraction]
index_url = "https://example.test/rent/"
detail_url = "https://example.test"
page_count = 2
max_tries = 2
request_spacing_ms = 0
link = { tag = "a", classes = ["offer-link"] }

[[extraction.fields]]
name = "flat_type"
tag = "h1"
classes = ["title"]
first_only = true

[[extraction.fields]]
name = "main_info"
tag = "div"
classes = ["info"]

[[extraction.fields]]
name = "fee_info"
tag = "span"
classes = ["fee"]

[[extraction.fields]]
name = "extra_features"
tag = "li"
classes = ["feature"]

[[extraction.fields]]
name = "address_info"
tag = "div"
classes = ["address"]
first_only = true

[[transformation.fields]]
name = "flat_type"
decoder = "flat_type"
features = [{ name = "room_count" }, { name = "is_studio" }]

[[transformation.fields]]
name = "main_info"
decoder = "main_info"
features = [
    { name = "area" },
    { name = "floor" },
    { name = "total_floors" },
    { name = "ceiling_height" },
    { name = "construction_year" },
]

[[transformation.fields]]
name = "fee_info"
decoder = "fee_info"
features = [
    { name = "fee_included" },
    { name = "fee_amount" },
    { name = "deposit" },
    { name = "fee_details" },
    { name = "commission" },
]

[[transformation.fields]]
name = "extra_features"
decoder = "extra_features"

[[transformation.fields.features]]
name = "has_fridge"
default = false
values = { "Холодильник" = true }

[[transformation.fields.features]]
name = "pets"
default = "unknown"
values = { "Можно с животными" = "allowed", "Без животных" = "forbidden" }

[[transformation.fields]]
name = "address_info"
decoder = "address_info"
per_observation = false
features = [{ name = "address_id" }, { name = "latitude" }, { name = "longitude" }]

[geocoder]
delay_ms = 0
rewrites = [{ pattern = "Ленинградская область, ", replacement = "" }]
"#;

pub fn sample_config() -> Config {
    Config::from_toml(SAMPLE_CONFIG).unwrap_or_else(|e| panic!("sample config invalid: {e}"))
}

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
}

pub fn context_on(d: u32) -> RunContext {
    RunContext::new(sample_config(), day(d))
}

pub fn memory_db(label: &str) -> Database {
    Database::new(label, ":memory:")
}

/// Listing rows with only `offer_id` and `date_parsed`.
pub fn dated_offers(ids: &[i64], d: u32) -> Table {
    Table::with_rows(
        [OFFER_ID, DATE_PARSED],
        ids.iter()
            .map(|id| vec![Value::Int(*id), Value::Text(date_key(day(d)))])
            .collect(),
    )
}

pub fn offer_ids(table: &Table) -> Vec<i64> {
    table
        .column(OFFER_ID)
        .unwrap_or_default()
        .into_iter()
        .filter_map(Value::as_i64)
        .collect()
}

/// Geocoder answering from a fixed map. Unknown addresses are "not found";
/// addresses listed in `failing` return a service error.
#[derive(Default)]
pub struct FakeGeocoder {
    known: HashMap<String, Coordinates>,
    failing: Vec<String>,
    pub calls: RefCell<Vec<String>>,
}

impl FakeGeocoder {
    pub fn with(mut self, address: &str, latitude: f64, longitude: f64) -> Self {
        self.known.insert(
            address.to_string(),
            Coordinates {
                latitude,
                longitude,
            },
        );
        self
    }

    pub fn failing(mut self, address: &str) -> Self {
        self.failing.push(address.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

impl Geocoder for FakeGeocoder {
    fn geocode(&self, address: &str) -> std::result::Result<Option<Coordinates>, GeocodeError> {
        self.calls.borrow_mut().push(address.to_string());
        if self.failing.iter().any(|a| a == address) {
            return Err(GeocodeError::Status(500));
        }
        Ok(self.known.get(address).copied())
    }
}

/// Serves canned bodies by URL; anything else is a 404.
#[derive(Default)]
pub struct PageTransport {
    pages: HashMap<String, String>,
    pub calls: RefCell<Vec<String>>,
}

impl PageTransport {
    pub fn page(mut self, url: &str, body: impl Into<String>) -> Self {
        self.pages.insert(url.to_string(), body.into());
        self
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.borrow().iter().filter(|u| *u == url).count()
    }
}

impl Transport for PageTransport {
    fn get(&self, url: &str, _proxy: Option<&str>) -> std::result::Result<String, ScraperError> {
        self.calls.borrow_mut().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or(ScraperError::Status(404))
    }
}

pub fn index_page(hrefs: &[&str]) -> String {
    let links: String = hrefs
        .iter()
        .map(|h| format!(r#"<a class="offer-link" href="{h}">offer</a>"#))
        .collect();
    format!("<html><body>{links}</body></html>")
}

pub fn detail_page(
    flat_type: &str,
    info: &[&str],
    fee: &[&str],
    features: &[&str],
    address: &str,
) -> String {
    let info: String = info
        .iter()
        .map(|t| format!(r#"<div class="info">{t}</div>"#))
        .collect();
    let fee: String = fee
        .iter()
        .map(|t| format!(r#"<span class="fee">{t}</span>"#))
        .collect();
    let features: String = features
        .iter()
        .map(|t| format!(r#"<li class="feature">{t}</li>"#))
        .collect();
    format!(
        r#"<html><body><h1 class="title">{flat_type}</h1>{info}{fee}<ul>{features}</ul><div class="address">{address}</div></body></html>"#
    )
}

/// Hands back a fixed table and counts how often it was asked.
pub struct FakeExtract {
    table: Table,
    pub calls: Cell<usize>,
}

impl FakeExtract {
    pub fn returning(table: Table) -> Self {
        Self {
            table,
            calls: Cell::new(0),
        }
    }
}

impl Extract for FakeExtract {
    fn extract(&self) -> Result<Extraction> {
        self.calls.set(self.calls.get() + 1);
        Ok(Extraction {
            stats: ExtractStats {
                parsed: self.table.len(),
                pages_visited: 1,
                ..ExtractStats::default()
            },
            table: self.table.clone(),
        })
    }
}

/// Passes rows through untouched, or drops them all when `empty`.
#[derive(Default)]
pub struct FakeTransform {
    empty: bool,
    pub calls: Cell<usize>,
}

impl FakeTransform {
    pub fn dropping_everything() -> Self {
        Self {
            empty: true,
            calls: Cell::new(0),
        }
    }
}

impl Transform for FakeTransform {
    fn transform(&self, raw: Table) -> Result<Table> {
        self.calls.set(self.calls.get() + 1);
        if self.empty {
            Ok(Table::new(raw.columns().to_vec()))
        } else {
            Ok(raw)
        }
    }
}
