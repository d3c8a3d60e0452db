// src/config.rs

//! TOML configuration for one source site, its decoders and the geocoder.

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use crate::domain::Value;
use crate::errors::{EtlError, Result};
use crate::transform::registry;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub tables: TableNames,
    pub extraction: ExtractionConfig,
    pub transformation: TransformationConfig,
    #[serde(default)]
    pub geocoder: GeocoderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub source: String,
    pub destination: String,
    /// Optional SQL applied to both databases at start-up.
    #[serde(default)]
    pub schema: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableNames {
    #[serde(default = "default_listing_table")]
    pub source: String,
    #[serde(default = "default_listing_table")]
    pub destination: String,
    #[serde(default = "default_address_table")]
    pub addresses: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            source: default_listing_table(),
            destination: default_listing_table(),
            addresses: default_address_table(),
        }
    }
}

/// Element lookup by tag name plus any of the given classes.
#[derive(Debug, Clone, Deserialize)]
pub struct Selection {
    pub tag: String,
    #[serde(default)]
    pub classes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldSelection {
    pub name: String,
    pub tag: String,
    #[serde(default)]
    pub classes: Vec<String>,
    /// Keep only the first matched element's text instead of the list.
    #[serde(default)]
    pub first_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    pub index_url: String,
    pub detail_url: String,
    pub page_count: usize,
    #[serde(default = "default_max_tries")]
    pub max_tries: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_request_spacing_ms")]
    pub request_spacing_ms: u64,
    #[serde(default)]
    pub use_proxy: bool,
    #[serde(default = "default_proxies_path")]
    pub proxies_path: String,
    #[serde(default = "default_proxy_list_url")]
    pub proxy_list_url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub link: Selection,
    pub fields: Vec<FieldSelection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransformationConfig {
    pub fields: Vec<FieldSpec>,
}

/// How one raw column is turned into typed columns.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub decoder: String,
    #[serde(default = "default_true")]
    pub per_observation: bool,
    pub features: Vec<FeatureSpec>,
}

impl FieldSpec {
    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|f| f.name.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    #[serde(default)]
    pub default: Option<Value>,
    /// Token -> output value, used by categorical decoders.
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddressRewrite {
    pub pattern: String,
    pub replacement: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeocoderConfig {
    #[serde(default = "default_geocoder_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_geocoder_delay_ms")]
    pub delay_ms: u64,
    #[serde(default)]
    pub rewrites: Vec<AddressRewrite>,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_geocoder_endpoint(),
            timeout_secs: default_timeout_secs(),
            delay_ms: default_geocoder_delay_ms(),
            rewrites: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listing_table() -> String {
    "realty".to_string()
}
fn default_address_table() -> String {
    "addresses".to_string()
}
fn default_max_tries() -> usize {
    3
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_request_spacing_ms() -> u64 {
    1000
}
fn default_proxies_path() -> String {
    "proxies.txt".to_string()
}
fn default_proxy_list_url() -> String {
    "https://free-proxy-list.net/".to_string()
}
fn default_geocoder_endpoint() -> String {
    "https://geocode.arcgis.com/arcgis/rest/services/World/GeocodeServer/findAddressCandidates"
        .to_string()
}
fn default_geocoder_delay_ms() -> u64 {
    100
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}

impl Config {
    /// Reads and validates a config file. Decoder names are resolved here so
    /// a typo fails before any request is made.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            EtlError::config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let ex = &self.extraction;
        if ex.max_tries == 0 {
            return Err(EtlError::config("extraction.max_tries must be at least 1"));
        }

        let mut raw_names = HashSet::new();
        for field in &ex.fields {
            if !raw_names.insert(field.name.as_str()) {
                return Err(EtlError::config(format!(
                    "Duplicate extraction field '{}'",
                    field.name
                )));
            }
        }

        for spec in &self.transformation.fields {
            if !raw_names.contains(spec.name.as_str()) {
                return Err(EtlError::config(format!(
                    "Transformation field '{}' is not extracted",
                    spec.name
                )));
            }
        }

        registry::resolve_fields(&self.transformation.fields)?;
        Ok(())
    }
}
