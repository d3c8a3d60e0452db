// src/geocode/geocoder.rs

use log::debug;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::GeocoderConfig;
use crate::errors::{EtlError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocoder request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("geocoder returned HTTP {0}")]
    Status(u16),

    #[error("geocoder error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("unreadable geocoder response: {0}")]
    Response(#[from] serde_json::Error),
}

/// Free-text address lookup. `Ok(None)` means the service answered but
/// found nothing.
pub trait Geocoder {
    fn geocode(&self, address: &str) -> std::result::Result<Option<Coordinates>, GeocodeError>;
}

/// ArcGIS World geocoding service, `findAddressCandidates` endpoint.
pub struct ArcGisGeocoder {
    client: Client,
    endpoint: Url,
}

#[derive(Debug, Deserialize)]
struct CandidatesResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    location: Location,
}

#[derive(Debug, Deserialize)]
struct Location {
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    #[serde(default)]
    message: String,
}

impl ArcGisGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            EtlError::config(format!("Invalid geocoder endpoint {}: {e}", config.endpoint))
        })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, endpoint })
    }

    fn request_url(&self, address: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("SingleLine", address)
            .append_pair("f", "json")
            .append_pair("maxLocations", "1");
        url
    }
}

impl Geocoder for ArcGisGeocoder {
    fn geocode(&self, address: &str) -> std::result::Result<Option<Coordinates>, GeocodeError> {
        let resp = self.client.get(self.request_url(address)).send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(GeocodeError::Status(status.as_u16()));
        }
        let body = resp.text()?;
        let found = parse_candidates(&body)?;
        debug!("Geocoded '{address}' -> {found:?}");
        Ok(found)
    }
}

fn parse_candidates(body: &str) -> std::result::Result<Option<Coordinates>, GeocodeError> {
    let parsed: CandidatesResponse = serde_json::from_str(body)?;
    if let Some(err) = parsed.error {
        return Err(GeocodeError::Api {
            code: err.code,
            message: err.message,
        });
    }
    Ok(parsed.candidates.first().map(|c| Coordinates {
        latitude: c.location.y,
        longitude: c.location.x,
    }))
}
