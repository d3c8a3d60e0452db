use thiserror::Error;

/// Why a single request attempt failed.
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Unknown proxy: {0}")]
    Proxy(String),
}

/// Every attempt for `url` failed. Callers skip the URL and go on.
#[derive(Debug, Error)]
#[error("URL = {url} : no successful response after {attempts} attempts{}", last_cause(.last_error))]
pub struct FetchFailure {
    pub url: String,
    pub attempts: usize,
    pub last_error: Option<ScraperError>,
}

fn last_cause(error: &Option<ScraperError>) -> String {
    error
        .as_ref()
        .map(|e| format!(" (last: {e})"))
        .unwrap_or_default()
}
