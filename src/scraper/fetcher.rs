// fetcher.rs
use log::{debug, warn};
use rand::seq::SliceRandom;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::time::Duration;

use crate::config::ExtractionConfig;
use crate::errors::{EtlError, Result};
use crate::scraper::{FetchFailure, ScraperError};

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0 Safari/537.36";

/// One GET attempt, optionally through a proxy.
pub trait Transport {
    fn get(&self, url: &str, proxy: Option<&str>) -> std::result::Result<String, ScraperError>;
}

/// Blocking reqwest transport. reqwest binds proxies to a client, so one
/// client is built per proxy up front.
pub struct HttpTransport {
    direct: Client,
    proxied: HashMap<String, Client>,
}

impl HttpTransport {
    pub fn new(config: &ExtractionConfig, proxies: &[String]) -> Result<Self> {
        let headers = header_map(&config.headers)?;
        let timeout = Duration::from_secs(config.timeout_secs);

        let build = |proxy: Option<&str>| -> Result<Client> {
            let mut builder = Client::builder()
                .user_agent(USER_AGENT)
                .default_headers(headers.clone())
                .timeout(timeout);
            if let Some(p) = proxy {
                builder = builder.proxy(reqwest::Proxy::all(proxy_url(p))?);
            }
            Ok(builder.build()?)
        };

        let mut proxied = HashMap::with_capacity(proxies.len());
        for p in proxies {
            proxied.insert(p.clone(), build(Some(p))?);
        }

        Ok(Self {
            direct: build(None)?,
            proxied,
        })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, proxy: Option<&str>) -> std::result::Result<String, ScraperError> {
        let client = match proxy {
            Some(p) => self
                .proxied
                .get(p)
                .ok_or_else(|| ScraperError::Proxy(p.to_string()))?,
            None => &self.direct,
        };

        let resp = client
            .get(url)
            .send()
            .map_err(|e| ScraperError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ScraperError::Status(status.as_u16()));
        }

        resp.text()
            .map_err(|e| ScraperError::Network(e.to_string()))
    }
}

/// Retries a GET up to `max_tries` times, picking a fresh random proxy for
/// every attempt when a pool is configured.
pub struct Fetcher<T: Transport = HttpTransport> {
    transport: T,
    proxies: Vec<String>,
    max_tries: usize,
}

impl Fetcher<HttpTransport> {
    pub fn from_config(config: &ExtractionConfig) -> Result<Self> {
        let proxies = if config.use_proxy {
            let pool = load_proxies(&config.proxies_path)?;
            if pool.is_empty() {
                return Err(EtlError::config(format!(
                    "use_proxy is on but {} lists no proxies",
                    config.proxies_path
                )));
            }
            pool
        } else {
            Vec::new()
        };

        let transport = HttpTransport::new(config, &proxies)?;
        Ok(Self::new(transport, proxies, config.max_tries))
    }
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, proxies: Vec<String>, max_tries: usize) -> Self {
        Self {
            transport,
            proxies,
            max_tries,
        }
    }

    #[cfg(test)]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn fetch(&self, url: &str) -> std::result::Result<String, FetchFailure> {
        let mut last_error = None;

        for attempt in 1..=self.max_tries {
            let proxy = self.pick_proxy();
            match self.transport.get(url, proxy) {
                Ok(body) => return Ok(body),
                Err(e) => {
                    debug!(
                        "Attempt {attempt}/{} for {url} failed{}: {e}",
                        self.max_tries,
                        proxy.map(|p| format!(" via {p}")).unwrap_or_default()
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(FetchFailure {
            url: url.to_string(),
            attempts: self.max_tries,
            last_error,
        })
    }

    fn pick_proxy(&self) -> Option<&str> {
        self.proxies
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }
}

/// Reads `host:port` lines; blank lines are ignored.
pub fn load_proxies(path: &str) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .map_err(|e| EtlError::config(format!("Failed to read proxies from {path}: {e}")))?;
    let proxies: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();
    if proxies.is_empty() {
        warn!("Proxy list {path} is empty");
    }
    Ok(proxies)
}

fn proxy_url(proxy: &str) -> String {
    if proxy.contains("://") {
        proxy.to_string()
    } else {
        format!("http://{proxy}")
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let key = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| EtlError::config(format!("Invalid header name {name}: {e}")))?;
        let val = HeaderValue::from_str(value)
            .map_err(|e| EtlError::config(format!("Invalid value for header {name}: {e}")))?;
        map.insert(key, val);
    }
    Ok(map)
}
