// proxies.rs
use ::scraper::{Html, Selector};
use log::info;
use regex::Regex;
use std::fs;
use std::sync::OnceLock;

use crate::config::ExtractionConfig;
use crate::errors::{EtlError, Result};
use crate::scraper::fetcher::{HttpTransport, Transport};
use crate::scraper::selectors::inner_text;

/// Cells per row of the free-proxy-list table.
const ROW_WIDTH: usize = 8;

fn ipv4() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{1,3}(\.\d{1,3}){3}$").expect("static regex"))
}

/// `ip:port` for every table row that starts with an IPv4 address. Rows
/// are read in order and stop at the first that does not.
pub fn parse_proxy_table(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(td) = Selector::parse("td") else {
        return Vec::new();
    };
    let cells: Vec<String> = document.select(&td).map(inner_text).collect();

    cells
        .chunks(ROW_WIDTH)
        .take_while(|row| row.len() >= 2 && ipv4().is_match(&row[0]))
        .map(|row| format!("{}:{}", row[0], row[1]))
        .collect()
}

/// Downloads the public proxy list and overwrites `proxies_path` with it.
pub fn refresh_proxies(config: &ExtractionConfig) -> Result<usize> {
    let transport = HttpTransport::new(config, &[])?;
    let html = transport
        .get(&config.proxy_list_url, None)
        .map_err(|e| EtlError::config(format!("Cannot fetch {}: {e}", config.proxy_list_url)))?;

    let proxies = parse_proxy_table(&html);
    let mut body = proxies.join("\n");
    body.push('\n');
    fs::write(&config.proxies_path, body)?;

    info!(
        "{} proxies written to {}",
        proxies.len(),
        config.proxies_path
    );
    Ok(proxies.len())
}
