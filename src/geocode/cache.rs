// src/geocode/cache.rs

//! Address cache kept in the source database. Entries are only ever
//! appended: an address gets its id once and keeps it.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use crate::config::{AddressRewrite, Config, FieldSpec};
use crate::db::{DateFilter, Store, WriteMode};
use crate::domain::{Table, Value};
use crate::errors::{EtlError, Result};
use crate::geocode::{Coordinates, Geocoder};

pub const ADDRESS_INFO: &str = "address_info";
pub const ADDRESS_ID: &str = "address_id";
pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";

/// Cache lookup result for one input row. All fields are null for a row
/// without an address.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ResolvedAddress {
    pub address_id: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl ResolvedAddress {
    fn new(address_id: i64, coords: Option<Coordinates>) -> Self {
        Self {
            address_id: Some(address_id),
            latitude: coords.map(|c| c.latitude),
            longitude: coords.map(|c| c.longitude),
        }
    }
}

pub struct AddressResolver<'a> {
    store: &'a dyn Store,
    geocoder: &'a dyn Geocoder,
    table: String,
    rewrites: Vec<AddressRewrite>,
    delay: Duration,
}

impl<'a> AddressResolver<'a> {
    pub fn new(store: &'a dyn Store, geocoder: &'a dyn Geocoder, config: &Config) -> Self {
        Self {
            store,
            geocoder,
            table: config.tables.addresses.clone(),
            rewrites: config.geocoder.rewrites.clone(),
            delay: Duration::from_millis(config.geocoder.delay_ms),
        }
    }

    /// Resolves addresses in input order. Unseen addresses are geocoded
    /// once each and appended to the cache before this returns; addresses
    /// that cannot be located are cached with null coordinates.
    pub fn resolve(&self, addresses: &[Option<String>]) -> Result<Vec<ResolvedAddress>> {
        let cache_exists = self.store.table_exists(&self.table)?;
        let (mut known, max_id) = self.load_cache()?;

        let mut unknown: Vec<&str> = Vec::new();
        for address in addresses.iter().flatten() {
            if !known.contains_key(address.as_str()) && !unknown.contains(&address.as_str()) {
                unknown.push(address);
            }
        }

        if !unknown.is_empty() {
            info!("Geocoding {} new addresses", unknown.len());

            let mut fresh = Table::new([ADDRESS_INFO, ADDRESS_ID, LATITUDE, LONGITUDE]);
            for (address_id, address) in (max_id + 1..).zip(&unknown) {
                let coords = self.locate(address);
                let entry = ResolvedAddress::new(address_id, coords);
                fresh.push_row(vec![
                    Value::Text(address.to_string()),
                    Value::Int(address_id),
                    entry.latitude.into(),
                    entry.longitude.into(),
                ]);
                known.insert(address.to_string(), entry);
            }

            // A cache that appeared since the read must not be clobbered.
            let mode = if cache_exists {
                WriteMode::Append
            } else {
                WriteMode::Fail
            };
            self.store.write(&self.table, &fresh, mode)?;
            info!(
                "Table {} has been appended with {} addresses",
                self.table,
                fresh.len()
            );
        }

        Ok(addresses
            .iter()
            .map(|address| match address {
                Some(a) => known.get(a.as_str()).copied().unwrap_or_default(),
                None => ResolvedAddress::default(),
            })
            .collect())
    }

    /// Replaces the address column of `table` with id and coordinates
    /// columns named after the field's declared features.
    pub fn resolve_column(&self, table: &mut Table, spec: &FieldSpec) -> Result<()> {
        let names: Vec<&str> = spec.feature_names().collect();
        let [id_col, lat_col, lon_col] = names.as_slice() else {
            return Err(EtlError::config(format!(
                "Field '{}' must declare id, latitude and longitude features",
                spec.name
            )));
        };

        let raw = table.take_column(&spec.name).ok_or_else(|| {
            EtlError::decode(
                &spec.name,
                crate::transform::DecodeError::MissingColumn(spec.name.clone()),
            )
        })?;
        let addresses: Vec<Option<String>> = raw.into_iter().map(address_text).collect();

        let resolved = self.resolve(&addresses)?;
        table.push_column(*id_col, resolved.iter().map(|r| r.address_id.into()).collect());
        table.push_column(*lat_col, resolved.iter().map(|r| r.latitude.into()).collect());
        table.push_column(*lon_col, resolved.iter().map(|r| r.longitude.into()).collect());
        Ok(())
    }

    fn load_cache(&self) -> Result<(HashMap<String, ResolvedAddress>, i64)> {
        let cached = self.store.read(&self.table, DateFilter::All)?;
        let mut known = HashMap::with_capacity(cached.len());
        let mut max_id = 0;

        for row in 0..cached.len() {
            let Some(address) = cached.get(row, ADDRESS_INFO).and_then(Value::as_str) else {
                continue;
            };
            let Some(address_id) = cached.get(row, ADDRESS_ID).and_then(Value::as_i64) else {
                continue;
            };
            max_id = max_id.max(address_id);
            known.insert(
                address.to_string(),
                ResolvedAddress {
                    address_id: Some(address_id),
                    latitude: cached.get(row, LATITUDE).and_then(Value::as_f64),
                    longitude: cached.get(row, LONGITUDE).and_then(Value::as_f64),
                },
            );
        }

        debug!("Loaded {} cached addresses (max id {max_id})", known.len());
        Ok((known, max_id))
    }

    /// Tries the address as is, then every rewrite whose pattern occurs in
    /// it, stopping at the first hit.
    fn locate(&self, address: &str) -> Option<Coordinates> {
        let rewritten = self
            .rewrites
            .iter()
            .filter(|r| address.contains(&r.pattern))
            .map(|r| address.replacen(&r.pattern, &r.replacement, 1));

        for (attempt, query) in std::iter::once(address.to_string())
            .chain(rewritten)
            .enumerate()
        {
            let result = self.geocoder.geocode(query.trim());
            thread::sleep(self.delay);
            match result {
                Ok(Some(coords)) => return Some(coords),
                Ok(None) => debug!("No match for '{query}'"),
                Err(e) if attempt == 0 => {
                    warn!("Unable to initially locate address '{address}': {e}")
                }
                Err(e) => warn!("Unable to locate rewritten address '{query}': {e}"),
            }
        }

        warn!("Unable to locate address '{address}' after adjustments");
        None
    }
}

fn address_text(value: Value) -> Option<String> {
    match value {
        Value::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::List(items) if !items.is_empty() => Some(items.join(", ")),
        _ => None,
    }
}
