// src/tests/geocode_tests.rs
use tempfile::TempDir;

use crate::db::store::ExecOutcome;
use crate::db::{init_db, Database, DateFilter, Store, WriteMode};
use crate::domain::{Table, Value};
use crate::errors::Result;
use crate::geocode::cache::ResolvedAddress;
use crate::geocode::AddressResolver;
use crate::tests::utils::*;

const SCHEMA: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql");

fn some(addresses: &[&str]) -> Vec<Option<String>> {
    addresses.iter().map(|a| Some(a.to_string())).collect()
}

fn ids(resolved: &[ResolvedAddress]) -> Vec<Option<i64>> {
    resolved.iter().map(|r| r.address_id).collect()
}

#[test]
fn cache_grows_monotonically_across_runs() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("source.sqlite");
    let path = path.to_string_lossy().into_owned();
    let config = sample_config();

    let geocoder = FakeGeocoder::default()
        .with("Невский проспект, 1", 59.93, 30.31)
        .with("Садовая улица, 10", 59.92, 30.32)
        .with("Литейный проспект, 5", 59.94, 30.35);

    // First run: a repeated address is geocoded once.
    {
        let source = Database::new("source", path.as_str());
        let resolver = AddressResolver::new(&source, &geocoder, &config);
        let resolved = resolver
            .resolve(&some(&["Невский проспект, 1", "Садовая улица, 10", "Невский проспект, 1"]))
            .unwrap();
        assert_eq!(ids(&resolved), vec![Some(1), Some(2), Some(1)]);
        assert_eq!(resolved[0].latitude, Some(59.93));
    }
    assert_eq!(geocoder.call_count(), 2);

    // Second run on a fresh handle: only the new address costs a call.
    let source = Database::new("source", path.as_str());
    let resolver = AddressResolver::new(&source, &geocoder, &config);
    let resolved = resolver
        .resolve(&some(&["Садовая улица, 10", "Литейный проспект, 5"]))
        .unwrap();
    assert_eq!(ids(&resolved), vec![Some(2), Some(3)]);
    assert_eq!(geocoder.call_count(), 3);
    assert_eq!(
        geocoder.calls.borrow().last().map(String::as_str),
        Some("Литейный проспект, 5")
    );

    let cache = source.read("addresses", DateFilter::All).unwrap();
    let cached_ids: Vec<i64> = cache
        .column("address_id")
        .unwrap()
        .into_iter()
        .filter_map(Value::as_i64)
        .collect();
    assert_eq!(cached_ids, vec![1, 2, 3]);
}

#[test]
fn rewrite_rules_rescue_unmatched_addresses() {
    let source = memory_db("source");
    let config = sample_config();
    let geocoder = FakeGeocoder::default().with("Мурино, Охтинская аллея, 4", 60.05, 30.44);
    let resolver = AddressResolver::new(&source, &geocoder, &config);

    let resolved = resolver
        .resolve(&some(&["Ленинградская область, Мурино, Охтинская аллея, 4"]))
        .unwrap();

    assert_eq!(resolved[0].address_id, Some(1));
    assert_eq!(resolved[0].longitude, Some(30.44));
    assert_eq!(
        *geocoder.calls.borrow(),
        vec![
            "Ленинградская область, Мурино, Охтинская аллея, 4".to_string(),
            "Мурино, Охтинская аллея, 4".to_string(),
        ]
    );

    // The cache keeps the address as scraped, not the rewritten form.
    let cache = source.read("addresses", DateFilter::All).unwrap();
    assert_eq!(
        cache.get(0, "address_info").and_then(Value::as_str),
        Some("Ленинградская область, Мурино, Охтинская аллея, 4")
    );
}

#[test]
fn unresolved_addresses_are_cached_with_null_coordinates() {
    let source = memory_db("source");
    let config = sample_config();
    let geocoder = FakeGeocoder::default().failing("Нигде, 0");
    let resolver = AddressResolver::new(&source, &geocoder, &config);

    let first = resolver.resolve(&some(&["Нигде, 0"])).unwrap();
    assert_eq!(
        first[0],
        ResolvedAddress {
            address_id: Some(1),
            latitude: None,
            longitude: None,
        }
    );

    let again = resolver.resolve(&some(&["Нигде, 0"])).unwrap();
    assert_eq!(again, first);
    assert_eq!(geocoder.call_count(), 1);

    let cache = source.read("addresses", DateFilter::All).unwrap();
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get(0, "latitude"), Some(&Value::Null));
}

#[test]
fn missing_addresses_pass_through_as_null() {
    let source = memory_db("source");
    let config = sample_config();
    let geocoder = FakeGeocoder::default().with("Невский проспект, 1", 59.93, 30.31);
    let resolver = AddressResolver::new(&source, &geocoder, &config);

    let resolved = resolver
        .resolve(&[None, Some("Невский проспект, 1".to_string()), None])
        .unwrap();

    assert_eq!(ids(&resolved), vec![None, Some(1), None]);
    assert_eq!(resolved[0], ResolvedAddress::default());
    assert_eq!(geocoder.call_count(), 1);
    assert_eq!(source.read("addresses", DateFilter::All).unwrap().len(), 1);
}

/// Another writer creates the cache table between the resolver's read and
/// its write.
struct RacingStore {
    inner: Database,
}

impl Store for RacingStore {
    fn table_exists(&self, table: &str) -> Result<bool> {
        self.inner.table_exists(table)
    }

    fn read(&self, table: &str, filter: DateFilter) -> Result<Table> {
        let seen = self.inner.read(table, filter)?;
        let rival = Table::with_rows(
            ["address_info", "address_id", "latitude", "longitude"],
            vec![vec![
                Value::Text("Садовая улица, 10".into()),
                Value::Int(1),
                Value::Float(59.92),
                Value::Float(30.32),
            ]],
        );
        self.inner.write(table, &rival, WriteMode::Fail)?;
        Ok(seen)
    }

    fn write(&self, table: &str, rows: &Table, mode: WriteMode) -> Result<usize> {
        self.inner.write(table, rows, mode)
    }

    fn execute(&self, statement: &str, params: &[Value]) -> Result<ExecOutcome> {
        self.inner.execute(statement, params)
    }
}

#[test]
fn first_cache_write_refuses_a_table_created_meanwhile() {
    let store = RacingStore {
        inner: memory_db("source"),
    };
    let config = sample_config();
    let geocoder = FakeGeocoder::default().with("Невский проспект, 1", 59.93, 30.31);
    let resolver = AddressResolver::new(&store, &geocoder, &config);

    assert!(resolver.resolve(&some(&["Невский проспект, 1"])).is_err());

    // The rival's entry survives; nothing was appended under a duplicate id.
    let cache = store.inner.read("addresses", DateFilter::All).unwrap();
    assert_eq!(cache.len(), 1);
    assert_eq!(
        cache.get(0, "address_info").and_then(Value::as_str),
        Some("Садовая улица, 10")
    );
}

#[test]
fn first_resolve_creates_the_cache_table() {
    let source = memory_db("source");
    let config = sample_config();
    let geocoder = FakeGeocoder::default().with("Невский проспект, 1", 59.93, 30.31);
    let resolver = AddressResolver::new(&source, &geocoder, &config);

    assert!(!source.table_exists("addresses").unwrap());
    resolver.resolve(&some(&["Невский проспект, 1"])).unwrap();
    assert!(source.table_exists("addresses").unwrap());
    assert_eq!(source.read("addresses", DateFilter::All).unwrap().len(), 1);
}

#[test]
fn schema_declared_cache_is_appended_to() {
    let source = memory_db("source");
    init_db(&source, SCHEMA).unwrap();
    let config = sample_config();
    let geocoder = FakeGeocoder::default().with("Невский проспект, 1", 59.93, 30.31);
    let resolver = AddressResolver::new(&source, &geocoder, &config);

    // An unlocatable address first: the REAL columns still take the later float.
    resolver
        .resolve(&some(&["Нигде, 0", "Невский проспект, 1"]))
        .unwrap();

    let types = match source
        .execute(
            "SELECT typeof(latitude) FROM addresses ORDER BY address_id",
            &[],
        )
        .unwrap()
    {
        ExecOutcome::Rows(types) => types,
        other => panic!("expected rows, got {other:?}"),
    };
    assert_eq!(
        types.column("typeof(latitude)").unwrap(),
        vec![&Value::Text("null".into()), &Value::Text("real".into())]
    );
}
