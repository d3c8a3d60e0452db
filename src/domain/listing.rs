// src/domain/listing.rs

use crate::domain::table::Value;

pub const OFFER_ID: &str = "offer_id";
pub const DATE_PARSED: &str = "date_parsed";

/// One scraped advertisement before decoding. `values` lines up with the
/// configured extraction fields.
#[derive(Debug, Clone)]
pub struct RawListing {
    pub offer_id: i64,
    pub values: Vec<Value>,
}

impl RawListing {
    /// Row layout used by the source table: fields, then `offer_id`.
    pub fn into_row(self) -> Vec<Value> {
        let mut row = self.values;
        row.push(Value::Int(self.offer_id));
        row
    }
}

/// Borrowed view of a raw cell, as handed to decoders.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawValue<'a> {
    Text(&'a str),
    List(&'a [String]),
    Missing,
}

impl<'a> From<&'a Value> for RawValue<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Text(s) => RawValue::Text(s),
            Value::List(items) => RawValue::List(items),
            _ => RawValue::Missing,
        }
    }
}
