// src/transform/decoders.rs

//! Per-observation decoders. Each one turns a raw cell into a fixed-width
//! vector of typed values; positions line up with the declared features.
//!
//! A raw value of the wrong shape gives an all-null vector and a missing
//! number inside otherwise readable text gives a null cell. Only input that
//! has the expected shape but cannot be read (too few items, digits that
//! overflow or join into something unparsable) is reported as an error.

use regex::Regex;
use std::sync::OnceLock;

use crate::config::FieldSpec;
use crate::domain::{RawValue, Value};
use crate::transform::DecodeError;

pub const FLAT_TYPE_WIDTH: usize = 2;
pub const MAIN_INFO_WIDTH: usize = 5;
pub const FEE_INFO_WIDTH: usize = 5;

const STUDIO: &str = "студия";
const FEE_PRESENT: &str = "есть";

fn digit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("digit regex"))
}

fn rooms_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)-комн").expect("rooms regex"))
}

fn digit_runs(text: &str) -> Vec<&str> {
    digit_re().find_iter(text).map(|m| m.as_str()).collect()
}

fn parse_int(text: &str) -> Result<i64, DecodeError> {
    text.parse().map_err(|_| DecodeError::number(text))
}

/// All digit runs glued together: "15 000 ₽" -> 15000.
fn concat_int(text: &str) -> Result<Option<i64>, DecodeError> {
    let runs = digit_runs(text);
    if runs.is_empty() {
        return Ok(None);
    }
    parse_int(&runs.concat()).map(Some)
}

/// Digit runs joined with a dot: "2,5 м" -> 2.5.
fn joined_float(text: &str) -> Result<Option<f64>, DecodeError> {
    let runs = digit_runs(text);
    if runs.is_empty() {
        return Ok(None);
    }
    let joined = runs.join(".");
    joined
        .parse()
        .map(Some)
        .map_err(|_| DecodeError::number(joined))
}

fn ints(text: &str) -> Result<Vec<i64>, DecodeError> {
    digit_runs(text).into_iter().map(parse_int).collect()
}

fn nulls(width: usize) -> Vec<Value> {
    vec![Value::Null; width]
}

/// `room_count`, `is_studio`.
pub fn flat_type(raw: RawValue<'_>, _spec: &FieldSpec) -> Result<Vec<Value>, DecodeError> {
    let RawValue::Text(text) = raw else {
        return Ok(nulls(FLAT_TYPE_WIDTH));
    };

    let is_studio = text.contains(STUDIO);
    let matches: Vec<_> = rooms_re().captures_iter(text).collect();

    let room_count = match matches.as_slice() {
        [only] => Some(parse_int(&only[1])?),
        _ if is_studio => Some(1),
        _ => None,
    };

    Ok(vec![room_count.into(), Value::Bool(is_studio)])
}

/// `area`, `floor`, `total_floors`, `ceiling_height`, `construction_year`.
pub fn main_info(raw: RawValue<'_>, _spec: &FieldSpec) -> Result<Vec<Value>, DecodeError> {
    let RawValue::List(items) = raw else {
        return Ok(nulls(MAIN_INFO_WIDTH));
    };

    let mut area = None;
    let mut floor = None;
    let mut total_floors = None;
    let mut height = None;
    let mut year = None;

    for text in items {
        if text.contains("общая") {
            area = joined_float(text)?;
        } else if text.contains("этаж") {
            let values = ints(text)?;
            floor = values.first().copied();
            if values.len() == 2 {
                total_floors = Some(values[1]);
            }
        } else if text.contains("потолки") {
            height = joined_float(text)?;
        } else if text.contains("год") {
            year = ints(text)?.first().copied();
        }
    }

    Ok(vec![
        area.into(),
        floor.into(),
        total_floors.into(),
        height.into(),
        year.into(),
    ])
}

/// `fee_included`, `fee_amount`, `deposit`, `fee_details`, `commission`.
///
/// The block is positional: fee, deposit, what the fee covers, commission.
pub fn fee_info(raw: RawValue<'_>, _spec: &FieldSpec) -> Result<Vec<Value>, DecodeError> {
    let RawValue::List(items) = raw else {
        return Ok(nulls(FEE_INFO_WIDTH));
    };
    if items.len() < 4 {
        return Err(DecodeError::TooFewItems {
            expected: 4,
            found: items.len(),
        });
    }

    let fee = items[0].trim();
    let (fee_included, fee_amount) = if fee == FEE_PRESENT {
        (Some(true), None)
    } else {
        let amount = concat_int(fee)?;
        (amount.filter(|a| *a == 0).map(|_| false), amount)
    };

    Ok(vec![
        fee_included.into(),
        fee_amount.into(),
        concat_int(&items[1])?.into(),
        Value::Text(items[2].trim().to_string()),
        concat_int(&items[3])?.into(),
    ])
}

/// One output per configured feature. Each feature takes the value of the
/// first record token found in its map; a matched token is consumed so it
/// cannot feed a later feature. Unmatched features get their default.
pub fn extra_features(raw: RawValue<'_>, spec: &FieldSpec) -> Result<Vec<Value>, DecodeError> {
    let RawValue::List(items) = raw else {
        return Ok(nulls(spec.features.len()));
    };

    let mut tokens: Vec<&str> = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim();
        if !tokens.contains(&item) {
            tokens.push(item);
        }
    }

    let mut out = Vec::with_capacity(spec.features.len());
    for feature in &spec.features {
        let hit = tokens
            .iter()
            .position(|t| feature.values.contains_key(*t));
        let value = match hit {
            Some(pos) => {
                let token = tokens.remove(pos);
                feature.values[token].clone()
            }
            None => feature.default.clone().unwrap_or(Value::Null),
        };
        out.push(value);
    }
    Ok(out)
}
