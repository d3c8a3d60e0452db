// src/transform/registry.rs

//! Static table of decoders, looked up by the name used in the config.

use crate::config::FieldSpec;
use crate::domain::{RawValue, Value};
use crate::errors::{EtlError, Result};
use crate::transform::decoders;
use crate::transform::DecodeError;

pub type ObservationFn = fn(RawValue<'_>, &FieldSpec) -> std::result::Result<Vec<Value>, DecodeError>;

/// Decoders that need the whole table instead of a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableDecoder {
    /// Replaces an address column with `address_id`, `latitude`, `longitude`.
    Address,
}

#[derive(Debug, Clone, Copy)]
pub enum Decoder {
    PerObservation(ObservationFn),
    WholeTable(TableDecoder),
}

impl Decoder {
    pub fn is_per_observation(&self) -> bool {
        matches!(self, Decoder::PerObservation(_))
    }
}

struct Entry {
    name: &'static str,
    decoder: Decoder,
    /// Fixed output width; `None` when it follows the declared features.
    width: Option<usize>,
}

const ADDRESS_WIDTH: usize = 3;

const REGISTRY: &[Entry] = &[
    Entry {
        name: "flat_type",
        decoder: Decoder::PerObservation(decoders::flat_type),
        width: Some(decoders::FLAT_TYPE_WIDTH),
    },
    Entry {
        name: "main_info",
        decoder: Decoder::PerObservation(decoders::main_info),
        width: Some(decoders::MAIN_INFO_WIDTH),
    },
    Entry {
        name: "fee_info",
        decoder: Decoder::PerObservation(decoders::fee_info),
        width: Some(decoders::FEE_INFO_WIDTH),
    },
    Entry {
        name: "extra_features",
        decoder: Decoder::PerObservation(decoders::extra_features),
        width: None,
    },
    Entry {
        name: "address_info",
        decoder: Decoder::WholeTable(TableDecoder::Address),
        width: Some(ADDRESS_WIDTH),
    },
];

fn lookup(name: &str) -> Option<&'static Entry> {
    REGISTRY.iter().find(|e| e.name == name)
}

/// A configured field bound to its decoder.
#[derive(Debug, Clone)]
pub struct FieldPlan {
    pub spec: FieldSpec,
    pub decoder: Decoder,
}

impl FieldPlan {
    pub fn width(&self) -> usize {
        self.spec.features.len()
    }
}

/// Binds every configured field to a decoder, checking the name, the
/// application mode and the number of declared features.
pub fn resolve_fields(specs: &[FieldSpec]) -> Result<Vec<FieldPlan>> {
    specs.iter().map(resolve_field).collect()
}

fn resolve_field(spec: &FieldSpec) -> Result<FieldPlan> {
    let entry = lookup(&spec.decoder).ok_or_else(|| {
        EtlError::config(format!(
            "Unknown decoder '{}' for field '{}'",
            spec.decoder, spec.name
        ))
    })?;

    if entry.decoder.is_per_observation() != spec.per_observation {
        return Err(EtlError::config(format!(
            "Decoder '{}' for field '{}' must run {}",
            entry.name,
            spec.name,
            if entry.decoder.is_per_observation() {
                "per observation"
            } else {
                "on the whole table"
            }
        )));
    }

    let declared = spec.features.len();
    match entry.width {
        Some(width) if width != declared => {
            return Err(EtlError::config(format!(
                "Field '{}' declares {declared} features, decoder '{}' produces {width}",
                spec.name, entry.name
            )));
        }
        None if declared == 0 => {
            return Err(EtlError::config(format!(
                "Field '{}' declares no features",
                spec.name
            )));
        }
        _ => {}
    }

    Ok(FieldPlan {
        spec: spec.clone(),
        decoder: entry.decoder,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureSpec;

    fn field(decoder: &str, per_observation: bool, features: &[&str]) -> FieldSpec {
        FieldSpec {
            name: "raw".into(),
            decoder: decoder.into(),
            per_observation,
            features: features
                .iter()
                .map(|n| FeatureSpec {
                    name: n.to_string(),
                    default: None,
                    values: Default::default(),
                })
                .collect(),
        }
    }

    #[test]
    fn resolves_known_decoders() {
        let plans = resolve_fields(&[
            field("flat_type", true, &["room_count", "is_studio"]),
            field("address_info", false, &["address_id", "latitude", "longitude"]),
        ])
        .unwrap();
        assert!(plans[0].decoder.is_per_observation());
        assert!(matches!(
            plans[1].decoder,
            Decoder::WholeTable(TableDecoder::Address)
        ));
    }

    #[test]
    fn rejects_mode_mismatch() {
        let err = resolve_fields(&[field("address_info", true, &["a", "b", "c"])]).unwrap_err();
        assert!(err.to_string().contains("whole table"));
    }

    #[test]
    fn rejects_width_mismatch() {
        let err = resolve_fields(&[field("fee_info", true, &["fee_included"])]).unwrap_err();
        assert!(err.to_string().contains("produces 5"));
    }

    #[test]
    fn lookup_by_name() {
        assert!(lookup("main_info").is_some());
        assert!(lookup("transform_main_info").is_none());
    }
}
