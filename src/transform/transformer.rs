// src/transform/transformer.rs

use log::{error, info};

use crate::config::Config;
use crate::domain::{RawValue, Table, Value, OFFER_ID};
use crate::errors::{EtlError, Result};
use crate::geocode::AddressResolver;
use crate::transform::registry::{self, Decoder, FieldPlan, ObservationFn, TableDecoder};
use crate::transform::DecodeError;

/// Turns a raw listing table into typed columns.
pub trait Transform {
    fn transform(&self, raw: Table) -> Result<Table>;
}

pub struct Transformer<'a> {
    plans: Vec<FieldPlan>,
    resolver: AddressResolver<'a>,
}

impl<'a> Transformer<'a> {
    pub fn new(config: &Config, resolver: AddressResolver<'a>) -> Result<Self> {
        let plans = registry::resolve_fields(&config.transformation.fields)?;
        Ok(Self { plans, resolver })
    }

    fn apply(&self, table: &mut Table, plan: &FieldPlan) -> Result<()> {
        match plan.decoder {
            Decoder::PerObservation(decode) => decode_column(table, plan, decode)
                .map_err(|e| EtlError::decode(&plan.spec.name, e)),
            Decoder::WholeTable(TableDecoder::Address) => {
                self.resolver.resolve_column(table, &plan.spec)
            }
        }
    }
}

impl Transform for Transformer<'_> {
    fn transform(&self, mut table: Table) -> Result<Table> {
        info!("STARTING TRANSFORMING STAGE");

        let dropped = table.dedup_by(OFFER_ID);
        if dropped > 0 {
            info!("Dropped {dropped} duplicate offers");
        }

        for plan in &self.plans {
            if let Err(e) = self.apply(&mut table, plan) {
                error!(
                    "An exception occurred while transforming feature {}: {e}",
                    plan.spec.name
                );
                return Err(e);
            }
            info!("Feature {} has been transformed", plan.spec.name);
        }

        info!("ENDING TRANSFORMING STAGE");
        Ok(table)
    }
}

/// Decodes every cell of one raw column and swaps the column for the
/// declared features. Widths are checked once for the whole batch.
fn decode_column(
    table: &mut Table,
    plan: &FieldPlan,
    decode: ObservationFn,
) -> std::result::Result<(), DecodeError> {
    let name = &plan.spec.name;
    let width = plan.width();

    let raw = table
        .column(name)
        .ok_or_else(|| DecodeError::MissingColumn(name.clone()))?;
    let decoded = raw
        .into_iter()
        .map(|cell| decode(RawValue::from(cell), &plan.spec))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if let Some(bad) = decoded.iter().find(|row| row.len() != width) {
        return Err(DecodeError::Width {
            expected: width,
            got: bad.len(),
        });
    }

    let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(decoded.len()); width];
    for row in decoded {
        for (column, value) in columns.iter_mut().zip(row) {
            column.push(value);
        }
    }

    table.take_column(name);
    for (feature, values) in plan.spec.feature_names().zip(columns) {
        table.push_column(feature, values);
    }
    Ok(())
}
