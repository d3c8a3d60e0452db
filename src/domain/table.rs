// src/domain/table.rs

use serde::Deserialize;
use std::collections::HashSet;

/// A single typed cell. Raw listings only ever hold `Null`, `Text` or
/// `List`; decoders produce the scalar variants.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[serde(skip_deserializing)]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl From<Option<i64>> for Value {
    fn from(v: Option<i64>) -> Self {
        v.map(Value::Int).unwrap_or(Value::Null)
    }
}

impl From<Option<f64>> for Value {
    fn from(v: Option<f64>) -> Self {
        v.map(Value::Float).unwrap_or(Value::Null)
    }
}

impl From<Option<bool>> for Value {
    fn from(v: Option<bool>) -> Self {
        v.map(Value::Bool).unwrap_or(Value::Null)
    }
}

impl From<Option<String>> for Value {
    fn from(v: Option<String>) -> Self {
        v.map(Value::Text).unwrap_or(Value::Null)
    }
}

/// Column-named rows of cells. Every row has exactly `columns.len()` cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn with_rows<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: Vec<Vec<Value>>,
    ) -> Self {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len(), "row width mismatch");
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Removes a column and hands back its cells in row order.
    pub fn take_column(&mut self, name: &str) -> Option<Vec<Value>> {
        let idx = self.column_index(name)?;
        self.columns.remove(idx);
        Some(self.rows.iter_mut().map(|r| r.remove(idx)).collect())
    }

    /// Appends a column. `values` must have one cell per row.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Value>) {
        debug_assert_eq!(values.len(), self.rows.len(), "column height mismatch");
        self.columns.push(name.into());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
    }

    /// Sets every cell of `name` to `value`, adding the column if needed.
    pub fn fill_column(&mut self, name: &str, value: Value) {
        match self.column_index(name) {
            Some(idx) => {
                for row in &mut self.rows {
                    row[idx] = value.clone();
                }
            }
            None => {
                let values = vec![value; self.rows.len()];
                self.push_column(name, values);
            }
        }
    }

    /// Drops rows whose `column` value was already seen; first one wins.
    /// Returns how many rows were removed.
    pub fn dedup_by(&mut self, column: &str) -> usize {
        let Some(idx) = self.column_index(column) else {
            return 0;
        };
        let before = self.rows.len();
        let mut seen = HashSet::new();
        self.rows.retain(|row| seen.insert(format!("{:?}", row[idx])));
        before - self.rows.len()
    }

    /// Splits the rows into one table per distinct `column` value, in order
    /// of first appearance. A missing column gives a single group keyed by
    /// `Null`.
    pub fn partition_by(self, column: &str) -> Vec<(Value, Table)> {
        let Some(idx) = self.column_index(column) else {
            return vec![(Value::Null, self)];
        };

        let mut keys: Vec<Value> = Vec::new();
        let mut groups: Vec<Vec<Vec<Value>>> = Vec::new();
        for row in self.rows {
            match keys.iter().position(|k| *k == row[idx]) {
                Some(pos) => groups[pos].push(row),
                None => {
                    keys.push(row[idx].clone());
                    groups.push(vec![row]);
                }
            }
        }

        keys.into_iter()
            .zip(groups)
            .map(|(key, rows)| (key, Table::with_rows(self.columns.clone(), rows)))
            .collect()
    }
}
