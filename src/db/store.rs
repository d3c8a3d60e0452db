// src/db/store.rs

use chrono::NaiveDate;

use crate::domain::{Table, Value, DATE_PARSED};
use crate::errors::Result;

/// Which rows of a dated table to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFilter {
    All,
    On(NaiveDate),
    /// Rows carrying the table's most recent `date_parsed`.
    Latest,
}

/// What to do when the target table already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Fail,
    Replace,
    Append,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecOutcome {
    Affected(usize),
    Rows(Table),
}

/// A logical relational store. Every `write` and every `execute` is
/// atomic on its own; nothing spans several calls.
pub trait Store {
    fn table_exists(&self, table: &str) -> Result<bool>;

    /// Reading a table that does not exist yields an empty table.
    fn read(&self, table: &str, filter: DateFilter) -> Result<Table>;

    /// Returns the number of rows written.
    fn write(&self, table: &str, rows: &Table, mode: WriteMode) -> Result<usize>;

    fn execute(&self, statement: &str, params: &[Value]) -> Result<ExecOutcome>;

    /// Deletes the rows stamped with `date`. Other dates are never touched.
    fn delete_for_date(&self, table: &str, date: NaiveDate) -> Result<usize> {
        if !self.table_exists(table)? {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            quote_ident(table),
            quote_ident(DATE_PARSED)
        );
        match self.execute(&sql, &[Value::Text(date_key(date))])? {
            ExecOutcome::Affected(n) => Ok(n),
            ExecOutcome::Rows(_) => Ok(0),
        }
    }
}

/// `date_parsed` representation: ISO `YYYY-MM-DD`.
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
