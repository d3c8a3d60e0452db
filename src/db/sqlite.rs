// src/db/sqlite.rs

use log::info;
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Statement};

use crate::db::connection::Database;
use crate::db::store::{date_key, quote_ident, DateFilter, ExecOutcome, Store, WriteMode};
use crate::domain::{Table, Value, DATE_PARSED};
use crate::errors::{EtlError, Result};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Int(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            // Lists live in TEXT columns as JSON arrays.
            Value::List(items) => {
                let json = serde_json::to_string(items)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                ToSqlOutput::Owned(SqlValue::Text(json))
            }
        })
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            if text.starts_with('[') {
                if let Ok(items) = serde_json::from_str::<Vec<String>>(&text) {
                    return Value::List(items);
                }
            }
            Value::Text(text.into_owned())
        }
    }
}

fn collect_rows(stmt: &mut Statement<'_>, params: &[Value]) -> Result<Table> {
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let width = columns.len();
    let mut table = Table::new(columns);

    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(width);
        for idx in 0..width {
            cells.push(from_sql(row.get_ref(idx)?));
        }
        table.push_row(cells);
    }
    Ok(table)
}

fn exists(conn: &Connection, table: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Declared type from the first non-null cell of each column. A column
/// with no values gets no declared type so SQLite stores later values as
/// they come.
fn column_type(rows: &Table, idx: usize) -> &'static str {
    let first = rows.rows().iter().map(|r| &r[idx]).find(|v| !v.is_null());
    match first {
        Some(Value::Bool(_)) | Some(Value::Int(_)) => " INTEGER",
        Some(Value::Float(_)) => " REAL",
        Some(Value::Text(_)) | Some(Value::List(_)) => " TEXT",
        Some(Value::Null) | None => "",
    }
}

fn create_sql(table: &str, rows: &Table) -> String {
    let columns: Vec<String> = rows
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, name)| format!("{}{}", quote_ident(name), column_type(rows, idx)))
        .collect();
    format!("CREATE TABLE {} ({})", quote_ident(table), columns.join(", "))
}

fn insert_sql(table: &str, columns: &[String]) -> String {
    let names: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let slots: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        names.join(", "),
        slots.join(", ")
    )
}

impl Store for Database {
    fn table_exists(&self, table: &str) -> Result<bool> {
        self.with_conn(|conn| exists(conn, table))
    }

    fn read(&self, table: &str, filter: DateFilter) -> Result<Table> {
        if !self.table_exists(table)? {
            return Ok(Table::default());
        }

        let t = quote_ident(table);
        let d = quote_ident(DATE_PARSED);
        let (sql, params) = match filter {
            DateFilter::All => (format!("SELECT * FROM {t}"), vec![]),
            DateFilter::On(date) => (
                format!("SELECT * FROM {t} WHERE {d} = ?1"),
                vec![Value::Text(date_key(date))],
            ),
            DateFilter::Latest => (
                format!("SELECT * FROM {t} WHERE {d} = (SELECT MAX({d}) FROM {t})"),
                vec![],
            ),
        };

        let result = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            collect_rows(&mut stmt, &params)
        })?;
        info!(
            "Table {table} has been read from the {} database ({} rows)",
            self.label(),
            result.len()
        );
        Ok(result)
    }

    fn write(&self, table: &str, rows: &Table, mode: WriteMode) -> Result<usize> {
        if rows.columns().is_empty() {
            return Err(EtlError::storage(format!(
                "Refusing to write table {table} without columns"
            )));
        }

        let written = self.with_conn(|conn| -> Result<usize> {
            let tx = conn.transaction()?;
            let present = exists(&tx, table)?;

            match (mode, present) {
                (WriteMode::Fail, true) => {
                    return Err(EtlError::storage(format!(
                        "Table {table} already exists in the {} database",
                        self.label()
                    )));
                }
                (WriteMode::Replace, true) => {
                    tx.execute(&format!("DROP TABLE {}", quote_ident(table)), [])?;
                    tx.execute(&create_sql(table, rows), [])?;
                }
                (_, false) => {
                    tx.execute(&create_sql(table, rows), [])?;
                }
                (WriteMode::Append, true) => {}
            }

            {
                let mut stmt = tx.prepare(&insert_sql(table, rows.columns()))?;
                for row in rows.rows() {
                    stmt.execute(params_from_iter(row.iter()))?;
                }
            }
            tx.commit()?;
            Ok(rows.len())
        })?;

        info!(
            "Table {table} has been {} the {} database ({written} rows)",
            if mode == WriteMode::Append {
                "appended to"
            } else {
                "saved to"
            },
            self.label()
        );
        Ok(written)
    }

    fn execute(&self, statement: &str, params: &[Value]) -> Result<ExecOutcome> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(statement)?;
            if stmt.column_count() == 0 {
                let affected = stmt.execute(params_from_iter(params.iter()))?;
                Ok(ExecOutcome::Affected(affected))
            } else {
                Ok(ExecOutcome::Rows(collect_rows(&mut stmt, params)?))
            }
        })
    }
}
