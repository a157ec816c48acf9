// File: dragonbot-core/src/test_utils/memory_store.rs
//
// In-process `TableStore` with the same filtering, refusal and serial-id rules as the
// Postgres one, plus write counting and injectable write failures for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::db::query::quote_ident;
use crate::db::{Criteria, Record, Selected, SqlValue, TableStore};
use crate::Error;

#[derive(Default)]
struct Table {
    rows: Vec<Record>,
    next_serial: i64,
}

/// Per-table key rules, mirroring the migrations.
struct Schema {
    serial: Option<&'static str>,
    unique: Vec<Vec<&'static str>>,
}

fn schema_for(table: &str) -> Schema {
    match table {
        "tickets" => Schema {
            serial: Some("id"),
            unique: vec![vec!["id"], vec!["channel_id"]],
        },
        "ticket_participants" => Schema {
            serial: None,
            unique: vec![vec!["ticket_id", "participant_id"]],
        },
        "ticket_panels" => Schema {
            serial: None,
            unique: vec![vec!["guild_id"]],
        },
        _ => Schema {
            serial: None,
            unique: Vec::new(),
        },
    }
}

fn duplicate(table: &str, columns: &[&str]) -> Error {
    Error::Database(sqlx::Error::Protocol(format!(
        "duplicate key value violates unique constraint on {table} ({})",
        columns.join(", ")
    )))
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Table>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of insert/update/delete calls that reached the store.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reset_writes(&self) {
        self.writes.store(0, Ordering::SeqCst);
    }

    /// While set, every write fails with a database error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn rows(&self, table: &str) -> Vec<Record> {
        self.tables
            .lock()
            .await
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    fn begin_write(&self) -> Result<(), Error> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn validate(table: &str, criteria: &Criteria) -> Result<(), Error> {
        quote_ident(table)?;
        for (column, _) in criteria.iter() {
            quote_ident(column)?;
        }
        Ok(())
    }

    /// Assigns the serial column and checks unique keys against `existing`.
    fn prepare_row(table: &str, schema: &Schema, state: &mut Table, existing: &[Record], row: &Record) -> Result<Record, Error> {
        for column in row.columns() {
            quote_ident(column)?;
        }
        let mut row = row.clone();
        if let Some(serial) = schema.serial {
            match row.get(serial).and_then(SqlValue::as_i64) {
                Some(explicit) => state.next_serial = state.next_serial.max(explicit),
                None => {
                    state.next_serial += 1;
                    row.set(serial, state.next_serial);
                }
            }
        }
        for key in &schema.unique {
            let clash = existing.iter().any(|other| {
                key.iter()
                    .all(|c| row.get(c).is_some_and(|v| !v.is_null() && other.get(c) == Some(v)))
            });
            if clash {
                return Err(duplicate(table, key));
            }
        }
        Ok(row)
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn select(&self, table: &str, criteria: &Criteria, fetch_one: bool) -> Result<Selected, Error> {
        Self::validate(table, criteria)?;
        let tables = self.tables.lock().await;
        let matching: Vec<Record> = tables
            .get(table)
            .map(|t| t.rows.iter().filter(|r| criteria.matches(r)).cloned().collect())
            .unwrap_or_default();
        if fetch_one {
            Ok(Selected::One(matching.into_iter().next()))
        } else {
            Ok(Selected::Many(matching))
        }
    }

    async fn insert(&self, table: &str, data: &Record, returning: &str) -> Result<SqlValue, Error> {
        quote_ident(table)?;
        quote_ident(returning)?;
        if data.is_empty() {
            return Err(Error::Parse(format!("insert into {table} without columns")));
        }
        self.begin_write()?;

        let schema = schema_for(table);
        let mut tables = self.tables.lock().await;
        let state = tables.entry(table.to_string()).or_default();
        let existing = std::mem::take(&mut state.rows);
        let prepared = Self::prepare_row(table, &schema, state, &existing, data);
        state.rows = existing;
        let row = prepared?;
        let value = row.get(returning).cloned().unwrap_or(SqlValue::Null);
        state.rows.push(row);
        Ok(value)
    }

    async fn insert_many(&self, table: &str, rows: &[Record]) -> Result<u64, Error> {
        if rows.is_empty() {
            return Ok(0);
        }
        quote_ident(table)?;
        let columns: Vec<&str> = rows[0].columns().collect();
        if rows.iter().any(|r| !r.columns().eq(columns.iter().copied())) {
            return Err(Error::Parse(format!("bulk insert into {table}: rows have different columns")));
        }
        self.begin_write()?;

        let schema = schema_for(table);
        let mut tables = self.tables.lock().await;
        let state = tables.entry(table.to_string()).or_default();
        let mut staged = state.rows.clone();
        let serial_before = state.next_serial;
        for row in rows {
            match Self::prepare_row(table, &schema, state, &staged, row) {
                Ok(prepared) => staged.push(prepared),
                Err(e) => {
                    // one statement: nothing is written when any row fails
                    state.next_serial = serial_before;
                    return Err(e);
                }
            }
        }
        state.rows = staged;
        Ok(rows.len() as u64)
    }

    async fn update(&self, table: &str, data: &Record, criteria: &Criteria) -> Result<u64, Error> {
        if criteria.is_empty() {
            return Err(Error::EmptyCriteria {
                operation: "update",
                table: table.to_string(),
            });
        }
        Self::validate(table, criteria)?;
        for column in data.columns() {
            quote_ident(column)?;
        }
        self.begin_write()?;

        let mut tables = self.tables.lock().await;
        let Some(state) = tables.get_mut(table) else {
            return Ok(0);
        };
        let mut affected = 0;
        for row in state.rows.iter_mut().filter(|r| criteria.matches(r)) {
            row.merge(data);
            affected += 1;
        }
        Ok(affected)
    }

    async fn delete(&self, table: &str, criteria: &Criteria) -> Result<u64, Error> {
        if criteria.is_empty() {
            return Err(Error::EmptyCriteria {
                operation: "delete",
                table: table.to_string(),
            });
        }
        Self::validate(table, criteria)?;
        self.begin_write()?;

        let mut tables = self.tables.lock().await;
        let Some(state) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = state.rows.len();
        state.rows.retain(|r| !criteria.matches(r));
        Ok((before - state.rows.len()) as u64)
    }
}
