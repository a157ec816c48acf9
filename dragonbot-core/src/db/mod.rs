// dragonbot-core/src/db/mod.rs

pub mod query;
pub mod values;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, Pool, Postgres, Row, TypeInfo};
use tracing::{debug, info};

use crate::Error;
pub use values::{Criteria, Criterion, Record, Selected, SqlValue};

/// Generic CRUD over named tables. Values are always bound, never interpolated.
///
/// `update` and `delete` refuse empty criteria with `Error::EmptyCriteria`. Calls are
/// independent statements; nothing spans more than one call.
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn select(&self, table: &str, criteria: &Criteria, fetch_one: bool) -> Result<Selected, Error>;

    /// Inserts one row and returns the value of `returning`.
    async fn insert(&self, table: &str, data: &Record, returning: &str) -> Result<SqlValue, Error>;

    /// Inserts every row in one round trip. Returns the number of rows written.
    async fn insert_many(&self, table: &str, rows: &[Record]) -> Result<u64, Error>;

    async fn update(&self, table: &str, data: &Record, criteria: &Criteria) -> Result<u64, Error>;

    async fn delete(&self, table: &str, criteria: &Criteria) -> Result<u64, Error>;

    async fn select_one(&self, table: &str, criteria: &Criteria) -> Result<Option<Record>, Error> {
        Ok(self.select(table, criteria, true).await?.into_one())
    }

    async fn select_all(&self, table: &str, criteria: &Criteria) -> Result<Vec<Record>, Error> {
        Ok(self.select(table, criteria, false).await?.into_many())
    }
}

#[derive(Clone)]
pub struct Database {
    pool: Pool<Postgres>,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        info!("Connected to Postgres.");
        Ok(Self { pool })
    }

    /// Run migrations in the `migrations/` folder.
    pub async fn migrate(&self) -> Result<(), Error> {
        info!("Applying migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations applied successfully.");
        Ok(())
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    pub fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn decode_row(row: &PgRow) -> Result<Record, Error> {
    let mut record = Record::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let value = match column.type_info().name() {
            "INT8" => row.try_get::<Option<i64>, _>(idx)?.map(SqlValue::Int),
            "INT4" => row.try_get::<Option<i32>, _>(idx)?.map(SqlValue::from),
            "INT2" => row.try_get::<Option<i16>, _>(idx)?.map(SqlValue::from),
            "BOOL" => row.try_get::<Option<bool>, _>(idx)?.map(SqlValue::Bool),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => row.try_get::<Option<String>, _>(idx)?.map(SqlValue::Text),
            other => {
                return Err(Error::Parse(format!(
                    "column {} has unsupported type {other}",
                    column.name()
                )));
            }
        };
        record.set(column.name(), value.unwrap_or(SqlValue::Null));
    }
    Ok(record)
}

#[async_trait]
impl TableStore for Database {
    async fn select(&self, table: &str, criteria: &Criteria, fetch_one: bool) -> Result<Selected, Error> {
        let mut qb = query::build_select(table, criteria, fetch_one)?;
        debug!(sql = qb.sql(), "select");
        if fetch_one {
            let row = qb.build().fetch_optional(&self.pool).await?;
            Ok(Selected::One(row.as_ref().map(decode_row).transpose()?))
        } else {
            let rows = qb.build().fetch_all(&self.pool).await?;
            let records = rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;
            Ok(Selected::Many(records))
        }
    }

    async fn insert(&self, table: &str, data: &Record, returning: &str) -> Result<SqlValue, Error> {
        let mut qb = query::build_insert(table, data, returning)?;
        debug!(sql = qb.sql(), "insert");
        let row = qb.build().fetch_one(&self.pool).await?;
        let record = decode_row(&row)?;
        Ok(record.get(returning).cloned().unwrap_or(SqlValue::Null))
    }

    async fn insert_many(&self, table: &str, rows: &[Record]) -> Result<u64, Error> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut qb = query::build_insert_many(table, rows)?;
        debug!(sql = qb.sql(), rows = rows.len(), "insert_many");
        let done = qb.build().execute(&self.pool).await?;
        Ok(done.rows_affected())
    }

    async fn update(&self, table: &str, data: &Record, criteria: &Criteria) -> Result<u64, Error> {
        let mut qb = query::build_update(table, data, criteria)?;
        debug!(sql = qb.sql(), "update");
        let done = qb.build().execute(&self.pool).await?;
        Ok(done.rows_affected())
    }

    async fn delete(&self, table: &str, criteria: &Criteria) -> Result<u64, Error> {
        let mut qb = query::build_delete(table, criteria)?;
        debug!(sql = qb.sql(), "delete");
        let done = qb.build().execute(&self.pool).await?;
        Ok(done.rows_affected())
    }
}
