// dragonbot-core/src/db/query.rs
//
// Renders `TableStore` calls into parameterized Postgres statements. Every value goes
// through `push_bind`; identifiers are validated and double-quoted.

use dragonbot_common::error::Error;
use sqlx::{Postgres, QueryBuilder};

use crate::db::values::{Criteria, Criterion, Record, SqlValue};

pub fn quote_ident(ident: &str) -> Result<String, Error> {
    let mut chars = ident.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if !valid {
        return Err(Error::InvalidIdentifier(ident.to_string()));
    }
    Ok(format!("\"{ident}\""))
}

fn push_value(qb: &mut QueryBuilder<'static, Postgres>, value: &SqlValue) {
    match value {
        SqlValue::Null => qb.push_bind(None::<i64>),
        SqlValue::Int(v) => qb.push_bind(*v),
        SqlValue::Text(v) => qb.push_bind(v.clone()),
        SqlValue::Bool(v) => qb.push_bind(*v),
    };
}

fn push_where(qb: &mut QueryBuilder<'static, Postgres>, criteria: &Criteria) -> Result<(), Error> {
    if criteria.is_empty() {
        return Ok(());
    }
    qb.push(" WHERE ");
    for (i, (column, criterion)) in criteria.iter().enumerate() {
        if i > 0 {
            qb.push(" AND ");
        }
        let column = quote_ident(column)?;
        match criterion {
            Criterion::Eq(SqlValue::Null) => {
                qb.push(column).push(" IS NULL");
            }
            Criterion::Eq(value) => {
                qb.push(column).push(" = ");
                push_value(qb, value);
            }
            Criterion::In(values) if values.is_empty() => {
                qb.push("1 = 0");
            }
            Criterion::In(values) => {
                qb.push(column).push(" IN (");
                for (j, value) in values.iter().enumerate() {
                    if j > 0 {
                        qb.push(", ");
                    }
                    push_value(qb, value);
                }
                qb.push(")");
            }
        }
    }
    Ok(())
}

pub fn build_select(table: &str, criteria: &Criteria, fetch_one: bool) -> Result<QueryBuilder<'static, Postgres>, Error> {
    let mut qb = QueryBuilder::new(format!("SELECT * FROM {}", quote_ident(table)?));
    push_where(&mut qb, criteria)?;
    if fetch_one {
        qb.push(" LIMIT 1");
    }
    Ok(qb)
}

pub fn build_insert(table: &str, data: &Record, returning: &str) -> Result<QueryBuilder<'static, Postgres>, Error> {
    if data.is_empty() {
        return Err(Error::Parse(format!("insert into {table} without columns")));
    }
    let mut qb = QueryBuilder::new(format!("INSERT INTO {} (", quote_ident(table)?));
    let mut values = Vec::with_capacity(data.len());
    for (i, (column, value)) in data.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(quote_ident(column)?);
        values.push(value);
    }
    qb.push(") VALUES (");
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        push_value(&mut qb, value);
    }
    qb.push(") RETURNING ").push(quote_ident(returning)?);
    Ok(qb)
}

/// One statement for every row. `rows` must be non-empty and share one column set.
pub fn build_insert_many(table: &str, rows: &[Record]) -> Result<QueryBuilder<'static, Postgres>, Error> {
    let first = rows
        .first()
        .ok_or_else(|| Error::Parse(format!("bulk insert into {table} without rows")))?;
    if first.is_empty() {
        return Err(Error::Parse(format!("insert into {table} without columns")));
    }
    let columns: Vec<&str> = first.columns().collect();
    if let Some(odd) = rows.iter().find(|r| !r.columns().eq(columns.iter().copied())) {
        return Err(Error::Parse(format!(
            "bulk insert into {table}: row columns {:?} differ from {:?}",
            odd.columns().collect::<Vec<_>>(),
            columns
        )));
    }

    let mut qb = QueryBuilder::new(format!("INSERT INTO {} (", quote_ident(table)?));
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(quote_ident(column)?);
    }
    qb.push(") VALUES ");
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push("(");
        for (j, (_, value)) in row.iter().enumerate() {
            if j > 0 {
                qb.push(", ");
            }
            push_value(&mut qb, value);
        }
        qb.push(")");
    }
    Ok(qb)
}

pub fn build_update(table: &str, data: &Record, criteria: &Criteria) -> Result<QueryBuilder<'static, Postgres>, Error> {
    if criteria.is_empty() {
        return Err(Error::EmptyCriteria {
            operation: "update",
            table: table.to_string(),
        });
    }
    if data.is_empty() {
        return Err(Error::Parse(format!("update of {table} without columns")));
    }
    let mut qb = QueryBuilder::new(format!("UPDATE {} SET ", quote_ident(table)?));
    for (i, (column, value)) in data.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(quote_ident(column)?).push(" = ");
        push_value(&mut qb, value);
    }
    push_where(&mut qb, criteria)?;
    Ok(qb)
}

pub fn build_delete(table: &str, criteria: &Criteria) -> Result<QueryBuilder<'static, Postgres>, Error> {
    if criteria.is_empty() {
        return Err(Error::EmptyCriteria {
            operation: "delete",
            table: table.to_string(),
        });
    }
    let mut qb = QueryBuilder::new(format!("DELETE FROM {}", quote_ident(table)?));
    push_where(&mut qb, criteria)?;
    Ok(qb)
}
