// dragonbot-core/src/db/values.rs
//
// Column values, rows and filter criteria shared by every `TableStore`.

use std::collections::BTreeMap;

use dragonbot_common::error::Error;
use twilight_model::id::Id;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SqlValue {
    Null,
    Int(i64),
    Text(String),
    Bool(bool),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v.into())
    }
}

impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        SqlValue::Int(v.into())
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

/// Snowflakes are stored in BIGINT columns; they never exceed `i64::MAX`.
impl<T> From<Id<T>> for SqlValue {
    fn from(id: Id<T>) -> Self {
        SqlValue::Int(id.get() as i64)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// One row, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record(BTreeMap<String, SqlValue>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<SqlValue>) {
        self.0.insert(column.to_string(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.0.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copies `other`'s columns over this row's.
    pub fn merge(&mut self, other: &Record) {
        for (column, value) in other.iter() {
            self.0.insert(column.to_string(), value.clone());
        }
    }

    pub fn int(&self, column: &str) -> Result<i64, Error> {
        match self.get(column) {
            Some(SqlValue::Int(v)) => Ok(*v),
            other => Err(Error::Parse(format!("column {column}: expected integer, got {other:?}"))),
        }
    }

    pub fn opt_int(&self, column: &str) -> Result<Option<i64>, Error> {
        match self.get(column) {
            None | Some(SqlValue::Null) => Ok(None),
            Some(SqlValue::Int(v)) => Ok(Some(*v)),
            other => Err(Error::Parse(format!("column {column}: expected integer, got {other:?}"))),
        }
    }

    pub fn text(&self, column: &str) -> Result<&str, Error> {
        match self.get(column) {
            Some(SqlValue::Text(v)) => Ok(v),
            other => Err(Error::Parse(format!("column {column}: expected text, got {other:?}"))),
        }
    }

    pub fn bool(&self, column: &str) -> Result<bool, Error> {
        match self.get(column) {
            Some(SqlValue::Bool(v)) => Ok(*v),
            other => Err(Error::Parse(format!("column {column}: expected boolean, got {other:?}"))),
        }
    }

    /// A non-zero snowflake column.
    pub fn id<T>(&self, column: &str) -> Result<Id<T>, Error> {
        self.opt_id(column)?
            .ok_or_else(|| Error::Parse(format!("column {column}: expected id, got null")))
    }

    pub fn opt_id<T>(&self, column: &str) -> Result<Option<Id<T>>, Error> {
        match self.opt_int(column)? {
            None => Ok(None),
            Some(raw) => u64::try_from(raw)
                .ok()
                .and_then(Id::new_checked)
                .map(Some)
                .ok_or_else(|| Error::Parse(format!("column {column}: {raw} is not a valid id"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Criterion {
    Eq(SqlValue),
    /// Matches any of the values. An empty list matches nothing.
    In(Vec<SqlValue>),
}

impl Criterion {
    pub fn matches(&self, value: &SqlValue) -> bool {
        match self {
            Criterion::Eq(expected) => expected == value,
            Criterion::In(options) => options.contains(value),
        }
    }
}

/// Conjunction of column filters, rendered in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Criteria(Vec<(String, Criterion)>);

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<SqlValue>) -> Self {
        self.0.push((column.to_string(), Criterion::Eq(value.into())));
        self
    }

    pub fn any_of<V: Into<SqlValue>>(mut self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.0.push((column.to_string(), Criterion::In(values)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Criterion)> {
        self.0.iter().map(|(c, v)| (c.as_str(), v))
    }

    /// Whether `record` satisfies every filter. A column missing from the record reads as NULL.
    pub fn matches(&self, record: &Record) -> bool {
        self.iter()
            .all(|(column, criterion)| criterion.matches(record.get(column).unwrap_or(&SqlValue::Null)))
    }
}

/// Result of `TableStore::select`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selected {
    One(Option<Record>),
    Many(Vec<Record>),
}

impl Selected {
    pub fn into_one(self) -> Option<Record> {
        match self {
            Selected::One(r) => r,
            Selected::Many(rows) => rows.into_iter().next(),
        }
    }

    pub fn into_many(self) -> Vec<Record> {
        match self {
            Selected::One(r) => r.into_iter().collect(),
            Selected::Many(rows) => rows,
        }
    }
}
