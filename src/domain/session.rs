use std::collections::HashMap;
use std::fmt;

use anyhow::Result;
use async_trait::async_trait;

/// A single result row, keyed by column label.
pub type SessionRow = HashMap<String, SqlScalar>;

/// A database scalar with its native width preserved. Byte-valued results
/// (VARBINARY session variables, text columns) are normalized to `Text`.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlScalar {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

impl SqlScalar {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlScalar::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlScalar::Int(value) => Some(*value),
            SqlScalar::UInt(value) => i64::try_from(*value).ok(),
            SqlScalar::Text(raw) => raw.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlScalar::Int(value) => Some(*value as f64),
            SqlScalar::UInt(value) => Some(*value as f64),
            SqlScalar::Float(value) => Some(*value),
            SqlScalar::Text(raw) => raw.trim().parse().ok(),
            SqlScalar::Null => None,
        }
    }

    /// Renders the value as a MySQL literal: numeric values bare, text
    /// values single-quoted with `'` and `\` escaped.
    pub fn to_sql_literal(&self) -> String {
        match self {
            SqlScalar::Null => "NULL".to_string(),
            SqlScalar::Int(value) => value.to_string(),
            SqlScalar::UInt(value) => value.to_string(),
            SqlScalar::Float(value) => value.to_string(),
            SqlScalar::Text(raw) => {
                let escaped = raw.replace('\\', "\\\\").replace('\'', "''");
                format!("'{escaped}'")
            }
        }
    }
}

impl fmt::Display for SqlScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlScalar::Null => f.write_str("NULL"),
            SqlScalar::Int(value) => write!(f, "{value}"),
            SqlScalar::UInt(value) => write!(f, "{value}"),
            SqlScalar::Float(value) => write!(f, "{value}"),
            SqlScalar::Text(raw) => f.write_str(raw),
        }
    }
}

/// Renders a key value for display: bare scalar for single-column keys,
/// parenthesized tuple otherwise.
pub fn format_tuple(values: &[SqlScalar]) -> String {
    if values.len() == 1 {
        values[0].to_string()
    } else {
        let joined = values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        format!("({joined})")
    }
}

/// The capability set the chunking engine needs from a database session.
///
/// All operations take `&mut self`: the engine owns exactly one session and
/// every statement on it is strictly serialized. Session variables and
/// `LOCK TABLES` state are scoped to that one connection.
#[async_trait]
pub trait DmlSession {
    /// Executes a statement, returning the affected-row count.
    async fn exec(&mut self, statement: &str) -> Result<u64>;

    /// Executes a query expected to yield at most one row.
    async fn query_row(&mut self, query: &str) -> Result<Option<SessionRow>>;

    /// Multi-row form of [`DmlSession::query_row`].
    async fn query_rows(&mut self, query: &str) -> Result<Vec<SessionRow>>;

    async fn table_exists(&mut self, database: &str, table: &str) -> Result<bool>;

    /// Rows describing the first column of every unique index on the table,
    /// best candidate first. See the ranking in the MySQL implementation.
    async fn possible_unique_key_columns(
        &mut self,
        database: &str,
        table: &str,
    ) -> Result<Vec<SessionRow>>;

    async fn lock_table_read(&mut self, database: &str, table: &str) -> Result<()>;

    async fn unlock_tables(&mut self) -> Result<()>;
}
