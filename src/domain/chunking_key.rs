use std::fmt;

use anyhow::Result;

use crate::domain::session::{DmlSession, SessionRow};

/// Semantic classification of a chunking key, derived from the first
/// column's declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Integer,
    Text,
    Temporal,
    Unknown,
}

impl KeyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyKind::Integer => "integer",
            KeyKind::Text => "text",
            KeyKind::Temporal => "temporal",
            KeyKind::Unknown => "unknown",
        }
    }

    fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "integer" => KeyKind::Integer,
            "text" => KeyKind::Text,
            "temporal" => KeyKind::Temporal,
            _ => KeyKind::Unknown,
        }
    }

    /// Schema-driven classification: a character set wins over the declared
    /// type, then integer and date/time families are recognized by name.
    fn from_schema(data_type: &str, character_set: Option<&str>) -> Self {
        if character_set.is_some_and(|name| !name.is_empty()) {
            return KeyKind::Text;
        }
        let data_type = data_type.to_ascii_lowercase();
        if data_type.contains("int") {
            KeyKind::Integer
        } else if data_type.contains("time") || data_type.contains("date") {
            KeyKind::Temporal
        } else {
            KeyKind::Unknown
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unique-index column (or column tuple) the table is partitioned by.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkingKey {
    pub columns: Vec<String>,
    pub kind: KeyKind,
}

impl ChunkingKey {
    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    pub fn column_list(&self) -> String {
        self.columns.join(",")
    }

    /// Column list shaped for comparison: parenthesized row constructor for
    /// composite keys, the bare column otherwise.
    pub fn tuple_expr(&self) -> String {
        if self.columns.len() == 1 {
            self.columns[0].clone()
        } else {
            format!("({})", self.column_list())
        }
    }

    /// Lexicographic ORDER BY clause, one direction per column.
    pub fn order_by(&self, descending: bool) -> String {
        let direction = if descending { "DESC" } else { "ASC" };
        self.columns
            .iter()
            .map(|column| format!("{column} {direction}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Parses a `--force-chunking-column` value: `c1,c2,...` yields the
    /// verbatim columns with unknown kind, `c:kind` a single typed column,
    /// and bare `c` a single column of unknown kind.
    pub fn from_forced(spec: &str) -> Self {
        let tokens = spec.split(',').map(str::trim).collect::<Vec<_>>();
        if tokens.len() > 1 {
            return Self {
                columns: tokens.iter().map(|token| token.to_string()).collect(),
                kind: KeyKind::Unknown,
            };
        }
        match spec.split_once(':') {
            Some((column, kind)) => Self {
                columns: vec![column.trim().to_string()],
                kind: KeyKind::from_token(kind),
            },
            None => Self {
                columns: vec![spec.trim().to_string()],
                kind: KeyKind::Unknown,
            },
        }
    }

    /// Picks the chunking key for `database.table`: the forced specification
    /// when given, otherwise the best-ranked unique index reported by the
    /// session. Returns `None` when the table has no unique index.
    pub async fn discover<S: DmlSession>(
        session: &mut S,
        database: &str,
        table: &str,
        forced: Option<&str>,
    ) -> Result<Option<Self>> {
        if let Some(spec) = forced {
            return Ok(Some(Self::from_forced(spec)));
        }

        let rows = session.possible_unique_key_columns(database, table).await?;
        let Some(head) = rows.first() else {
            return Ok(None);
        };

        let column_names = text_field(head, "COLUMN_NAMES").unwrap_or_default();
        if column_names.is_empty() {
            return Ok(None);
        }
        let columns = column_names
            .to_ascii_lowercase()
            .split(',')
            .map(|column| column.trim().to_string())
            .collect::<Vec<_>>();

        let data_type = text_field(head, "DATA_TYPE").unwrap_or_default();
        let character_set = text_field(head, "CHARACTER_SET_NAME");
        let kind = KeyKind::from_schema(&data_type, character_set.as_deref());

        Ok(Some(Self { columns, kind }))
    }
}

fn text_field(row: &SessionRow, name: &str) -> Option<String> {
    row.get(name).and_then(|value| {
        if value.is_null() {
            None
        } else {
            Some(value.to_string())
        }
    })
}
