use anyhow::{Result, anyhow};
use regex::Regex;
use sqlparser::{ast::Statement, dialect::MySqlDialect, parser::Parser};

use crate::domain::chunking_key::ChunkingKey;
use crate::domain::session_vars::{RangeBound, RangeVariables};

/// The `GO_CHUNK(<table>)` occurrence found in the user's statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelTarget {
    /// The exact matched token, substituted verbatim per chunk.
    pub token: String,
    /// Schema qualifier, when the user wrote `GO_CHUNK(db.name)`.
    pub database: Option<String>,
    pub table: String,
}

/// Locates the sentinel token and resolves its table specification.
pub fn extract_sentinel(statement: &str) -> Result<SentinelTarget> {
    let pattern = Regex::new(r"GO_CHUNK\(([^)]+)\)")
        .map_err(|error| anyhow!("unable to compile sentinel pattern: {error}"))?;
    let captures = pattern
        .captures(statement)
        .ok_or_else(|| anyhow!("Query must contain GO_CHUNK(table_name)"))?;

    let token = captures[0].to_string();
    let spec = captures[1].trim();
    let parts = spec.split('.').map(str::trim).collect::<Vec<_>>();
    let table = parts
        .last()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| anyhow!("GO_CHUNK() must name a table"))?
        .to_string();
    let database = (parts.len() == 2 && !parts[0].is_empty()).then(|| parts[0].to_string());

    Ok(SentinelTarget {
        token,
        database,
        table,
    })
}

/// Pre-flight check: the statement must parse as exactly one UPDATE, DELETE
/// or INSERT under the MySQL dialect. The sentinel parses as an ordinary
/// function call, so no rewriting is needed first.
pub fn validate_statement(statement: &str) -> Result<()> {
    let statements = Parser::parse_sql(&MySqlDialect {}, statement)
        .map_err(|error| anyhow!("unable to parse --execute statement: {error}"))?;
    if statements.len() != 1 {
        return Err(anyhow!("--execute must contain exactly one statement"));
    }
    match statements[0] {
        Statement::Update { .. } | Statement::Delete { .. } | Statement::Insert { .. } => Ok(()),
        _ => Err(anyhow!(
            "--execute must be an UPDATE, DELETE or INSERT statement"
        )),
    }
}

/// The two rewritten forms of the user's statement. The first round must
/// include the global minimum; later rounds exclude the previous endpoint,
/// which the preceding chunk already covered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementTemplate {
    pub first_query: String,
    pub rest_query: String,
}

impl StatementTemplate {
    pub fn build(
        statement: &str,
        sentinel: &SentinelTarget,
        key: &ChunkingKey,
        vars: &RangeVariables,
    ) -> Self {
        let key_expr = key.tuple_expr();
        let first_predicate = format!(
            "{key_expr} >= {} AND {key_expr} <= {}",
            vars.tuple(RangeBound::Min),
            vars.tuple(RangeBound::End)
        );
        let rest_predicate = format!(
            "{key_expr} > {} AND {key_expr} <= {}",
            vars.tuple(RangeBound::Start),
            vars.tuple(RangeBound::End)
        );

        Self {
            first_query: statement.replace(&sentinel.token, &first_predicate),
            rest_query: statement.replace(&sentinel.token, &rest_predicate),
        }
    }
}
