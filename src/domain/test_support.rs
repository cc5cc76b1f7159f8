//! In-memory stand-in for a MySQL session, used by the engine tests. It
//! holds a sorted table of integer key tuples, simulates session variables,
//! and interprets exactly the statement shapes the engine emits.

use std::collections::HashMap;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::domain::session::{DmlSession, SessionRow, SqlScalar};

pub struct FakeSession {
    key_columns: Vec<String>,
    rows: Vec<Vec<i64>>,
    pub vars: HashMap<String, SqlScalar>,
    pub executed: Vec<String>,
    /// Key tuples in the order chunk statements touched them.
    pub touch_order: Vec<Vec<i64>>,
    /// How often each key tuple was touched; disjointness means all ones.
    pub touch_counts: HashMap<Vec<i64>, u64>,
    /// Literal values assigned into the `end` variables, one entry per probe.
    pub endpoint_literals: Vec<String>,
    /// Affected-row count of each chunk statement, in execution order.
    pub chunk_rows: Vec<u64>,
    pub lock_events: Vec<String>,
    pub unique_key_rows: Vec<SessionRow>,
    pub table_present: bool,
    canned: Vec<(String, SessionRow)>,
    fail_once: Option<String>,
}

impl FakeSession {
    pub fn new(key_columns: &[&str], mut rows: Vec<Vec<i64>>) -> Self {
        rows.sort();
        Self {
            key_columns: key_columns.iter().map(|name| name.to_string()).collect(),
            rows,
            vars: HashMap::new(),
            executed: Vec::new(),
            touch_order: Vec::new(),
            touch_counts: HashMap::new(),
            endpoint_literals: Vec::new(),
            chunk_rows: Vec::new(),
            lock_events: Vec::new(),
            unique_key_rows: Vec::new(),
            table_present: true,
            canned: Vec::new(),
            fail_once: None,
        }
    }

    pub fn var(&self, name: &str) -> Option<SqlScalar> {
        self.vars.get(name).cloned()
    }

    pub fn chunk_sizes(&self) -> &[u64] {
        &self.chunk_rows
    }

    /// Registers a canned single-row answer for any query containing `pattern`.
    pub fn put_canned(&mut self, pattern: &str, row: SessionRow) {
        self.canned.push((pattern.to_string(), row));
    }

    /// Makes the next statement containing `pattern` fail, once.
    pub fn fail_once_matching(&mut self, pattern: &str) {
        self.fail_once = Some(pattern.to_string());
    }

    fn run_assignment(&mut self, statement: &str) -> Result<()> {
        let body = statement
            .strip_prefix("SELECT ")
            .ok_or_else(|| anyhow!("malformed assignment: {statement}"))?;
        let (sources, rest) = body
            .split_once(" INTO ")
            .ok_or_else(|| anyhow!("malformed assignment: {statement}"))?;

        if let Some((targets, tail)) = rest.split_once(" FROM ") {
            // Range seeding: smallest or largest key tuple of the table.
            let seed = if tail.contains(" DESC") {
                self.rows.last()
            } else {
                self.rows.first()
            }
            .cloned();
            for (index, target) in split_list(targets).iter().enumerate() {
                let value = seed
                    .as_ref()
                    .and_then(|row| row.get(index))
                    .map(|component| SqlScalar::Int(*component))
                    .unwrap_or(SqlScalar::Null);
                self.vars.insert(strip_sigil(target), value);
            }
            return Ok(());
        }

        let source_tokens = split_list(sources);
        let targets = split_list(rest);
        if source_tokens.len() != targets.len() {
            return Err(anyhow!("assignment arity mismatch: {statement}"));
        }
        if targets
            .first()
            .is_some_and(|target| target.contains("u_end_"))
            && source_tokens
                .first()
                .is_some_and(|source| !source.starts_with('@'))
        {
            self.endpoint_literals.push(sources.trim().to_string());
        }
        for (source, target) in source_tokens.iter().zip(&targets) {
            let value = if let Some(name) = source.strip_prefix('@') {
                self.vars.get(name).cloned().unwrap_or(SqlScalar::Null)
            } else if let Ok(literal) = source.parse::<i64>() {
                SqlScalar::Int(literal)
            } else if source.starts_with('\'') {
                SqlScalar::Text(source.trim_matches('\'').to_string())
            } else {
                SqlScalar::Null
            };
            self.vars.insert(strip_sigil(target), value);
        }
        Ok(())
    }

    fn run_dml(&mut self, statement: &str) -> Result<u64> {
        let (_, predicate) = statement
            .split_once(" WHERE ")
            .ok_or_else(|| anyhow!("chunk statement without WHERE: {statement}"))?;
        let matched = {
            let rows = &self.rows;
            rows.iter()
                .filter(|row| self.eval_predicate(predicate, row))
                .cloned()
                .collect::<Vec<_>>()
        };
        for row in &matched {
            *self.touch_counts.entry(row.clone()).or_insert(0) += 1;
            self.touch_order.push(row.clone());
        }
        let affected = matched.len() as u64;
        self.chunk_rows.push(affected);
        Ok(affected)
    }

    fn eval_predicate(&self, predicate: &str, row: &[i64]) -> bool {
        predicate
            .split(" AND ")
            .all(|term| self.eval_term(term.trim(), row))
    }

    fn eval_term(&self, term: &str, row: &[i64]) -> bool {
        for operator in [">=", "<=", ">", "<", "="] {
            let Some(position) = term.find(operator) else {
                continue;
            };
            let (lhs, rhs) = (
                &term[..position],
                &term[position + operator.len()..],
            );
            let (Some(left), Some(right)) =
                (self.operand(lhs, row), self.operand(rhs, row))
            else {
                return false;
            };
            return match operator {
                ">=" => left >= right,
                "<=" => left <= right,
                ">" => left > right,
                "<" => left < right,
                _ => left == right,
            };
        }
        false
    }

    /// Resolves a comparison side into an integer tuple: session variables,
    /// integer literals, or key-column references against the current row.
    fn operand(&self, text: &str, row: &[i64]) -> Option<Vec<i64>> {
        let trimmed = text.trim();
        let inner = trimmed
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap_or(trimmed);
        let mut values = Vec::new();
        for token in split_list(inner) {
            if let Some(name) = token.strip_prefix('@') {
                values.push(self.vars.get(name).and_then(SqlScalar::as_i64)?);
            } else if let Ok(literal) = token.parse::<i64>() {
                values.push(literal);
            } else {
                let index = self
                    .key_columns
                    .iter()
                    .position(|column| column == &token)?;
                values.push(*row.get(index)?);
            }
        }
        Some(values)
    }

    fn answer_probe(&self, query: &str) -> Result<Option<SessionRow>> {
        let predicate_start = query
            .find(" WHERE ")
            .ok_or_else(|| anyhow!("probe without WHERE: {query}"))?
            + " WHERE ".len();
        let predicate_end = query[predicate_start..]
            .find(" ORDER BY ")
            .ok_or_else(|| anyhow!("probe without ORDER BY: {query}"))?
            + predicate_start;
        let predicate = &query[predicate_start..predicate_end];

        let limit_start = query[predicate_end..]
            .find("LIMIT ")
            .ok_or_else(|| anyhow!("probe without LIMIT: {query}"))?
            + predicate_end
            + "LIMIT ".len();
        let limit = query[limit_start..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect::<String>()
            .parse::<usize>()
            .map_err(|error| anyhow!("probe limit unreadable: {error}"))?;

        // Rows are kept sorted, so the candidate window is already ordered.
        let last = self
            .rows
            .iter()
            .filter(|row| self.eval_predicate(predicate, row))
            .take(limit)
            .last();
        Ok(last.map(|row| {
            self.key_columns
                .iter()
                .zip(row)
                .map(|(column, value)| (column.clone(), SqlScalar::Int(*value)))
                .collect()
        }))
    }
}

fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .collect()
}

fn strip_sigil(name: &str) -> String {
    name.trim().trim_start_matches('@').to_string()
}

#[async_trait]
impl DmlSession for FakeSession {
    async fn exec(&mut self, statement: &str) -> Result<u64> {
        self.executed.push(statement.to_string());
        if self
            .fail_once
            .as_deref()
            .is_some_and(|pattern| statement.contains(pattern))
        {
            let pattern = self.fail_once.take().unwrap_or_default();
            return Err(anyhow!("injected failure for {pattern}"));
        }

        let trimmed = statement.trim();
        if trimmed.starts_with("SET ") {
            Ok(0)
        } else if trimmed.starts_with("LOCK TABLES") {
            self.lock_events.push("lock".to_string());
            Ok(0)
        } else if trimmed.starts_with("UNLOCK TABLES") {
            self.lock_events.push("unlock".to_string());
            Ok(0)
        } else if trimmed.starts_with("SELECT") && trimmed.contains(" INTO ") {
            self.run_assignment(trimmed).map(|()| 0)
        } else if trimmed.starts_with("UPDATE")
            || trimmed.starts_with("DELETE")
            || trimmed.starts_with("INSERT")
        {
            self.run_dml(trimmed)
        } else {
            Err(anyhow!("fake session cannot execute: {statement}"))
        }
    }

    async fn query_row(&mut self, query: &str) -> Result<Option<SessionRow>> {
        for (pattern, row) in &self.canned {
            if query.contains(pattern.as_str()) {
                return Ok(Some(row.clone()));
            }
        }

        if query.contains(" AS overflow") {
            let body = query
                .trim_start_matches("SELECT ")
                .trim_end_matches(" AS overflow");
            let overflowed = self.eval_term(body, &[]);
            return Ok(Some(
                [(
                    "overflow".to_string(),
                    SqlScalar::Int(if overflowed { 1 } else { 0 }),
                )]
                .into(),
            ));
        }

        if query.contains("AS range_exists") {
            let exists = if self.rows.is_empty() { 0 } else { 1 };
            return Ok(Some(
                [("range_exists".to_string(), SqlScalar::Int(exists))].into(),
            ));
        }

        if query.contains(") sel ORDER BY") {
            return self.answer_probe(query);
        }

        if let Some(rest) = query.strip_prefix("SELECT @") {
            let name = rest
                .split_whitespace()
                .next()
                .ok_or_else(|| anyhow!("malformed variable read: {query}"))?;
            let value = self.vars.get(name).cloned().unwrap_or(SqlScalar::Null);
            return Ok(Some([(name.to_string(), value)].into()));
        }

        Err(anyhow!("fake session cannot answer: {query}"))
    }

    async fn query_rows(&mut self, query: &str) -> Result<Vec<SessionRow>> {
        Err(anyhow!("fake session cannot answer row sets: {query}"))
    }

    async fn table_exists(&mut self, _database: &str, _table: &str) -> Result<bool> {
        Ok(self.table_present)
    }

    async fn possible_unique_key_columns(
        &mut self,
        _database: &str,
        _table: &str,
    ) -> Result<Vec<SessionRow>> {
        Ok(self.unique_key_rows.clone())
    }

    async fn lock_table_read(&mut self, database: &str, table: &str) -> Result<()> {
        self.lock_events.push(format!("lock {database}.{table}"));
        Ok(())
    }

    async fn unlock_tables(&mut self) -> Result<()> {
        self.lock_events.push("unlock".to_string());
        Ok(())
    }
}
