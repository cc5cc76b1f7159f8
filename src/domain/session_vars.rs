use anyhow::{Result, anyhow};

use crate::domain::session::{DmlSession, SqlScalar};

/// The four bound families held server-side for the duration of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBound {
    Min,
    Max,
    Start,
    End,
}

impl RangeBound {
    fn prefix(self) -> &'static str {
        match self {
            RangeBound::Min => "u_min",
            RangeBound::Max => "u_max",
            RangeBound::Start => "u_start",
            RangeBound::End => "u_end",
        }
    }
}

/// Synthesizes the session-variable names for a chunking key of arity `k`:
/// `@u_min_0 .. @u_min_{k-1}` and likewise for max, start and end.
#[derive(Debug, Clone, Copy)]
pub struct RangeVariables {
    arity: usize,
}

impl RangeVariables {
    pub fn new(arity: usize) -> Self {
        Self { arity }
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Bare variable name without the `@` sigil, e.g. `u_min_0`.
    pub fn name(&self, bound: RangeBound, index: usize) -> String {
        format!("{}_{index}", bound.prefix())
    }

    /// Variable reference, e.g. `@u_min_0`.
    pub fn var_ref(&self, bound: RangeBound, index: usize) -> String {
        format!("@{}", self.name(bound, index))
    }

    /// Comma-joined references for SELECT ... INTO target lists.
    pub fn refs(&self, bound: RangeBound) -> String {
        (0..self.arity)
            .map(|index| self.var_ref(bound, index))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Reference list shaped for comparison: parenthesized row constructor
    /// for composite keys, the lone reference otherwise.
    pub fn tuple(&self, bound: RangeBound) -> String {
        if self.arity == 1 {
            self.var_ref(bound, 0)
        } else {
            format!("({})", self.refs(bound))
        }
    }
}

/// Issues `SELECT <source> INTO <targets>` on the session. Used both for
/// variable-to-variable copies and for injecting literal endpoints.
pub async fn assign<S: DmlSession>(session: &mut S, targets: &str, source: &str) -> Result<()> {
    session
        .exec(&format!("SELECT {source} INTO {targets}"))
        .await
        .map(|_| ())
}

/// Reads one session variable back with its native type preserved.
pub async fn read_variable<S: DmlSession>(session: &mut S, name: &str) -> Result<SqlScalar> {
    let query = format!("SELECT @{name} AS {name}");
    let row = session
        .query_row(&query)
        .await?
        .ok_or_else(|| anyhow!("reading session variable @{name} returned no row"))?;
    row.get(name)
        .cloned()
        .ok_or_else(|| anyhow!("session variable @{name} missing from result row"))
}

/// Reads every component of one bound family, in key-column order.
pub async fn read_bound<S: DmlSession>(
    session: &mut S,
    vars: &RangeVariables,
    bound: RangeBound,
) -> Result<Vec<SqlScalar>> {
    let mut values = Vec::with_capacity(vars.arity());
    for index in 0..vars.arity() {
        values.push(read_variable(session, &vars.name(bound, index)).await?);
    }
    Ok(values)
}
