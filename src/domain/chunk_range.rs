use anyhow::{Result, anyhow};

use crate::domain::chunking_key::{ChunkingKey, KeyKind};
use crate::domain::session::{DmlSession, SqlScalar, format_tuple};
use crate::domain::session_vars::{RangeBound, RangeVariables, assign, read_bound};

/// Seeds the global `min`/`max` session variables for `database.table` and
/// reports whether there is any work at all. `false` means the table is
/// empty and the caller should exit cleanly.
pub async fn initialize_range<S: DmlSession>(
    session: &mut S,
    key: &ChunkingKey,
    vars: &RangeVariables,
    database: &str,
    table: &str,
    start_with: Option<&str>,
    end_with: Option<&str>,
    verbose: bool,
) -> Result<bool> {
    seed_bound(
        session, key, vars, database, table, RangeBound::Min, start_with, verbose,
    )
    .await?;
    seed_bound(
        session, key, vars, database, table, RangeBound::Max, end_with, verbose,
    )
    .await?;

    if !range_exists(session, database, table).await? {
        return Ok(false);
    }

    if verbose {
        let min_values = read_bound(session, vars, RangeBound::Min).await?;
        let max_values = read_bound(session, vars, RangeBound::Max).await?;
        println!(
            "-- {} (min, max) values: ({}, {})",
            key.column_list(),
            format_tuple(&min_values),
            format_tuple(&max_values)
        );
    }

    Ok(true)
}

async fn seed_bound<S: DmlSession>(
    session: &mut S,
    key: &ChunkingKey,
    vars: &RangeVariables,
    database: &str,
    table: &str,
    bound: RangeBound,
    override_value: Option<&str>,
    verbose: bool,
) -> Result<()> {
    let (flag, alias, label) = match bound {
        RangeBound::Min => ("--start-with", "start_with", "Starting with"),
        RangeBound::Max => ("--end-with", "end_with", "Ending with"),
        _ => unreachable!("only min and max are seeded"),
    };

    let Some(override_value) = override_value else {
        // No override: take the smallest (or largest) existing key tuple.
        let descending = bound == RangeBound::Max;
        let query = format!(
            "SELECT {} INTO {} FROM {database}.{table} ORDER BY {} LIMIT 1",
            key.column_list(),
            vars.refs(bound),
            key.order_by(descending)
        );
        session.exec(&query).await?;
        return Ok(());
    };

    if key.kind != KeyKind::Integer || key.arity() != 1 {
        return Err(anyhow!(
            "{flag} only applies to single column integer chunking keys"
        ));
    }

    let seed = match override_value.trim().parse::<i64>() {
        Ok(literal) => literal,
        // Not an integer literal: treat it as a scalar sub-statement whose
        // result column is aliased `start_with` / `end_with`.
        Err(_) => {
            let row = session
                .query_row(override_value)
                .await?
                .ok_or_else(|| anyhow!("{flag} statement returned no row"))?;
            row.get(alias)
                .and_then(SqlScalar::as_i64)
                .ok_or_else(|| {
                    anyhow!("{flag} statement must yield an integer column aliased {alias}")
                })?
        }
    };

    assign(session, &vars.refs(bound), &seed.to_string()).await?;
    if verbose {
        println!("-- {label}: {seed}");
    }
    Ok(())
}

async fn range_exists<S: DmlSession>(
    session: &mut S,
    database: &str,
    table: &str,
) -> Result<bool> {
    let query = format!(
        "SELECT COUNT(*) AS range_exists FROM (SELECT NULL FROM {database}.{table} LIMIT 1) sel"
    );
    let row = session
        .query_row(&query)
        .await?
        .ok_or_else(|| anyhow!("emptiness probe returned no row"))?;
    Ok(row
        .get("range_exists")
        .and_then(SqlScalar::as_i64)
        .unwrap_or(0)
        > 0)
}
