use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};

use crate::domain::chunk_template::StatementTemplate;
use crate::domain::chunking_key::ChunkingKey;
use crate::domain::session::{DmlSession, SqlScalar, format_tuple};
use crate::domain::session_vars::{
    RangeBound, RangeVariables, assign, read_bound, read_variable,
};

#[derive(Debug, Clone)]
pub struct ChunkOptions {
    pub database: String,
    pub table: String,
    /// Rows per window; 0 means all rows in a single window.
    pub chunk_size: u64,
    pub sleep_millis: u64,
    /// Extra pause after each chunk: this fraction of the chunk's elapsed time.
    pub sleep_ratio: f64,
    pub terminate_on_not_found: bool,
    pub skip_retry_chunk: bool,
    pub no_log_bin: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub chunks_executed: u64,
    pub rows_affected: u64,
}

/// The advance-and-execute loop. Owns no state of its own between chunks:
/// every bound lives in session variables on the one connection.
///
/// Window scheme: chunk 0 covers `[min, end]`, later chunks `(start, end]`
/// with `start` equal to the previous endpoint. The endpoint probe uses a
/// strict lower bound after round 0, so the previous endpoint acts as a
/// ghost row and every live key in `[min, max]` lands in exactly one window.
pub struct ChunkDriver<'a, S: DmlSession> {
    session: &'a mut S,
    key: &'a ChunkingKey,
    vars: RangeVariables,
    options: &'a ChunkOptions,
}

impl<'a, S: DmlSession> ChunkDriver<'a, S> {
    pub fn new(
        session: &'a mut S,
        key: &'a ChunkingKey,
        vars: RangeVariables,
        options: &'a ChunkOptions,
    ) -> Self {
        Self {
            session,
            key,
            vars,
            options,
        }
    }

    pub async fn run(&mut self, template: &StatementTemplate) -> Result<ChunkOutcome> {
        if self.options.no_log_bin {
            self.session.exec("SET SESSION SQL_LOG_BIN=0").await?;
        }

        // min/max are never mutated inside the loop, so the progress
        // denominator can be read once up front.
        let global_min =
            read_variable(self.session, &self.vars.name(RangeBound::Min, 0)).await?;
        let global_max =
            read_variable(self.session, &self.vars.name(RangeBound::Max, 0)).await?;

        assign(
            self.session,
            &self.vars.refs(RangeBound::Start),
            &self.vars.refs(RangeBound::Min),
        )
        .await?;

        let mut outcome = ChunkOutcome::default();
        let mut total_elapsed = Duration::ZERO;
        let mut first_round = true;

        loop {
            self.install_endpoint(first_round).await?;

            if self.options.verbose {
                self.report_window(&global_min, &global_max).await?;
            }

            if !first_round && self.window_overflowed().await? {
                break;
            }

            let query = if first_round {
                &template.first_query
            } else {
                &template.rest_query
            };
            let started = Instant::now();
            let affected = self.execute_chunk(query).await?;
            let elapsed = started.elapsed();

            outcome.chunks_executed += 1;
            outcome.rows_affected += affected;
            total_elapsed += elapsed;

            if self.options.verbose {
                println!(
                    "-- + Rows: {affected} affected, {} accumulating; seconds: {:.1} elapsed; {:.1} executed",
                    outcome.rows_affected,
                    elapsed.as_secs_f64(),
                    total_elapsed.as_secs_f64()
                );
            }

            if affected == 0 && self.options.terminate_on_not_found {
                if self.options.verbose {
                    println!("-- Chunk affected no rows, terminating");
                }
                break;
            }

            self.pause(elapsed).await;

            assign(
                self.session,
                &self.vars.refs(RangeBound::Start),
                &self.vars.refs(RangeBound::End),
            )
            .await?;
            first_round = false;
        }

        if self.options.verbose {
            println!(
                "-- Performing chunks range complete. Affected rows: {}",
                outcome.rows_affected
            );
        }

        Ok(outcome)
    }

    /// Advances `end` to the largest key within the next `chunk_size` rows
    /// of the window, or to `max` when no further rows exist.
    async fn install_endpoint(&mut self, first_round: bool) -> Result<()> {
        if self.options.chunk_size == 0 {
            return assign(
                self.session,
                &self.vars.refs(RangeBound::End),
                &self.vars.refs(RangeBound::Max),
            )
            .await;
        }

        // Round 0 must keep the global minimum as a candidate; afterwards
        // the window start was covered by the previous chunk.
        let low_operator = if first_round { ">=" } else { ">" };
        let key_expr = self.key.tuple_expr();
        let columns = self.key.column_list();
        let probe = format!(
            "SELECT {columns} FROM (SELECT {columns} FROM {}.{} WHERE {key_expr} {low_operator} {} AND {key_expr} <= {} ORDER BY {} LIMIT {}) sel ORDER BY {} LIMIT 1",
            self.options.database,
            self.options.table,
            self.vars.tuple(RangeBound::Start),
            self.vars.tuple(RangeBound::Max),
            self.key.order_by(false),
            self.options.chunk_size,
            self.key.order_by(true),
        );

        match self.session.query_row(&probe).await? {
            None => {
                assign(
                    self.session,
                    &self.vars.refs(RangeBound::End),
                    &self.vars.refs(RangeBound::Max),
                )
                .await
            }
            Some(row) => {
                let literals = self
                    .key
                    .columns
                    .iter()
                    .map(|column| {
                        row.get(column)
                            .map(SqlScalar::to_sql_literal)
                            .ok_or_else(|| anyhow!("endpoint probe is missing column {column}"))
                    })
                    .collect::<Result<Vec<_>>>()?
                    .join(",");
                assign(self.session, &self.vars.refs(RangeBound::End), &literals).await
            }
        }
    }

    /// Server-side tuple comparison of the window start against the global
    /// maximum; true once the window has caught up.
    async fn window_overflowed(&mut self) -> Result<bool> {
        let query = format!(
            "SELECT {} >= {} AS overflow",
            self.vars.tuple(RangeBound::Start),
            self.vars.tuple(RangeBound::Max)
        );
        let row = self
            .session
            .query_row(&query)
            .await?
            .ok_or_else(|| anyhow!("overflow check returned no row"))?;
        Ok(row.get("overflow").and_then(SqlScalar::as_i64) == Some(1))
    }

    async fn execute_chunk(&mut self, query: &str) -> Result<u64> {
        match self.session.exec(query).await {
            Ok(affected) => Ok(affected),
            Err(error) if !self.options.skip_retry_chunk => {
                if self.options.verbose {
                    println!("-- Chunk failed ({error:#}), retrying once");
                }
                self.session.exec(query).await
            }
            Err(error) => Err(error),
        }
    }

    async fn pause(&self, chunk_elapsed: Duration) {
        if self.options.sleep_millis > 0 {
            tokio::time::sleep(Duration::from_millis(self.options.sleep_millis)).await;
        }
        if self.options.sleep_ratio > 0.0 {
            tokio::time::sleep(chunk_elapsed.mul_f64(self.options.sleep_ratio)).await;
        }
    }

    async fn report_window(
        &mut self,
        global_min: &SqlScalar,
        global_max: &SqlScalar,
    ) -> Result<()> {
        let start_values = read_bound(self.session, &self.vars, RangeBound::Start).await?;
        let end_values = read_bound(self.session, &self.vars, RangeBound::End).await?;
        let progress = progress_percent(global_min, global_max, start_values.first());
        println!(
            "-- Performing chunks range {}, {}, progress: {progress}%",
            format_tuple(&start_values),
            format_tuple(&end_values)
        );
        Ok(())
    }
}

/// Integer percentage of `(start - min) / (max - min)`. Only the first key
/// column contributes; 0 whenever the denominator is not positive or a
/// component is non-numeric.
fn progress_percent(
    global_min: &SqlScalar,
    global_max: &SqlScalar,
    window_start: Option<&SqlScalar>,
) -> i64 {
    let (Some(min), Some(max), Some(start)) = (
        global_min.as_f64(),
        global_max.as_f64(),
        window_start.and_then(SqlScalar::as_f64),
    ) else {
        return 0;
    };
    if max > min {
        ((start - min) / (max - min) * 100.0) as i64
    } else {
        0
    }
}
