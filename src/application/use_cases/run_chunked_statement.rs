use anyhow::{Context, Result, anyhow};

use crate::application::commands::{RunChunkedStatementCommand, RunChunkedStatementResult};
use crate::domain::chunk_driver::{ChunkDriver, ChunkOptions};
use crate::domain::chunk_range::initialize_range;
use crate::domain::chunk_template::{StatementTemplate, extract_sentinel};
use crate::domain::chunking_key::ChunkingKey;
use crate::domain::session::DmlSession;
use crate::domain::session_vars::RangeVariables;

/// Top-level flow for one run: validate, discover the chunking key, lock the
/// table, seed the range and drive the chunk loop. The session is the one
/// connection everything happens on.
#[derive(Debug, Default)]
pub struct RunChunkedStatementUseCase;

impl RunChunkedStatementUseCase {
    pub async fn execute<S: DmlSession>(
        &self,
        session: &mut S,
        command: &RunChunkedStatementCommand,
    ) -> Result<RunChunkedStatementResult> {
        let sentinel = extract_sentinel(&command.statement)?;

        let exists = session
            .table_exists(&command.database, &command.table)
            .await
            .context("table check error")?;
        if !exists {
            return Err(anyhow!(
                "Table {}.{} does not exist",
                command.database,
                command.table
            ));
        }

        if command.verbose {
            println!(
                "-- Checking for UNIQUE columns on {}.{}, by which to chunk",
                command.database, command.table
            );
        }
        let key = ChunkingKey::discover(
            session,
            &command.database,
            &command.table,
            command.forced_chunking_column.as_deref(),
        )
        .await
        .context("unique key discovery error")?
        .ok_or_else(|| {
            anyhow!(
                "No unique key found on {}.{}",
                command.database,
                command.table
            )
        })?;
        if command.verbose {
            if command.forced_chunking_column.is_some() {
                println!(
                    "-- Forced column {} of type {}",
                    key.column_list(),
                    key.kind
                );
            } else {
                println!("-- Found UNIQUE KEY: {}", key.column_list());
            }
        }

        let vars = RangeVariables::new(key.arity());
        let template = StatementTemplate::build(&command.statement, &sentinel, &key, &vars);

        if !command.skip_lock_tables {
            session
                .lock_table_read(&command.database, &command.table)
                .await
                .context("table lock error")?;
            if command.verbose {
                println!("-- Table locked READ");
            }
        }

        let result = self
            .run_range(session, command, &key, vars, &template)
            .await;

        if !command.skip_lock_tables {
            let unlocked = session.unlock_tables().await.context("table unlock error");
            if command.verbose {
                println!("-- Table unlocked");
            }
            // An unlock failure only matters when the run itself succeeded.
            if result.is_ok() {
                unlocked?;
            }
        }

        result
    }

    async fn run_range<S: DmlSession>(
        &self,
        session: &mut S,
        command: &RunChunkedStatementCommand,
        key: &ChunkingKey,
        vars: RangeVariables,
        template: &StatementTemplate,
    ) -> Result<RunChunkedStatementResult> {
        let range_found = initialize_range(
            session,
            key,
            &vars,
            &command.database,
            &command.table,
            command.start_with.as_deref(),
            command.end_with.as_deref(),
            command.verbose,
        )
        .await
        .context("range initialization error")?;

        if !range_found {
            return Ok(RunChunkedStatementResult::default());
        }

        let options = ChunkOptions {
            database: command.database.clone(),
            table: command.table.clone(),
            chunk_size: command.chunk_size,
            sleep_millis: command.sleep_millis,
            sleep_ratio: command.sleep_ratio,
            terminate_on_not_found: command.terminate_on_not_found,
            skip_retry_chunk: command.skip_retry_chunk,
            no_log_bin: command.no_log_bin,
            verbose: command.verbose,
        };
        let outcome = ChunkDriver::new(session, key, vars, &options)
            .run(template)
            .await
            .context("chunk execution error")?;

        Ok(RunChunkedStatementResult {
            range_found: true,
            chunks_executed: outcome.chunks_executed,
            rows_affected: outcome.rows_affected,
        })
    }
}
