/// Everything the engine needs from its caller: the resolved target table,
/// the statement template and the chunking knobs.
#[derive(Debug, Clone)]
pub struct RunChunkedStatementCommand {
    pub database: String,
    pub table: String,
    /// The user's statement, still carrying the `GO_CHUNK(...)` sentinel.
    pub statement: String,
    pub chunk_size: u64,
    pub start_with: Option<String>,
    pub end_with: Option<String>,
    pub forced_chunking_column: Option<String>,
    pub skip_lock_tables: bool,
    pub no_log_bin: bool,
    pub sleep_millis: u64,
    pub sleep_ratio: f64,
    pub terminate_on_not_found: bool,
    pub skip_retry_chunk: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunChunkedStatementResult {
    /// False when the table was empty and nothing was executed.
    pub range_found: bool,
    pub chunks_executed: u64,
    pub rows_affected: u64,
}
