use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;
use dialoguer::{Password, theme::ColorfulTheme};

use crate::application::commands::RunChunkedStatementCommand;
use crate::domain::chunk_template::{extract_sentinel, validate_statement};
use crate::infrastructure::mysql_session::MySqlSettings;

const DEFAULT_CHUNK_SIZE: i64 = 1000;

#[derive(Debug, Parser)]
#[command(
    name = "sql-chunk-runner",
    version,
    about = "Safely execute a large UPDATE/DELETE/INSERT..SELECT by splitting it into unique-key range chunks"
)]
struct CliArgs {
    /// MySQL user
    #[arg(long, short = 'u')]
    user: Option<String>,
    /// MySQL host
    #[arg(long, short = 'H')]
    host: Option<String>,
    /// MySQL password
    #[arg(long, short = 'p')]
    password: Option<String>,
    /// Prompt for the password instead of passing it on the command line
    #[arg(long)]
    ask_pass: bool,
    /// TCP/IP port
    #[arg(long, short = 'P')]
    port: Option<u16>,
    /// Unix socket, used when the host is localhost
    #[arg(long, short = 'S')]
    socket: Option<String>,
    /// Read connection values from a MySQL options file
    #[arg(long, short = 'f')]
    defaults_file: Option<PathBuf>,
    /// Default schema for the target table when the sentinel omits it
    #[arg(long, short = 'd')]
    database: Option<String>,
    /// Statement to execute, containing GO_CHUNK(table_name)
    #[arg(long, short = 'e')]
    execute: Option<String>,
    /// Rows per chunk; 0 means all rows in one chunk
    #[arg(long, short = 'c', default_value_t = DEFAULT_CHUNK_SIZE, allow_hyphen_values = true)]
    chunk_size: i64,
    /// Seed the lower bound: an integer literal or a scalar sub-statement
    /// whose result column is aliased start_with
    #[arg(long)]
    start_with: Option<String>,
    /// Seed the upper bound: an integer literal or a scalar sub-statement
    /// whose result column is aliased end_with
    #[arg(long)]
    end_with: Option<String>,
    /// Stop as soon as a chunk affects zero rows
    #[arg(long)]
    terminate_on_not_found: bool,
    /// Override key discovery: `c`, `c:kind` or `c1,c2,...`
    #[arg(long)]
    force_chunking_column: Option<String>,
    /// Do not take a table read lock for the duration of the run
    #[arg(long)]
    skip_lock_tables: bool,
    /// Do not retry a failed chunk statement
    #[arg(long)]
    skip_retry_chunk: bool,
    /// Disable binary logging for this session
    #[arg(long)]
    no_log_bin: bool,
    /// Milliseconds to sleep between chunks
    #[arg(long, default_value_t = 0)]
    sleep: u64,
    /// Additional sleep after each chunk as a fraction of its elapsed time
    #[arg(long, default_value_t = 0.0)]
    sleep_ratio: f64,
    /// Print progress on each chunk
    #[arg(long, short = 'v')]
    verbose: bool,
}

pub fn collect_run_command() -> Result<(MySqlSettings, RunChunkedStatementCommand)> {
    let mut args = CliArgs::parse();
    if args.ask_pass {
        args.password = Some(prompt_password()?);
    }
    build_from_args(args)
}

fn build_from_args(args: CliArgs) -> Result<(MySqlSettings, RunChunkedStatementCommand)> {
    let statement = args
        .execute
        .ok_or_else(|| anyhow!("--execute is required"))?;
    let sentinel = extract_sentinel(&statement)?;
    validate_statement(&statement)?;
    if args.chunk_size < 0 {
        return Err(anyhow!("--chunk-size must not be negative"));
    }

    // A schema written into the sentinel wins over --database.
    let database = sentinel
        .database
        .clone()
        .or(args.database)
        .ok_or_else(|| anyhow!("No database specified"))?;

    let settings = MySqlSettings {
        user: args.user,
        password: args.password,
        host: args.host,
        port: args.port,
        socket: args.socket,
        database: database.clone(),
        defaults_file: args.defaults_file,
    };

    let command = RunChunkedStatementCommand {
        database,
        table: sentinel.table,
        statement,
        chunk_size: args.chunk_size as u64,
        start_with: args.start_with,
        end_with: args.end_with,
        forced_chunking_column: args.force_chunking_column,
        skip_lock_tables: args.skip_lock_tables,
        no_log_bin: args.no_log_bin,
        sleep_millis: args.sleep,
        sleep_ratio: args.sleep_ratio,
        terminate_on_not_found: args.terminate_on_not_found,
        skip_retry_chunk: args.skip_retry_chunk,
        verbose: args.verbose,
    };

    Ok((settings, command))
}

fn prompt_password() -> Result<String> {
    let password = Password::with_theme(&ColorfulTheme::default())
        .with_prompt("MySQL password")
        .allow_empty_password(true)
        .interact()?;
    Ok(password)
}
