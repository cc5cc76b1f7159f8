use std::process::ExitCode;

use anyhow::Result;
use console::style;

use crate::application::use_cases::run_chunked_statement::RunChunkedStatementUseCase;
use crate::infrastructure::mysql_session::MySqlSession;
use crate::interfaces::cli;

mod application;
mod domain;
mod infrastructure;
mod interfaces;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{} {error:#}", style("Error:").red().bold());
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let (settings, command) = cli::collect_run_command()?;

    let mut session = MySqlSession::connect(settings).await?;
    let outcome = RunChunkedStatementUseCase
        .execute(&mut session, &command)
        .await;
    let _ = session.close().await;
    let result = outcome?;

    if !result.range_found {
        println!("No range to process");
        return Ok(());
    }

    println!(
        "{}",
        style(format!(
            "Done: {} rows affected across {} chunks",
            result.rows_affected, result.chunks_executed
        ))
        .green()
    );
    Ok(())
}
