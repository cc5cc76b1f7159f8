pub mod run_chunked_statement;
