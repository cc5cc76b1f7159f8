pub mod chunk_driver;
pub mod chunk_range;
pub mod chunk_template;
pub mod chunking_key;
pub mod session;
pub mod session_vars;

#[cfg(test)]
pub mod test_support;
