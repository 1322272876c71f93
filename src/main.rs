#![cfg(not(tarpaulin_include))]

use materialenlijst::app;
use materialenlijst::config::AppConfig;

/// Main entry point for the web application
///
/// Initializes logging from `RUST_LOG` (default `info`), reads the
/// `MATERIALEN_*` environment settings and serves the hierarchy builder.
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env();
    app::run(config).await
}
