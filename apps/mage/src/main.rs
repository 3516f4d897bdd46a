//! # Mage
//!
//! The command-line binary for the Mage object-to-document mapper.
//!
//! ## Usage
//!
//! ```bash
//! mage init
//! mage create --name Ada --email ada@example.com --age 36 --street "12 Analytical Row" --city London
//! mage show --id 1
//! mage update --id 1 --city Paris
//! mage status --json-mode
//! ```
//!
//! ## Exit Codes
//!
//! - `0`: success
//! - `1`: the command failed
//! - `2`: schema defect (a record type declares a reference it cannot expose)

use clap::Parser;
use mage::cli;
use mage::config::{Config, LogFormat};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    // MAGE_LOG_FORMAT=json enables machine-parseable output.
    let log_format = config.log_format(std::env::var("MAGE_LOG_FORMAT").ok().as_deref());
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = tracing_subscriber::EnvFilter::try_new(cli.log_filter(&config, rust_log.as_deref()))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(mage::config::DEFAULT_LOG_FILTER));

    match log_format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if let Err(e) = cli::execute(cli, &config) {
        tracing::error!("Error: {}", e);
        if e.is_fatal() {
            std::process::exit(2);
        }
        std::process::exit(1);
    }
}
