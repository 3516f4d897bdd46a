//! # Mage CLI Module
//!
//! This module implements the CLI interface for Mage.
//!
//! ## Available Commands
//!
//! - `init` - Initialize a new database
//! - `create` - Create a person together with their home address
//! - `show` - Load a person by id
//! - `update` - Change a person and rewrite their address
//! - `status` - Show entity counts per kind
//! - `decode-key` - Decode an encoded entity key

mod commands;

use crate::config::{Backend, Config, DEFAULT_CONFIG_FILE};
use clap::{Parser, Subcommand};
use mage_core::MageError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Mage - typed records on a transactional document store
///
/// Records and the records they own are written in one transaction and
/// read back through a write-through cache.
#[derive(Parser, Debug)]
#[command(name = "mage")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the config file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Path to the database (overrides the config file)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend (overrides the config file)
    #[arg(short = 'B', long, global = true, value_enum)]
    pub backend: Option<Backend>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Create a person and their home address
    Create {
        #[arg(long)]
        name: String,

        #[arg(long, default_value = "")]
        email: String,

        #[arg(long, default_value = "0")]
        age: i64,

        #[arg(long, default_value = "")]
        street: String,

        #[arg(long, default_value = "")]
        city: String,

        /// Session token (never stored)
        #[arg(long)]
        token: Option<String>,
    },

    /// Show a person by id
    Show {
        #[arg(short, long)]
        id: i64,
    },

    /// Update a person; the address is rewritten even if unchanged
    Update {
        #[arg(short, long)]
        id: i64,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        age: Option<i64>,

        #[arg(long)]
        street: Option<String>,

        #[arg(long)]
        city: Option<String>,
    },

    /// Show entity counts per kind
    Status,

    /// Decode an encoded entity key
    DecodeKey {
        #[arg(short, long)]
        key: String,
    },
}

// =============================================================================
// SETTINGS
// =============================================================================

/// Effective settings after merging CLI flags over the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database: PathBuf,
    pub backend: Backend,
    pub cache_capacity: usize,
    pub json_mode: bool,
}

impl Settings {
    pub fn resolve(cli: &Cli, config: &Config) -> Self {
        Self {
            database: cli
                .database
                .clone()
                .unwrap_or_else(|| config.database.clone()),
            backend: cli.backend.unwrap_or(config.backend),
            cache_capacity: config.cache.capacity,
            json_mode: cli.json_mode,
        }
    }
}

impl Cli {
    /// Tracing filter: `--verbose` / `--quiet`, then `RUST_LOG` (as `env`),
    /// then the config file.
    pub fn log_filter(&self, config: &Config, env: Option<&str>) -> String {
        if self.verbose {
            "mage=debug,mage_core=debug".to_string()
        } else if self.quiet {
            "mage=warn,mage_core=warn".to_string()
        } else {
            config.log_filter(env)
        }
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli, config: &Config) -> Result<(), MageError> {
    let settings = Settings::resolve(&cli, config);

    match cli.command {
        Some(Commands::Init { force }) => cmd_init(&settings, force),
        Some(Commands::Create {
            name,
            email,
            age,
            street,
            city,
            token,
        }) => cmd_create(
            &settings,
            NewPerson {
                name,
                email,
                age,
                street,
                city,
                token,
            },
        ),
        Some(Commands::Show { id }) => cmd_show(&settings, id),
        Some(Commands::Update {
            id,
            name,
            email,
            age,
            street,
            city,
        }) => cmd_update(
            &settings,
            id,
            PersonChanges {
                name,
                email,
                age,
                street,
                city,
            },
        ),
        Some(Commands::Status) => cmd_status(&settings),
        Some(Commands::DecodeKey { key }) => cmd_decode_key(&settings, &key),
        None => {
            // No subcommand - show status by default
            cmd_status(&settings)
        }
    }
}
