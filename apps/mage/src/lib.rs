//! # mage
//!
//! Command-line front end for `mage-core`: configuration, the demo model
//! and the CLI commands. The binary in `main.rs` only wires logging.

pub mod cli;
pub mod config;
pub mod demo;
