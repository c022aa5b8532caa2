//! CLI commands module
//!
//! Contains all CLI command implementations.

pub mod config;
pub mod history;
pub mod status;
pub mod watch;

use crate::output::OutputFormat;
use tally_core::AppConfig;

/// Shared context for all commands
pub struct Context {
    pub config: AppConfig,
    pub format: OutputFormat,
    pub quiet: bool,
}
