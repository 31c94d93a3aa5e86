//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "openscale", version, about = "Batch-filling scale controller")]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE", default_value = "etc/openscale.toml")]
    pub config: PathBuf,

    /// Log and print status as JSON lines
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace); RUST_LOG wins when set
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the controller with an operator console on stdin
    Run {
        /// Development mode: enables weight and sensor injection
        #[arg(long, action = ArgAction::SetTrue)]
        dev: bool,
        /// Ignore stdin and run until Ctrl-C
        #[arg(long, action = ArgAction::SetTrue)]
        no_console: bool,
    },
    /// Connect once, read one indicator state and print it
    SelfCheck {
        /// How long to wait for the field-bus connection
        #[arg(long, value_name = "MS", default_value_t = 5000)]
        timeout_ms: u64,
    },
    /// Print the stored analytics tree
    Analytics {
        /// Fold events from before today first
        #[arg(long, action = ArgAction::SetTrue)]
        fold: bool,
    },
}
