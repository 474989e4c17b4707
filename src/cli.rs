//! Command-line interface for meterread
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Read utility meters from a camera
#[derive(Parser, Debug)]
#[command(
    name = "meterread",
    version,
    about = "Read utility meter displays from a camera"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse an interval string.
///
/// Supports any duration format accepted by `humantime`: bare numbers (seconds),
/// single-unit (`30s`, `5m`, `2h`), and compound (`1h30m`, `2m30s`).
fn parse_interval(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Bare number → seconds
    let interval = match s.parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => humantime::parse_duration(s).map_err(|e| e.to_string())?,
    };
    if interval.is_zero() {
        return Err("interval must be greater than zero".to_string());
    }
    Ok(interval)
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture once and print the reading
    RunOnce {
        /// Also write the reading to this JSON file
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Save raw and processed images to this directory
        #[arg(long, value_name = "DIR")]
        save_debug: Option<PathBuf>,

        /// Publish over MQTT regardless of the configured sink
        #[arg(long)]
        mqtt: bool,
    },

    /// Capture periodically until stopped
    RunLoop {
        /// Time between readings (default: 60s). Examples: 30, 90s, 5m, 1h
        #[arg(long, value_name = "DURATION", default_value = "60", value_parser = parse_interval)]
        interval: Duration,

        /// Write one JSON snapshot per reading into this directory
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Save raw and processed images to this directory
        #[arg(long, value_name = "DIR")]
        save_debug: Option<PathBuf>,

        /// Publish over MQTT regardless of the configured sink
        #[arg(long)]
        mqtt: bool,
    },

    /// Check external tools
    Check,

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the effective configuration (file + environment) as TOML
    Show,
    /// Print the default configuration file path
    Path,
}
