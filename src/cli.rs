//! CLI arguments and subcommands for hostpulse.
//!
//! This module defines the command-line interface structure using the clap
//! library, including all flags, options, and subcommands.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "hostpulse",
    about = "Live host telemetry streaming server with process control",
    long_about = "Live host telemetry streaming server with process control.\n\n\
                  Streams CPU, memory, disk and process telemetry to connected \
                  dashboard clients over WebSocket, and drives graceful/forced \
                  termination of host processes on request.",
    version,
    propagate_version = true
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// HTTP listen port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind to specific interface/IP
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Metrics snapshot cache TTL in milliseconds
    #[arg(long)]
    pub metrics_ttl_ms: Option<u64>,

    /// Process list cache TTL in milliseconds
    #[arg(long)]
    pub processes_ttl_ms: Option<u64>,

    /// Per-session push interval in milliseconds
    #[arg(long)]
    pub push_interval_ms: Option<u64>,

    /// Grace period before forced termination, in milliseconds
    #[arg(long)]
    pub grace_period_ms: Option<u64>,

    /// Number of processes delivered per view
    #[arg(long)]
    pub top_n: Option<usize>,

    /// Process view mode: "top" or "rotating"
    #[arg(long)]
    pub process_view: Option<String>,

    /// Disable the /health endpoint
    #[arg(long)]
    pub disable_health: bool,
}

/// Subcommands for additional functionality
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate provider access and signal capability
    Check {
        /// Check telemetry queries
        #[arg(long)]
        provider: bool,

        /// Check signal delivery capability
        #[arg(long)]
        signals: bool,

        /// Check everything
        #[arg(long)]
        all: bool,
    },

    /// Generate configuration files
    Config {
        /// Output file path
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "yaml")]
        format: ConfigFormat,

        /// Include comments and examples
        #[arg(long)]
        commented: bool,
    },

    /// Run sampling passes and print a summary
    Test {
        /// Number of test iterations
        #[arg(short = 'n', long, default_value_t = 1)]
        iterations: usize,

        /// Show the ranked process list per iteration
        #[arg(long)]
        verbose: bool,
    },
}
