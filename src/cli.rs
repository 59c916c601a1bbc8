//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// mTLS ambassador for the Mender device API
#[derive(Parser, Debug)]
#[command(name = "mtls-ambassador")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML); `config.yaml` is used if present
    #[arg(short, long, env = "MTLS_AMBASSADOR_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Listen address, overrides `listen` from the config
    #[arg(short, long, env = "MTLS_AMBASSADOR_LISTEN")]
    pub listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "MTLS_AMBASSADOR_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "MTLS_AMBASSADOR_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the ambassador (default)
    Serve,
}
