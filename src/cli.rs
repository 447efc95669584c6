//! Command-line interface

use std::path::PathBuf;

use clap::Parser;

/// Operator console gateway for an n8n customer-message workflow
#[derive(Parser, Debug)]
#[command(name = "n8n-bridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "N8N_BRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "N8N_BRIDGE_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "N8N_BRIDGE_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "N8N_BRIDGE_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "N8N_BRIDGE_LOG_FORMAT")]
    pub log_format: Option<String>,
}
