//! n8n-bridge library
//!
//! Operator console gateway for a single n8n customer-message workflow:
//!
//! - **Execution pipeline**: rate limiting, multi-shape request
//!   normalization, a timeout-bounded upstream call with one retry on 5xx,
//!   result normalization, and a uniform response envelope.
//! - **Problem reports**: a side-channel flagging bad results into an
//!   Airtable table, with one self-healing retry on schema drift.
//! - **Login gate**: a shared password exchanged for an HTTP-only session
//!   cookie; unauthenticated page navigations redirect to the login page.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod airtable;
pub mod cli;
pub mod config;
pub mod envelope;
pub mod error;
pub mod server;
pub mod workflow;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
