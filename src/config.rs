//! Configuration management
//!
//! Layered: YAML file, then `N8N_BRIDGE_`-prefixed environment variables
//! (`__` separates nesting levels), then the deployment-standard variable
//! names (`N8N_WEBHOOK_URL`, `APP_PASSWORD`, `AIRTABLE_*`, ...) as a
//! fallback for values the file leaves unset. Missing required values are
//! request-time failures, not startup failures.

use std::{env, path::Path};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before resolving configuration.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Login gate configuration
    pub auth: AuthConfig,
    /// Execution endpoint rate limiting
    pub rate_limit: RateLimitConfig,
    /// n8n upstream configuration
    pub n8n: N8nConfig,
    /// Airtable problem-report sink configuration
    pub airtable: AirtableConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Login gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared operator password. Unset means every login attempt is rejected.
    pub app_password: Option<String>,
    /// Session cookie name
    pub cookie_name: String,
    /// Session cookie lifetime in seconds
    pub session_ttl_secs: u64,
    /// Mark the session cookie `Secure` (HTTPS-only deployments)
    pub secure_cookies: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            app_password: None,
            cookie_name: "isAuthenticated".to_string(),
            session_ttl_secs: 86_400,
            secure_cookies: false,
        }
    }
}

/// Fixed-window rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per window per client key
    pub max_requests: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window_ms: 60_000,
        }
    }
}

/// n8n upstream configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct N8nConfig {
    /// Webhook URL of the customer-message workflow
    pub webhook_url: Option<String>,
    /// Value for the `x-n8n-api-key` header
    pub api_key: Option<String>,
    /// HTTP Basic user (sent only when the password is also set)
    pub basic_auth_user: Option<String>,
    /// HTTP Basic password
    pub basic_auth_password: Option<String>,
    /// Upstream call timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for N8nConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            api_key: None,
            basic_auth_user: None,
            basic_auth_password: None,
            timeout_ms: 30_000,
        }
    }
}

/// Airtable problem-report sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AirtableConfig {
    /// Personal access token
    pub api_key: Option<String>,
    /// Base identifier
    pub base_id: Option<String>,
    /// Table name or identifier
    pub table_name: Option<String>,
    /// API base URL (override for tests)
    pub api_base: String,
}

impl Default for AirtableConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_id: None,
            table_name: None,
            api_base: "https://api.airtable.com/v0".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from an optional YAML file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("N8N_BRIDGE_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Env files must land in the process environment before the
        // well-known variable names are consulted.
        config.load_env_files();
        config.apply_well_known_env();

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Fill values the file and prefixed env left unset from the
    /// deployment-standard variable names.
    fn apply_well_known_env(&mut self) {
        fill_from_env(&mut self.n8n.webhook_url, "N8N_WEBHOOK_URL");
        fill_from_env(&mut self.n8n.api_key, "N8N_API_KEY");
        fill_from_env(&mut self.n8n.basic_auth_user, "N8N_BASIC_AUTH_USER");
        fill_from_env(&mut self.n8n.basic_auth_password, "N8N_BASIC_AUTH_PASSWORD");
        fill_from_env(&mut self.auth.app_password, "APP_PASSWORD");
        fill_from_env(&mut self.airtable.api_key, "AIRTABLE_API_KEY");
        fill_from_env(&mut self.airtable.base_id, "AIRTABLE_BASE_ID");
        fill_from_env(&mut self.airtable.table_name, "AIRTABLE_TABLE_NAME");
    }
}

fn fill_from_env(slot: &mut Option<String>, var: &str) {
    if slot.is_none() {
        if let Ok(value) = env::var(var) {
            if !value.is_empty() {
                *slot = Some(value);
            }
        }
    }
}
