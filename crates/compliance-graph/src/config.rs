//! Configuration for the compliance graph store
//!
//! Loaded from environment variables, with defaults suitable for a single
//! local instance.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GraphError, Result};

/// Marketplaces provisioned when `COMPLIANCE_MARKETPLACES` is unset
pub const DEFAULT_MARKETPLACES: &[&str] = &["de", "nl", "fr", "it", "es", "uk"];

#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// sqlx SQLite connection URL
    pub database_url: String,
    pub max_connections: u32,
    /// Upper bound on any single store operation, including pool acquisition
    pub op_timeout: Duration,
    /// Reference marketplace codes seeded at start-up
    pub marketplaces: Vec<String>,
}

impl GraphConfig {
    /// Configuration for a database file at `path`, created on first use
    pub fn sqlite_file(path: &Path) -> Self {
        Self {
            database_url: format!("sqlite:{}?mode=rwc", path.display()),
            ..Self::default()
        }
    }

    pub fn with_marketplaces(mut self, codes: &[&str]) -> Self {
        self.marketplaces = codes.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// Load configuration from environment variables
    ///
    /// Expected variables:
    /// - DATABASE_URL: sqlx SQLite URL (default: platform data dir)
    /// - COMPLIANCE_MAX_CONNECTIONS: pool size (default: 5)
    /// - COMPLIANCE_STORE_TIMEOUT_MS: per-operation timeout (default: 5000)
    /// - COMPLIANCE_MARKETPLACES: comma separated codes (default: de,nl,fr,it,es,uk)
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            let data_dir = dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("compliance-graph");
            std::fs::create_dir_all(&data_dir).ok();
            format!("sqlite:{}/compliance.db?mode=rwc", data_dir.display())
        });

        let max_connections = parse_env("COMPLIANCE_MAX_CONNECTIONS", 5u32)?;
        if max_connections == 0 {
            return Err(GraphError::validation(
                "COMPLIANCE_MAX_CONNECTIONS must be at least 1",
            ));
        }
        let timeout_ms = parse_env("COMPLIANCE_STORE_TIMEOUT_MS", 5000u64)?;

        let marketplaces = match std::env::var("COMPLIANCE_MARKETPLACES") {
            Ok(list) => parse_marketplaces(&list),
            Err(_) => DEFAULT_MARKETPLACES.iter().map(|c| c.to_string()).collect(),
        };

        Ok(Self {
            database_url,
            max_connections,
            op_timeout: Duration::from_millis(timeout_ms),
            marketplaces,
        })
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:compliance.db?mode=rwc".to_string(),
            max_connections: 5,
            op_timeout: Duration::from_secs(5),
            marketplaces: DEFAULT_MARKETPLACES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| GraphError::Validation(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

/// Split a comma separated list of marketplace codes, dropping blanks
pub fn parse_marketplaces(list: &str) -> Vec<String> {
    list.split(',')
        .map(|code| code.trim().to_lowercase())
        .filter(|code| !code.is_empty())
        .collect()
}

/// Platform-specific data directory
mod dirs {
    use std::path::PathBuf;

    pub fn data_dir() -> Option<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        }
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            None
        }
    }
}
