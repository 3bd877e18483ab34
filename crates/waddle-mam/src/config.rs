//! Archive module configuration.
//!
//! Settings are read from an optional TOML file and then overridden by
//! environment variables.
//!
//! # Environment Variables
//!
//! - `WADDLE_MAM_QUEUE_SIZE`: Archive capacity per account. Default: `1000`
//! - `WADDLE_MAM_ERASE_BEST_EFFORT`: Do not block account deletion on archive
//!   erasure failures. Default: `false`
//! - `WADDLE_MAM_DB_PATH`: libSQL database file. Default: in-memory
//! - `WADDLE_MAM_DOMAINS`: Comma separated list of locally hosted domains.
//!   Default: `localhost`
//!
//! # Example
//!
//! ```toml
//! queue_size = 5000
//! database_path = "/var/lib/waddle/mam.db"
//! local_domains = ["waddle.social"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::MamError;

/// Default archive capacity per account.
pub const DEFAULT_QUEUE_SIZE: usize = 1000;

/// Archive module configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MamConfig {
    /// Maximum number of archived messages per account.
    /// When the limit is reached, the oldest message is purged to make room.
    pub queue_size: usize,
    /// Log archive erasure failures instead of failing account deletion
    pub erase_best_effort: bool,
    /// libSQL database file (in-memory when unset)
    pub database_path: Option<PathBuf>,
    /// Domains whose accounts are archived by this server
    pub local_domains: Vec<String>,
}

impl Default for MamConfig {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
            erase_best_effort: false,
            database_path: None,
            local_domains: vec!["localhost".to_string()],
        }
    }
}

impl MamConfig {
    /// Load configuration from an optional TOML file plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, MamError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self, MamError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            MamError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&contents)
            .map_err(|e| MamError::config(format!("Invalid {}: {}", path.display(), e)))
    }

    /// Apply environment overrides through the given lookup.
    fn apply_env<F>(&mut self, lookup: F) -> Result<(), MamError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("WADDLE_MAM_QUEUE_SIZE") {
            self.queue_size = value.trim().parse().map_err(|_| {
                MamError::config(format!("WADDLE_MAM_QUEUE_SIZE is not a number: {}", value))
            })?;
        }

        if let Some(value) = lookup("WADDLE_MAM_ERASE_BEST_EFFORT") {
            self.erase_best_effort = matches!(
                value.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }

        if let Some(value) = lookup("WADDLE_MAM_DB_PATH") {
            self.database_path = Some(PathBuf::from(value));
        }

        if let Some(value) = lookup("WADDLE_MAM_DOMAINS") {
            self.local_domains = value
                .split(',')
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect();
        }

        Ok(())
    }

    /// Reject settings the archive cannot run with.
    pub fn validate(&self) -> Result<(), MamError> {
        if self.queue_size == 0 {
            return Err(MamError::config("queue_size must be at least 1"));
        }
        if self.local_domains.is_empty() {
            return Err(MamError::config("at least one local domain is required"));
        }
        Ok(())
    }

    /// Log the effective configuration.
    pub fn log_config(&self) {
        info!("MAM queue size: {}", self.queue_size);
        info!("MAM local domains: {}", self.local_domains.join(", "));
        match &self.database_path {
            Some(path) => info!("MAM database: {}", path.display()),
            None => info!("MAM database: in-memory"),
        }
        if self.erase_best_effort {
            info!("MAM archive erasure: best-effort");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = MamConfig::default();
        assert_eq!(config.queue_size, 1000);
        assert!(!config.erase_best_effort);
        assert!(config.database_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = MamConfig::default();
        config
            .apply_env(lookup(&[
                ("WADDLE_MAM_QUEUE_SIZE", "25"),
                ("WADDLE_MAM_ERASE_BEST_EFFORT", "true"),
                ("WADDLE_MAM_DOMAINS", "waddle.social, muc.waddle.social"),
            ]))
            .unwrap();

        assert_eq!(config.queue_size, 25);
        assert!(config.erase_best_effort);
        assert_eq!(
            config.local_domains,
            vec!["waddle.social".to_string(), "muc.waddle.social".to_string()]
        );
    }

    #[test]
    fn test_invalid_queue_size() {
        let mut config = MamConfig::default();
        let err = config
            .apply_env(lookup(&[("WADDLE_MAM_QUEUE_SIZE", "lots")]))
            .unwrap_err();
        assert!(matches!(err, MamError::Config(_)));

        config.queue_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "queue_size = 3\nlocal_domains = [\"capulet.lit\"]\ndatabase_path = \"/tmp/mam.db\""
        )
        .unwrap();

        let config = MamConfig::from_file(file.path()).unwrap();
        assert_eq!(config.queue_size, 3);
        assert_eq!(config.local_domains, vec!["capulet.lit".to_string()]);
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/mam.db")));
        assert!(!config.erase_best_effort);
    }
}
