use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;

use proxify_core::quorum::{DEFAULT_APPROVAL_THRESHOLD, DEFAULT_REJECTION_THRESHOLD};
use proxify_core::QuorumPolicy;

/// Name of the SQLite file inside `state_dir`.
pub const DATABASE_FILE: &str = "proxify-state.db";

/// Where moderation state is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    /// Lost on restart; for local runs and demos.
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    pub store_backend: StoreBackend,
    pub quorum: QuorumPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unset and empty are the same.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

        let port = var("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let state_dir = var("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let store_backend = match var("STORE_BACKEND").as_deref().map(str::trim) {
            None | Some("sqlite") => StoreBackend::Sqlite,
            Some("memory") => StoreBackend::Memory,
            Some(other) => bail!("STORE_BACKEND must be 'sqlite' or 'memory', got '{}'", other),
        };

        let approval_threshold = var("APPROVAL_QUORUM")
            .map(|v| v.trim().parse::<u32>())
            .transpose()
            .context("APPROVAL_QUORUM must be a valid number")?
            .unwrap_or(DEFAULT_APPROVAL_THRESHOLD);

        let rejection_threshold = var("REJECTION_QUORUM")
            .map(|v| v.trim().parse::<u32>())
            .transpose()
            .context("REJECTION_QUORUM must be a valid number")?
            .unwrap_or(DEFAULT_REJECTION_THRESHOLD);

        let quorum = QuorumPolicy::new(approval_threshold, rejection_threshold)
            .map_err(anyhow::Error::msg)
            .context("Invalid quorum configuration")?;

        Ok(Config {
            port,
            state_dir,
            store_backend,
            quorum,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.state_dir.join(DATABASE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.state_dir, PathBuf::from("."));
        assert_eq!(config.store_backend, StoreBackend::Sqlite);
        assert_eq!(config.quorum, QuorumPolicy::default());
        assert_eq!(config.database_path(), PathBuf::from("./proxify-state.db"));
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("STATE_DIR", "/var/lib/proxify"),
            ("STORE_BACKEND", "memory"),
            ("APPROVAL_QUORUM", "3"),
            ("REJECTION_QUORUM", "5"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.quorum, QuorumPolicy::new(3, 5).unwrap());
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/proxify/proxify-state.db")
        );
    }

    #[test]
    fn test_zero_threshold_is_refused() {
        assert!(config_from(&[("APPROVAL_QUORUM", "0")]).is_err());
        assert!(config_from(&[("REJECTION_QUORUM", "0")]).is_err());
    }

    #[test]
    fn test_garbage_values_are_refused() {
        assert!(config_from(&[("PORT", "eighty")]).is_err());
        assert!(config_from(&[("APPROVAL_QUORUM", "-1")]).is_err());
        assert!(config_from(&[("STORE_BACKEND", "postgres")]).is_err());
    }

    #[test]
    fn test_empty_values_fall_back_to_defaults() {
        let config = config_from(&[("PORT", ""), ("STORE_BACKEND", "  ")]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.store_backend, StoreBackend::Sqlite);
    }
}
