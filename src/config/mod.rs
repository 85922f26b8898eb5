//! Configuration management for Capsule

pub mod schema;

pub use schema::Config;

use crate::error::{CapsuleError, CapsuleResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("capsule")
            .join("config.toml")
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("capsule")
    }

    /// Default score cache file
    pub fn score_cache_path() -> PathBuf {
        Self::state_dir().join("benchmarks.json")
    }

    /// Throwaway build contexts for build+exec benchmarks
    pub fn builds_dir() -> PathBuf {
        Self::state_dir().join("builds")
    }

    /// Load configuration, falling back to defaults if the file is missing.
    ///
    /// Environment overrides are applied on top of the file.
    pub async fn load(&self) -> CapsuleResult<Config> {
        let mut config = if self.config_path.exists() {
            self.load_from_file(&self.config_path).await?
        } else {
            debug!("Config file not found, using defaults");
            Config::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> CapsuleResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| CapsuleError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| CapsuleError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> CapsuleResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            CapsuleError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> CapsuleResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CapsuleError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Ensure the state directories exist
    pub async fn ensure_state_dirs() -> CapsuleResult<()> {
        for dir in [Self::state_dir(), Self::builds_dir()] {
            fs::create_dir_all(&dir).await.map_err(|e| {
                CapsuleError::io(format!("creating directory {}", dir.display()), e)
            })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::{ENV_BENCHMARK_IMAGE, ENV_NO_BENCHMARK};
    use serial_test::serial;
    use tempfile::TempDir;

    #[tokio::test]
    #[serial]
    async fn load_default_when_missing() {
        std::env::remove_var(ENV_NO_BENCHMARK);
        std::env::remove_var(ENV_BENCHMARK_IMAGE);
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.toml");
        let manager = ConfigManager::with_path(path);

        let config = manager.load().await.unwrap();
        assert!(config.benchmark.enabled);
        assert_eq!(config.capsule.ttl_secs, 300);
    }

    #[tokio::test]
    #[serial]
    async fn save_and_load_roundtrip() {
        std::env::remove_var(ENV_NO_BENCHMARK);
        std::env::remove_var(ENV_BENCHMARK_IMAGE);
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        let manager = ConfigManager::with_path(path);

        let mut config = Config::default();
        config.benchmark.image = "busybox:latest".to_string();

        manager.save(&config).await.unwrap();
        let loaded = manager.load().await.unwrap();

        assert_eq!(loaded.benchmark.image, "busybox:latest");
    }

    #[tokio::test]
    #[serial]
    async fn env_overrides_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[benchmark]\nenabled = true\n").unwrap();

        std::env::set_var(ENV_NO_BENCHMARK, "1");
        let config = ConfigManager::with_path(path).load().await.unwrap();
        std::env::remove_var(ENV_NO_BENCHMARK);

        assert!(!config.benchmark.enabled);
    }

    #[tokio::test]
    async fn invalid_file_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[benchmark\n").unwrap();

        let err = ConfigManager::with_path(path.clone()).load().await.unwrap_err();
        assert!(matches!(err, CapsuleError::ConfigInvalid { path: p, .. } if p == path));
    }
}
