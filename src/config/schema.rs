//! Configuration schema for Capsule
//!
//! Configuration is stored at `~/.config/capsule/config.toml`

use crate::orchestration::benchmark::DEFAULT_BENCHMARK_IMAGE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Environment variable that disables benchmarking when truthy
pub const ENV_NO_BENCHMARK: &str = "CAPSULE_NO_BENCHMARK";

/// Environment variable overriding the benchmark image
pub const ENV_BENCHMARK_IMAGE: &str = "CAPSULE_BENCHMARK_IMAGE";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Benchmark and score cache settings
    pub benchmark: BenchmarkConfig,

    /// Capsule image cache settings
    pub capsule: CapsuleConfig,
}

impl Config {
    /// Apply environment overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides using a custom lookup
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup(ENV_NO_BENCHMARK) {
            if is_truthy(&value) {
                debug!("{} set, benchmarking disabled", ENV_NO_BENCHMARK);
                self.benchmark.enabled = false;
            }
        }

        if let Some(image) = lookup(ENV_BENCHMARK_IMAGE) {
            let image = image.trim();
            if !image.is_empty() {
                debug!("Benchmark image overridden to {}", image);
                self.benchmark.image = image.to_string();
            }
        }
    }
}

/// Anything except empty, "0" and "false" (case-insensitive)
pub fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false"))
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Benchmark configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Allow benchmarking (false behaves like CAPSULE_NO_BENCHMARK)
    pub enabled: bool,

    /// Image used for trials
    pub image: String,

    /// Include an image build in automatic benchmarks
    pub include_build: bool,

    /// Days before cached scores are re-measured
    pub validity_days: u64,

    /// Score cache location (default: state dir)
    pub cache_path: Option<PathBuf>,

    /// Seconds to wait for another process's benchmark to finish
    pub lock_timeout_secs: u64,
}

impl BenchmarkConfig {
    /// Score validity window
    pub fn validity(&self) -> Duration {
        Duration::from_secs(self.validity_days.saturating_mul(24 * 60 * 60))
    }

    /// Cross-process lock timeout
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            image: DEFAULT_BENCHMARK_IMAGE.to_string(),
            include_build: false,
            validity_days: 14,
            cache_path: None,
            lock_timeout_secs: 120,
        }
    }
}

/// Capsule cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapsuleConfig {
    /// Existence cache TTL in seconds
    pub ttl_secs: u64,

    /// Repository prefix identifying capsule images
    pub prefix: String,

    /// Default age for `capsule clear --older-than`
    pub max_age_days: u32,
}

impl CapsuleConfig {
    /// Existence cache TTL
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CapsuleConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            prefix: "capsule-".to_string(),
            max_age_days: 30,
        }
    }
}
