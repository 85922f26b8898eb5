//! Persistent benchmark score cache
//!
//! Stores the latest benchmark batch as JSON together with the hardware
//! fingerprint that produced it. The file is only trusted when the
//! fingerprint matches, it is younger than the validity window, and it
//! covers every runtime discovered on this run.

use crate::error::{CapsuleError, CapsuleResult};
use crate::hardware::HardwareProfile;
use crate::orchestration::benchmark::BenchmarkResult;
use crate::orchestration::discovery::Runtime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// How long a benchmark batch stays valid
pub const DEFAULT_VALIDITY: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// On-disk cache layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreCacheFile {
    /// Hardware that produced the results
    pub hardware: HardwareProfile,
    /// Results keyed by runtime name
    pub results: BTreeMap<String, BenchmarkResult>,
}

/// File-backed benchmark score store
pub struct ScoreCache {
    path: PathBuf,
    validity: Duration,
    disabled: bool,
    results: RwLock<BTreeMap<String, BenchmarkResult>>,
}

impl ScoreCache {
    /// Create a cache stored at `path` with the default 14-day window
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            validity: DEFAULT_VALIDITY,
            disabled: false,
            results: RwLock::new(BTreeMap::new()),
        }
    }

    /// Override the validity window
    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = validity;
        self
    }

    /// Disable benchmarking: the cache never reports itself stale
    pub fn with_benchmarking_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Cache file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether benchmarking has been opted out of
    pub fn benchmarking_disabled(&self) -> bool {
        self.disabled
    }

    /// Whether a fresh benchmark is needed for this host and runtime set.
    ///
    /// Unreadable or unparseable files count as stale, never as errors.
    pub async fn is_stale(&self, profile: &HardwareProfile, runtimes: &[Runtime]) -> bool {
        if self.disabled {
            return false;
        }

        match self.staleness_reason(profile, runtimes).await {
            Some(reason) => {
                debug!("Score cache {} is stale: {}", self.path.display(), reason);
                true
            }
            None => false,
        }
    }

    async fn staleness_reason(
        &self,
        profile: &HardwareProfile,
        runtimes: &[Runtime],
    ) -> Option<String> {
        let metadata = match fs::metadata(&self.path).await {
            Ok(m) => m,
            Err(_) => return Some("no cache file".to_string()),
        };

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .unwrap_or(Duration::ZERO);
        if age > self.validity {
            return Some(format!("{} days old", age.as_secs() / 86_400));
        }

        let file = match self.read_file().await {
            Ok(f) => f,
            Err(e) => return Some(format!("unreadable ({})", e)),
        };

        if !file.hardware.matches(profile) {
            return Some(format!(
                "hardware changed ({} -> {}/{})",
                file.hardware, profile.os, profile.arch
            ));
        }

        runtimes
            .iter()
            .find(|rt| !file.results.contains_key(&rt.name))
            .map(|rt| format!("no result for {}", rt.name))
    }

    /// Read the cache file into memory and return its results.
    ///
    /// A missing file yields an empty map.
    pub async fn load(&self) -> CapsuleResult<BTreeMap<String, BenchmarkResult>> {
        let results = match self.read_file().await {
            Ok(file) => file.results,
            Err(CapsuleError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };

        *self.results.write().await = results.clone();
        Ok(results)
    }

    /// Results currently held in memory
    pub async fn cached(&self) -> BTreeMap<String, BenchmarkResult> {
        self.results.read().await.clone()
    }

    /// Replace the in-memory results without touching the file
    pub async fn remember(&self, results: BTreeMap<String, BenchmarkResult>) {
        *self.results.write().await = results;
    }

    /// Persist a full batch with the current fingerprint, replacing the file.
    ///
    /// Written to a uniquely named sibling temp file and renamed into place,
    /// so readers see either the old or the new batch. Concurrent writers:
    /// last one wins.
    pub async fn save(
        &self,
        profile: &HardwareProfile,
        results: &[BenchmarkResult],
    ) -> CapsuleResult<()> {
        let file = ScoreCacheFile {
            hardware: profile.clone(),
            results: results
                .iter()
                .map(|r| (r.runtime_name.clone(), r.clone()))
                .collect(),
        };
        let content = serde_json::to_string_pretty(&file)?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, content.as_bytes()))
            .await
            .map_err(|e| CapsuleError::Internal(format!("score cache write task failed: {}", e)))??;

        self.remember(file.results).await;
        info!(
            "Saved {} benchmark result(s) to {}",
            results.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn read_file(&self) -> CapsuleResult<ScoreCacheFile> {
        let content = fs::read_to_string(&self.path).await.map_err(|e| {
            CapsuleError::io(format!("reading score cache {}", self.path.display()), e)
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Temp file in the target directory, synced, then persisted over `path`.
/// The temp file is removed if anything fails before the rename.
fn write_atomic(path: &Path, content: &[u8]) -> CapsuleResult<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| {
        CapsuleError::io(format!("creating directory {}", parent.display()), e)
    })?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| {
        CapsuleError::io(format!("creating temp file in {}", parent.display()), e)
    })?;
    tmp.write_all(content)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| CapsuleError::io(format!("writing {}", tmp.path().display()), e))?;
    tmp.persist(path)
        .map_err(|e| CapsuleError::io(format!("replacing {}", path.display()), e.error))?;
    Ok(())
}
