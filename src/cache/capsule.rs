//! Short-lived existence cache for capsule images
//!
//! Answers "is this image built?" without shelling out on every call. Both
//! positive and negative answers are remembered for the TTL; callers that
//! build or remove an image invalidate its entry explicitly.

use crate::error::{CapsuleError, CapsuleResult};
use crate::exec::{display_command, CommandOutput, CommandRunner};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default existence TTL
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Remembered existence check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapsuleCacheEntry {
    pub tag: String,
    pub exists: bool,
    pub checked_at: Instant,
}

/// Image metadata from `image inspect`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageDetails {
    pub tag: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub architecture: String,
    pub repo_digests: Vec<String>,
}

/// Subset of the inspect JSON we read
#[derive(Debug, Deserialize)]
struct InspectEntry {
    #[serde(rename = "Created")]
    created: DateTime<Utc>,
    #[serde(rename = "Size", default)]
    size: u64,
    #[serde(rename = "Architecture", default)]
    architecture: String,
    #[serde(rename = "RepoDigests", default)]
    repo_digests: Option<Vec<String>>,
}

/// TTL cache over image existence for one runtime
pub struct CapsuleCache {
    runner: Arc<dyn CommandRunner>,
    runtime: String,
    ttl: Duration,
    entries: RwLock<HashMap<String, CapsuleCacheEntry>>,
}

impl CapsuleCache {
    /// Create a cache that queries through `runtime` (an executable path)
    pub fn new(runner: Arc<dyn CommandRunner>, runtime: impl Into<String>) -> Self {
        Self {
            runner,
            runtime: runtime.into(),
            ttl: DEFAULT_TTL,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Override the TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Runtime executable used for lookups
    pub fn runtime(&self) -> &str {
        &self.runtime
    }

    /// Whether `tag` exists, answered from memory while the entry is fresh.
    pub async fn exists(&self, tag: &str) -> CapsuleResult<bool> {
        let key = entry_key(tag);
        if let Some(entry) = self.entries.read().await.get(&key) {
            if entry.checked_at.elapsed() < self.ttl {
                debug!("Capsule cache hit for {}: {}", tag, entry.exists);
                return Ok(entry.exists);
            }
        }

        // No lock held across the runtime query
        let filter = format!("reference={}", tag);
        let output = self.command(&["images", "-q", "--filter", &filter]).await?;
        if !output.success {
            return Err(CapsuleError::command_exec(
                display_command(&self.runtime, &["images", "-q", "--filter", &filter]),
                output.stderr.trim(),
            ));
        }
        let exists = !output.stdout.trim().is_empty();

        self.entries.write().await.insert(
            key,
            CapsuleCacheEntry {
                tag: tag.to_string(),
                exists,
                checked_at: Instant::now(),
            },
        );
        debug!("Checked capsule {}: exists={}", tag, exists);
        Ok(exists)
    }

    /// Existence plus inspect metadata when the image is present.
    ///
    /// An inspect or parse failure is an error; the existence entry stays cached.
    pub async fn exists_with_details(
        &self,
        tag: &str,
    ) -> CapsuleResult<(bool, Option<ImageDetails>)> {
        if !self.exists(tag).await? {
            return Ok((false, None));
        }
        let details = self.inspect(tag).await?;
        Ok((true, Some(details)))
    }

    /// Fetch metadata for `tag`. Never cached.
    pub async fn inspect(&self, tag: &str) -> CapsuleResult<ImageDetails> {
        let output = self.command(&["image", "inspect", tag]).await?;
        if !output.success {
            return Err(CapsuleError::ImageInspect {
                tag: tag.to_string(),
                reason: output.stderr.trim().to_string(),
            });
        }
        parse_inspect(tag, &output.stdout)
    }

    /// Forget the cached answer for `tag`
    pub async fn invalidate(&self, tag: &str) {
        if self.entries.write().await.remove(&entry_key(tag)).is_some() {
            debug!("Invalidated capsule cache entry {}", tag);
        }
    }

    /// Whether some repo digest of `tag` contains `expected`.
    ///
    /// Fails closed: an empty `expected`, a missing image or any runtime query error
    /// is `false`.
    pub async fn validate_digest(&self, tag: &str, expected: &str) -> bool {
        let expected = expected.trim();
        if expected.is_empty() {
            return false;
        }

        match self.exists_with_details(tag).await {
            Ok((true, Some(details))) => details.repo_digests.iter().any(|d| d.contains(expected)),
            Ok(_) => false,
            Err(e) => {
                warn!("Digest check for {} failed: {}", tag, e);
                false
            }
        }
    }

    /// Cached entry for `tag`, fresh or not
    pub async fn cached_entry(&self, tag: &str) -> Option<CapsuleCacheEntry> {
        self.entries.read().await.get(&entry_key(tag)).cloned()
    }

    pub(crate) async fn command(&self, args: &[&str]) -> CapsuleResult<CommandOutput> {
        self.runner.run(&self.runtime, args).await
    }
}

/// Cache key for a reference: `name` and `name:latest` share one entry.
fn entry_key(tag: &str) -> String {
    let name = tag.rsplit('/').next().unwrap_or(tag);
    if tag.contains('@') || name.contains(':') {
        tag.to_string()
    } else {
        format!("{}:latest", tag)
    }
}

fn parse_inspect(tag: &str, stdout: &str) -> CapsuleResult<ImageDetails> {
    let entries: Vec<InspectEntry> =
        serde_json::from_str(stdout).map_err(|e| CapsuleError::ImageInspect {
            tag: tag.to_string(),
            reason: format!("unparseable inspect output: {}", e),
        })?;

    let entry = entries
        .into_iter()
        .next()
        .ok_or_else(|| CapsuleError::ImageInspect {
            tag: tag.to_string(),
            reason: "empty inspect output".to_string(),
        })?;

    Ok(ImageDetails {
        tag: tag.to_string(),
        created_at: entry.created,
        size_bytes: entry.size,
        architecture: entry.architecture,
        repo_digests: entry.repo_digests.unwrap_or_default(),
    })
}
