//! Capsule maintenance
//!
//! Lists and removes capsule images (repository prefixed with `capsule-`)
//! and hands out per-tag handles over the shared existence cache.

use crate::cache::capsule::{CapsuleCache, ImageDetails};
use crate::error::{CapsuleError, CapsuleResult};
use crate::exec::display_command;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Repository prefix identifying capsule images
pub const CAPSULE_PREFIX: &str = "capsule-";

/// Content-addressed capsule tag: `capsule-<first 12 hex of sha256>`.
///
/// Order-sensitive over `parts`.
pub fn capsule_tag(base: &str, parts: &[&str]) -> String {
    capsule_tag_with_prefix(CAPSULE_PREFIX, base, parts)
}

/// [`capsule_tag`] under a custom repository prefix
pub fn capsule_tag_with_prefix(prefix: &str, base: &str, parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(base.as_bytes());
    for part in parts {
        hasher.update([0u8]);
        hasher.update(part.as_bytes());
    }
    let hash = hex::encode(hasher.finalize());
    format!("{}{}", prefix, &hash[..12])
}

/// Outcome of a bulk removal
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClearReport {
    /// Tags removed (or already gone)
    pub removed: Vec<String>,
    /// Tags left in place, with the reason
    pub failed: Vec<(String, String)>,
}

/// Handle over a single capsule tag
#[derive(Clone)]
pub struct CapsuleHandle {
    tag: String,
    cache: Arc<CapsuleCache>,
}

impl CapsuleHandle {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub async fn exists(&self) -> CapsuleResult<bool> {
        self.cache.exists(&self.tag).await
    }

    pub async fn details(&self) -> CapsuleResult<(bool, Option<ImageDetails>)> {
        self.cache.exists_with_details(&self.tag).await
    }

    pub async fn verify(&self, expected_digest: &str) -> bool {
        self.cache.validate_digest(&self.tag, expected_digest).await
    }

    /// Call after building or removing the image
    pub async fn invalidate(&self) {
        self.cache.invalidate(&self.tag).await
    }
}

/// Bulk operations over capsule images
pub struct CapsuleManager {
    cache: Arc<CapsuleCache>,
    prefix: String,
}

impl CapsuleManager {
    pub fn new(cache: Arc<CapsuleCache>) -> Self {
        Self {
            cache,
            prefix: CAPSULE_PREFIX.to_string(),
        }
    }

    /// Use a different repository prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Shared existence cache
    pub fn cache(&self) -> &Arc<CapsuleCache> {
        &self.cache
    }

    /// Handle for one tag
    pub fn capsule(&self, tag: impl Into<String>) -> CapsuleHandle {
        CapsuleHandle {
            tag: tag.into(),
            cache: Arc::clone(&self.cache),
        }
    }

    /// All capsule images as `repository:tag`, sorted
    pub async fn list(&self) -> CapsuleResult<Vec<String>> {
        let filter = format!("reference={}*", self.prefix);
        let args = [
            "images",
            "--filter",
            filter.as_str(),
            "--format",
            "{{.Repository}}:{{.Tag}}",
        ];
        let output = self.cache.command(&args).await?;
        if !output.success {
            return Err(CapsuleError::command_exec(
                display_command(self.cache.runtime(), &args),
                output.stderr.trim(),
            ));
        }

        // Not every runtime honours the filter; re-check the prefix here
        let images: BTreeSet<String> = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| l.starts_with(&self.prefix) && !l.ends_with(":<none>"))
            .map(String::from)
            .collect();
        Ok(images.into_iter().collect())
    }

    /// Remove every capsule image. Individual failures are reported, not raised.
    pub async fn clear_all(&self) -> CapsuleResult<ClearReport> {
        let images = self.list().await?;
        let mut report = ClearReport::default();
        for image in images {
            self.remove(&image, &mut report).await;
        }
        info!(
            "Removed {} capsule(s), {} failed",
            report.removed.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Remove capsule images created more than `max_age` ago.
    ///
    /// Images whose creation time cannot be read are left in place and
    /// reported as failed.
    pub async fn clear_old(&self, max_age: chrono::Duration) -> CapsuleResult<ClearReport> {
        let cutoff = Utc::now() - max_age;
        let images = self.list().await?;
        let mut report = ClearReport::default();

        for image in images {
            match self.cache.inspect(&image).await {
                Ok(details) if details.created_at < cutoff => {
                    self.remove(&image, &mut report).await;
                }
                Ok(details) => {
                    debug!("Keeping {} (created {})", image, details.created_at);
                }
                Err(e) => {
                    warn!("Skipping {}: {}", image, e);
                    report.failed.push((image, e.to_string()));
                }
            }
        }

        info!(
            "Removed {} capsule(s) older than {} day(s)",
            report.removed.len(),
            max_age.num_days()
        );
        Ok(report)
    }

    async fn remove(&self, image: &str, report: &mut ClearReport) {
        let result = self.cache.command(&["rmi", image]).await;
        // The tag's state is unknown after any attempt
        self.cache.invalidate(image).await;

        match result {
            Ok(output) if output.success => report.removed.push(image.to_string()),
            Ok(output) if is_already_gone(&output.stderr) => {
                debug!("{} already removed", image);
                report.removed.push(image.to_string());
            }
            Ok(output) => {
                warn!("Failed to remove {}: {}", image, output.stderr.trim());
                report
                    .failed
                    .push((image.to_string(), output.stderr.trim().to_string()));
            }
            Err(e) => {
                warn!("Failed to remove {}: {}", image, e);
                report.failed.push((image.to_string(), e.to_string()));
            }
        }
    }
}

fn is_already_gone(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    stderr.contains("no such image") || stderr.contains("image not known")
}
