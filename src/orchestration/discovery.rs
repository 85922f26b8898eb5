//! Container runtime discovery
//!
//! Scans PATH for known container engines, ranks them with a static
//! hardware-dependent priority table, and queries each one for its version
//! and feature capabilities. Query failures degrade silently.

use crate::exec::CommandRunner;
use crate::hardware::HardwareProfile;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Apple's native virtualization runtime binary
pub const NATIVE_RUNTIME: &str = "container";

/// Binary name returned when nothing was discovered
pub const DEFAULT_RUNTIME: &str = "docker";

/// Version string used when the version query fails
pub const UNKNOWN_VERSION: &str = "unknown";

/// Capability names reported by [`RuntimeDiscoverer`]
pub mod capabilities {
    /// BuildKit-accelerated image builds (`buildx`)
    pub const BUILDKIT: &str = "buildkit";
    /// Multi-platform image builds
    pub const MULTI_PLATFORM: &str = "multi-platform";
    /// Compose-style orchestration subcommand
    pub const COMPOSE: &str = "compose";
}

/// Priorities on native Apple Silicon
const APPLE_SILICON_PRIORITIES: &[(&str, i32)] = &[
    (NATIVE_RUNTIME, 100),
    ("finch", 90),
    ("podman", 80),
    ("nerdctl", 70),
    ("docker", 60),
];

/// Priorities everywhere else
const STANDARD_PRIORITIES: &[(&str, i32)] = &[("podman", 100), ("docker", 90), ("nerdctl", 80)];

/// A discovered container engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Runtime {
    /// Binary name (e.g. "podman")
    pub name: String,
    /// Resolved executable path
    pub path: PathBuf,
    /// First line of `--version`, or "unknown"
    pub version: String,
    /// Static priority for this hardware class (higher wins)
    pub priority: i32,
    /// Detected feature capabilities
    pub capabilities: BTreeSet<String>,
    /// Normalized benchmark score (0 = unknown, 1.0 = fastest)
    pub performance_score: f64,
    /// When the score was measured
    pub last_benchmarked: Option<DateTime<Utc>>,
}

impl Runtime {
    /// Create a runtime entry with no version or capabilities yet
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, priority: i32) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            version: UNKNOWN_VERSION.to_string(),
            priority,
            capabilities: BTreeSet::new(),
            performance_score: 0.0,
            last_benchmarked: None,
        }
    }

    /// Executable path as a string, suitable for returning to callers
    pub fn path_string(&self) -> String {
        self.path.display().to_string()
    }

    /// Whether the runtime reported the given capability
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

/// Resolves binary names to executable paths
pub trait Locator: Send + Sync {
    /// Find `name` on the search path
    fn locate(&self, name: &str) -> Option<PathBuf>;
}

/// Locates binaries on PATH (or an explicit search path) via `which`
#[derive(Debug, Clone, Default)]
pub struct PathLocator {
    search_path: Option<OsString>,
}

impl PathLocator {
    /// Use the process PATH
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit search path instead of PATH
    pub fn with_search_path(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(search_path.into()),
        }
    }
}

impl Locator for PathLocator {
    fn locate(&self, name: &str) -> Option<PathBuf> {
        match &self.search_path {
            Some(paths) => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
                which::which_in(name, Some(paths), cwd).ok()
            }
            None => which::which(name).ok(),
        }
    }
}

/// Finds installed container runtimes
pub struct RuntimeDiscoverer {
    runner: Arc<dyn CommandRunner>,
    locator: Box<dyn Locator>,
}

impl RuntimeDiscoverer {
    /// Create a discoverer with the given command runner and binary locator
    pub fn new(runner: Arc<dyn CommandRunner>, locator: Box<dyn Locator>) -> Self {
        Self { runner, locator }
    }

    /// Priority table for a hardware class, highest first
    pub fn priority_table(profile: &HardwareProfile) -> &'static [(&'static str, i32)] {
        if profile.is_native_apple_silicon {
            APPLE_SILICON_PRIORITIES
        } else {
            STANDARD_PRIORITIES
        }
    }

    /// Discover runtimes for this host, sorted by descending priority.
    pub async fn discover(&self, profile: &HardwareProfile) -> Vec<Runtime> {
        let mut found = Vec::new();

        for (name, priority) in Self::priority_table(profile) {
            let Some(path) = self.locator.locate(name) else {
                debug!("Runtime {} not found on PATH", name);
                continue;
            };

            let mut runtime = Runtime::new(*name, path, *priority);
            runtime.version = self.query_version(&runtime.path).await;
            runtime.capabilities = self.query_capabilities(name, &runtime.path).await;

            debug!(
                "Discovered {} at {} ({}, priority {})",
                runtime.name,
                runtime.path.display(),
                runtime.version,
                runtime.priority
            );
            found.push(runtime);
        }

        // Stable: equal priorities keep discovery order
        found.sort_by(|a, b| b.priority.cmp(&a.priority));
        found
    }

    async fn query_version(&self, path: &Path) -> String {
        let program = path.display().to_string();
        match self.runner.run(&program, &["--version"]).await {
            Ok(output) if output.success => output
                .first_line()
                .map(String::from)
                .unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
            _ => UNKNOWN_VERSION.to_string(),
        }
    }

    async fn query_capabilities(&self, name: &str, path: &Path) -> BTreeSet<String> {
        let program = path.display().to_string();
        let mut caps = BTreeSet::new();

        if self.succeeds(&program, &["buildx", "version"]).await {
            caps.insert(capabilities::BUILDKIT.to_string());
        }

        // The native runtime only builds for the host platform
        if name != NATIVE_RUNTIME {
            caps.insert(capabilities::MULTI_PLATFORM.to_string());
        }

        if self.succeeds(&program, &["compose", "version"]).await {
            caps.insert(capabilities::COMPOSE.to_string());
        }

        caps
    }

    async fn succeeds(&self, program: &str, args: &[&str]) -> bool {
        self.runner
            .run(program, args)
            .await
            .map(|output| output.success)
            .unwrap_or(false)
    }
}
