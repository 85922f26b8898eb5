//! Container runtime orchestration
//!
//! Discovers installed container engines, benchmarks them, and selects the
//! fastest one for this host:
//! - `discovery`: PATH scan, priorities, version and capability queries
//! - `benchmark`: timed trials and score normalization
//! - `scores`: persisted, fingerprinted benchmark results
//! - `selector`: fast path, benchmarking and fallback policy

pub mod benchmark;
pub mod discovery;
pub mod scores;
pub mod selector;

pub use benchmark::{normalize_scores, BenchmarkEngine, BenchmarkMode, BenchmarkResult};
pub use discovery::{Locator, PathLocator, Runtime, RuntimeDiscoverer};
pub use scores::{ScoreCache, ScoreCacheFile};
pub use selector::{Level, Recommendation, RuntimeSelector, Selection};

/// Max number of output lines to include in build error messages.
const BUILD_ERROR_TAIL_LINES: usize = 20;

/// Extract the useful tail of build output for error diagnostics.
///
/// Combines stdout and stderr and keeps the last `BUILD_ERROR_TAIL_LINES`
/// non-empty lines.
pub(crate) fn build_error_output(stdout: &str, stderr: &str) -> String {
    let lines: Vec<&str> = stdout
        .lines()
        .chain(stderr.lines())
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect();
    let start = lines.len().saturating_sub(BUILD_ERROR_TAIL_LINES);
    lines[start..].join("\n")
}
