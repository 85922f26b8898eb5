//! Runtime benchmarking
//!
//! Times a small real-world workload against each runtime: either a trivial
//! `run` of a known-small image, or a one-line image build followed by a run
//! of the result. Trials never fail outright; problems are recorded in the
//! result's `error` field and the runtime drops out of selection.

use crate::error::{CapsuleError, CapsuleResult};
use crate::exec::{display_command, CommandRunner};
use crate::orchestration::build_error_output;
use crate::orchestration::discovery::Runtime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default image used for trials
pub const DEFAULT_BENCHMARK_IMAGE: &str = "alpine:latest";

/// String echoed inside the trial container
const BENCHMARK_MARKER: &str = "capsule-benchmark";

/// Name prefix for throwaway containers and images
const BENCHMARK_PREFIX: &str = "capsule-bench-";

/// What a trial measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BenchmarkMode {
    /// Trivial run of an existing image
    #[serde(rename = "exec")]
    Exec,
    /// Image build followed by a run of the built image
    #[serde(rename = "build+exec")]
    BuildExec,
}

impl BenchmarkMode {
    /// Mode for the `include_build` flag
    pub fn from_include_build(include_build: bool) -> Self {
        if include_build {
            Self::BuildExec
        } else {
            Self::Exec
        }
    }
}

impl fmt::Display for BenchmarkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exec => write!(f, "exec"),
            Self::BuildExec => write!(f, "build+exec"),
        }
    }
}

/// Outcome of one trial against one runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    /// Runtime binary name
    #[serde(rename = "runtime")]
    pub runtime_name: String,
    /// Image build time (zero in exec mode)
    #[serde(rename = "build_time", with = "nanos")]
    pub build_duration: Duration,
    /// Synthetic start component: half of the measured run
    #[serde(rename = "start_time", with = "nanos")]
    pub start_duration: Duration,
    /// Synthetic exec component: the other half of the measured run
    #[serde(rename = "exec_time", with = "nanos")]
    pub exec_duration: Duration,
    /// Seconds before normalization, multiples of the fastest after
    pub score: f64,
    /// When the trial finished
    pub timestamp: DateTime<Utc>,
    /// Failure description, if the trial failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// What was measured
    pub mode: BenchmarkMode,
}

impl BenchmarkResult {
    fn new(runtime_name: &str, mode: BenchmarkMode) -> Self {
        Self {
            runtime_name: runtime_name.to_string(),
            build_duration: Duration::ZERO,
            start_duration: Duration::ZERO,
            exec_duration: Duration::ZERO,
            score: 0.0,
            timestamp: Utc::now(),
            error: None,
            mode,
        }
    }

    fn failed(runtime_name: &str, mode: BenchmarkMode, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::new(runtime_name, mode)
        }
    }

    /// Whether this result may take part in selection
    pub fn is_usable(&self) -> bool {
        self.error.as_deref().is_none_or(str::is_empty) && self.score > 0.0
    }

    /// Total measured wall-clock time
    pub fn total_duration(&self) -> Duration {
        self.build_duration + self.start_duration + self.exec_duration
    }
}

/// Serialize `Duration` as integer nanoseconds
mod nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_nanos(u64::deserialize(deserializer)?))
    }
}

/// Rescale usable scores so the fastest becomes exactly 1.0.
///
/// Results with an error or a non-positive score are left untouched. If no
/// result is usable the batch is left as-is. Running this twice on the same
/// batch changes nothing the second time.
pub fn normalize_scores(results: &mut [BenchmarkResult]) {
    let min = results
        .iter()
        .filter(|r| r.is_usable())
        .map(|r| r.score)
        .fold(f64::INFINITY, f64::min);

    if !min.is_finite() {
        debug!("No usable benchmark results, skipping normalization");
        return;
    }

    for result in results.iter_mut().filter(|r| r.is_usable()) {
        result.score /= min;
    }
}

/// Runs timed trials against container runtimes
pub struct BenchmarkEngine {
    runner: Arc<dyn CommandRunner>,
    image: String,
    work_dir: PathBuf,
}

impl BenchmarkEngine {
    /// Create an engine.
    ///
    /// `work_dir` holds throwaway build contexts; it lives under the user's
    /// state directory so VM-backed runtimes that only share `$HOME` can see it.
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        image: impl Into<String>,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            runner,
            image: image.into(),
            work_dir,
        }
    }

    /// Image used for trials
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Run one trial. Never returns an error; failures live in the result.
    pub async fn run_trial(&self, runtime: &Runtime, include_build: bool) -> BenchmarkResult {
        let mode = BenchmarkMode::from_include_build(include_build);
        debug!("Benchmarking {} ({})", runtime.name, mode);

        let result = match mode {
            BenchmarkMode::Exec => self.exec_trial(runtime).await,
            BenchmarkMode::BuildExec => self.build_trial(runtime).await,
        };

        match &result.error {
            Some(e) => warn!("Benchmark of {} failed: {}", runtime.name, e),
            None => info!(
                "Benchmarked {}: {:.3}s ({})",
                runtime.name, result.score, mode
            ),
        }
        result
    }

    /// Benchmark every runtime sequentially, then normalize the batch.
    pub async fn run_batch(
        &self,
        runtimes: &[Runtime],
        include_build: bool,
    ) -> Vec<BenchmarkResult> {
        self.run_batch_with_progress(runtimes, include_build, &|_, _, _| {})
            .await
    }

    /// Same as [`run_batch`](Self::run_batch), reporting `(index, total, runtime)`
    /// before each trial.
    ///
    /// Trials are never run concurrently: parallel runs would contend for
    /// CPU and disk and skew the timings being compared.
    pub async fn run_batch_with_progress(
        &self,
        runtimes: &[Runtime],
        include_build: bool,
        on_trial: &(dyn Fn(usize, usize, &Runtime) + Send + Sync),
    ) -> Vec<BenchmarkResult> {
        let mut results = Vec::with_capacity(runtimes.len());
        for (index, runtime) in runtimes.iter().enumerate() {
            on_trial(index, runtimes.len(), runtime);
            results.push(self.run_trial(runtime, include_build).await);
        }
        normalize_scores(&mut results);
        results
    }

    async fn exec_trial(&self, runtime: &Runtime) -> BenchmarkResult {
        let mode = BenchmarkMode::Exec;
        let program = runtime.path_string();
        let container = throwaway_name();

        let measured = self.timed_run(&program, &container, &self.image).await;
        self.remove_container(&program, &container).await;

        match measured {
            Ok(total) => {
                let mut result = BenchmarkResult::new(&runtime.name, mode);
                split_run_time(&mut result, total);
                result.score = total.as_secs_f64();
                result
            }
            Err(e) => BenchmarkResult::failed(&runtime.name, mode, e),
        }
    }

    async fn build_trial(&self, runtime: &Runtime) -> BenchmarkResult {
        let mode = BenchmarkMode::BuildExec;
        let program = runtime.path_string();
        let id = throwaway_name();
        let tag = format!("{}:latest", id);
        let context_dir = self.work_dir.join(&id);

        let measured = self
            .timed_build_and_run(&program, &context_dir, &tag, &id)
            .await;

        // Cleanup runs on every path, including failures
        self.remove_container(&program, &id).await;
        self.remove_image(&program, &tag).await;
        if let Err(e) = tokio::fs::remove_dir_all(&context_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("Failed to remove {}: {}", context_dir.display(), e);
            }
        }

        match measured {
            Ok((build, run)) => {
                let mut result = BenchmarkResult::new(&runtime.name, mode);
                result.build_duration = build;
                split_run_time(&mut result, run);
                result.score = (build + run).as_secs_f64();
                result
            }
            Err(e) => BenchmarkResult::failed(&runtime.name, mode, e),
        }
    }

    async fn timed_build_and_run(
        &self,
        program: &str,
        context_dir: &Path,
        tag: &str,
        container: &str,
    ) -> Result<(Duration, Duration), String> {
        write_build_context(context_dir, &self.image)
            .await
            .map_err(|e| e.to_string())?;

        let context = context_dir.display().to_string();
        let args = ["build", "-t", tag, context.as_str()];
        let started = Instant::now();
        let output = self
            .runner
            .run(program, &args)
            .await
            .map_err(|e| e.to_string())?;
        let build = started.elapsed();

        if !output.success {
            return Err(format!(
                "build failed ({}): {}",
                display_command(program, &args),
                build_error_output(&output.stdout, &output.stderr)
            ));
        }

        let run = self.timed_run(program, container, tag).await?;
        Ok((build, run))
    }

    /// Time `run --rm` of `image` echoing the marker
    async fn timed_run(
        &self,
        program: &str,
        container: &str,
        image: &str,
    ) -> Result<Duration, String> {
        let args = ["run", "--rm", "--name", container, image, "echo", BENCHMARK_MARKER];
        let started = Instant::now();
        let output = self
            .runner
            .run(program, &args)
            .await
            .map_err(|e| e.to_string())?;
        let elapsed = started.elapsed();

        if !output.success {
            return Err(format!(
                "run failed ({}): {}",
                display_command(program, &args),
                output.stderr.trim()
            ));
        }
        if !output.stdout.contains(BENCHMARK_MARKER) {
            return Err(format!(
                "unexpected output from {}: {:?}",
                display_command(program, &args),
                output.stdout.trim()
            ));
        }
        Ok(elapsed)
    }

    async fn remove_container(&self, program: &str, container: &str) {
        if let Err(e) = self.runner.run(program, &["rm", "-f", container]).await {
            debug!("Failed to remove benchmark container {}: {}", container, e);
        }
    }

    async fn remove_image(&self, program: &str, tag: &str) {
        if let Err(e) = self.runner.run(program, &["rmi", "-f", tag]).await {
            debug!("Failed to remove benchmark image {}: {}", tag, e);
        }
    }
}

/// Split a measured run into start/exec halves.
///
/// Heuristic: from the outside a run cannot be separated into container
/// start and command execution, so both components are synthetic.
fn split_run_time(result: &mut BenchmarkResult, total: Duration) {
    let start = total / 2;
    result.start_duration = start;
    result.exec_duration = total - start;
}

fn throwaway_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}", BENCHMARK_PREFIX, &id[..12])
}

async fn write_build_context(dir: &Path, image: &str) -> CapsuleResult<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| CapsuleError::io(format!("creating build context {}", dir.display()), e))?;
    tokio::fs::write(dir.join("Dockerfile"), format!("FROM {}\n", image))
        .await
        .map_err(|e| CapsuleError::io("writing benchmark Dockerfile", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedRunner;
    use crate::exec::CommandOutput;
    use tempfile::TempDir;

    fn result(name: &str, score: f64, error: Option<&str>) -> BenchmarkResult {
        BenchmarkResult {
            score,
            error: error.map(String::from),
            ..BenchmarkResult::new(name, BenchmarkMode::Exec)
        }
    }

    fn runtime(name: &str) -> Runtime {
        Runtime::new(name, format!("/usr/bin/{}", name), 90)
    }

    #[test]
    fn normalize_sets_fastest_to_one() {
        let mut batch = vec![
            result("alpha", 2.0, None),
            result("beta", 4.0, None),
            result("gamma", 3.0, None),
        ];
        normalize_scores(&mut batch);

        assert_eq!(batch[0].score, 1.0);
        assert_eq!(batch[1].score, 2.0);
        assert_eq!(batch[2].score, 1.5);
    }

    #[test]
    fn normalize_is_idempotent() {
        let mut batch = vec![result("alpha", 0.37, None), result("beta", 1.13, None)];
        normalize_scores(&mut batch);
        let once = batch.clone();
        normalize_scores(&mut batch);
        assert_eq!(batch, once);
    }

    #[test]
    fn normalize_skips_failed_results() {
        let mut batch = vec![
            result("alpha", 0.5, Some("run failed")),
            result("beta", 3.0, None),
            result("gamma", 0.0, None),
            result("delta", 6.0, None),
        ];
        normalize_scores(&mut batch);

        assert_eq!(batch[0].score, 0.5);
        assert_eq!(batch[1].score, 1.0);
        assert_eq!(batch[2].score, 0.0);
        assert_eq!(batch[3].score, 2.0);
    }

    #[test]
    fn normalize_leaves_unusable_batch_alone() {
        let mut batch = vec![result("alpha", 2.0, Some("boom")), result("beta", 0.0, None)];
        let before = batch.clone();
        normalize_scores(&mut batch);
        assert_eq!(batch, before);
    }

    #[test]
    fn empty_error_string_counts_as_success() {
        assert!(result("alpha", 1.0, Some("")).is_usable());
        assert!(!result("alpha", 1.0, Some("x")).is_usable());
        assert!(!result("alpha", -1.0, None).is_usable());
    }

    #[test]
    fn result_json_shape() {
        let mut r = result("podman", 1.25, None);
        r.build_duration = Duration::from_millis(1);
        let json = serde_json::to_value(&r).unwrap();

        assert_eq!(json["runtime"], "podman");
        assert_eq!(json["build_time"], 1_000_000);
        assert_eq!(json["mode"], "exec");
        assert!(json.get("error").is_none());
        assert!(json["timestamp"].is_string());

        let mut failed = result("docker", 0.0, Some("daemon down"));
        failed.mode = BenchmarkMode::BuildExec;
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["mode"], "build+exec");
        assert_eq!(json["error"], "daemon down");
    }

    #[tokio::test]
    async fn exec_trial_measures_and_cleans_up() {
        let runner = Arc::new(ScriptedRunner::new().on_slow(
            "run --rm",
            CommandOutput::ok("capsule-benchmark\n"),
            Duration::from_millis(20),
        ));
        let dir = TempDir::new().unwrap();
        let engine = BenchmarkEngine::new(runner.clone(), "alpine:latest", dir.path().into());

        let r = engine.run_trial(&runtime("podman"), false).await;

        assert!(r.is_usable(), "{:?}", r.error);
        assert_eq!(r.mode, BenchmarkMode::Exec);
        assert!(r.score >= 0.02);
        assert_eq!(r.build_duration, Duration::ZERO);
        assert_eq!(r.start_duration + r.exec_duration, r.total_duration());
        assert_eq!(runner.count("alpine:latest echo capsule-benchmark"), 1);
        assert_eq!(runner.count("rm -f capsule-bench-"), 1);
    }

    #[tokio::test]
    async fn failed_run_is_recorded_not_raised() {
        let runner = Arc::new(
            ScriptedRunner::new().on(
                "run --rm",
                CommandOutput::failed(125, "Cannot connect to the Docker daemon"),
            ),
        );
        let dir = TempDir::new().unwrap();
        let engine = BenchmarkEngine::new(runner.clone(), "alpine:latest", dir.path().into());

        let r = engine.run_trial(&runtime("docker"), false).await;

        assert!(!r.is_usable());
        assert_eq!(r.score, 0.0);
        assert!(r.error.unwrap().contains("Cannot connect"));
        // Container cleanup still happens
        assert_eq!(runner.count("rm -f"), 1);
    }

    #[tokio::test]
    async fn unexpected_output_is_a_failure() {
        let runner = Arc::new(ScriptedRunner::new().on("run --rm", CommandOutput::ok("")));
        let dir = TempDir::new().unwrap();
        let engine = BenchmarkEngine::new(runner, "alpine:latest", dir.path().into());

        let r = engine.run_trial(&runtime("nerdctl"), false).await;
        assert!(r.error.unwrap().contains("unexpected output"));
    }

    #[tokio::test]
    async fn build_trial_times_both_phases() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .on_slow(" build -t ", CommandOutput::ok(""), Duration::from_millis(10))
                .on_slow(
                    "run --rm",
                    CommandOutput::ok("capsule-benchmark"),
                    Duration::from_millis(10),
                ),
        );
        let dir = TempDir::new().unwrap();
        let engine = BenchmarkEngine::new(runner.clone(), "busybox:1.36", dir.path().into());

        let r = engine.run_trial(&runtime("podman"), true).await;

        assert!(r.is_usable(), "{:?}", r.error);
        assert_eq!(r.mode, BenchmarkMode::BuildExec);
        assert!(r.build_duration >= Duration::from_millis(10));
        assert!(r.score >= 0.02);
        assert_eq!(runner.count("rmi -f capsule-bench-"), 1);
        // Build context removed
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn failed_build_still_cleans_up() {
        let runner = Arc::new(
            ScriptedRunner::new().on(" build -t ", CommandOutput::failed(1, "pull access denied")),
        );
        let dir = TempDir::new().unwrap();
        let engine = BenchmarkEngine::new(runner.clone(), "alpine:latest", dir.path().into());

        let r = engine.run_trial(&runtime("podman"), true).await;

        assert!(r.error.unwrap().contains("pull access denied"));
        assert_eq!(runner.count("run --rm"), 0);
        assert_eq!(runner.count("rm -f"), 1);
        assert_eq!(runner.count("rmi -f"), 1);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn batch_runs_every_runtime_and_normalizes() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .on_slow(
                    "/usr/bin/alpha run",
                    CommandOutput::ok("capsule-benchmark"),
                    Duration::from_millis(20),
                )
                .on_slow(
                    "/usr/bin/beta run",
                    CommandOutput::ok("capsule-benchmark"),
                    Duration::from_millis(60),
                )
                .on("/usr/bin/gamma run", CommandOutput::failed(1, "broken")),
        );
        let dir = TempDir::new().unwrap();
        let engine = BenchmarkEngine::new(runner, "alpine:latest", dir.path().into());
        let runtimes = vec![runtime("alpha"), runtime("beta"), runtime("gamma")];

        let seen = std::sync::Mutex::new(Vec::new());
        let results = engine
            .run_batch_with_progress(&runtimes, false, &|i, total, rt| {
                seen.lock().unwrap().push((i, total, rt.name.clone()));
            })
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].score, 1.0);
        assert!(results[1].score > 1.0);
        assert!(!results[2].is_usable());
        assert_eq!(seen.lock().unwrap()[2], (2, 3, "gamma".to_string()));
    }
}
