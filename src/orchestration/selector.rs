//! Runtime selection
//!
//! Decides which discovered runtime callers should use:
//!
//! 1. Native Apple Silicon with Apple's `container` runtime installed: use it.
//! 2. Otherwise, re-benchmark if the score cache is stale (unless disabled).
//! 3. Pick the lowest usable score.
//! 4. Fall back to the highest-priority runtime, then to `docker`.

use crate::config::{Config, ConfigManager};
use crate::error::{CapsuleError, CapsuleResult};
use crate::exec::{CommandRunner, SystemRunner};
use crate::hardware::HardwareProfile;
use crate::lock::FileLock;
use crate::orchestration::benchmark::{BenchmarkEngine, BenchmarkResult};
use crate::orchestration::discovery::{
    capabilities, PathLocator, Runtime, RuntimeDiscoverer, DEFAULT_RUNTIME, NATIVE_RUNTIME,
};
use crate::orchestration::scores::ScoreCache;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// The selected runtime and why it was chosen
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Apple's native runtime on native Apple Silicon
    FastPath(Runtime),
    /// Lowest normalized benchmark score
    Benchmarked { runtime: Runtime, score: f64 },
    /// No usable scores; highest static priority
    Priority(Runtime),
    /// Nothing discovered
    Default,
}

impl Selection {
    /// Executable to invoke
    pub fn path(&self) -> String {
        match self.runtime() {
            Some(rt) => rt.path_string(),
            None => DEFAULT_RUNTIME.to_string(),
        }
    }

    /// The chosen runtime, if one was discovered
    pub fn runtime(&self) -> Option<&Runtime> {
        match self {
            Self::FastPath(rt) | Self::Priority(rt) => Some(rt),
            Self::Benchmarked { runtime, .. } => Some(runtime),
            Self::Default => None,
        }
    }

    /// Short reason for display
    pub fn reason(&self) -> &'static str {
        match self {
            Self::FastPath(_) => "native Apple Silicon fast path",
            Self::Benchmarked { .. } => "fastest benchmark",
            Self::Priority(_) => "highest priority",
            Self::Default => "default (no runtime found)",
        }
    }
}

/// Severity of a recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warning,
}

/// Advice derived from the hardware and runtime state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recommendation {
    pub level: Level,
    pub message: String,
}

impl Recommendation {
    fn info(message: impl Into<String>) -> Self {
        Self {
            level: Level::Info,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            level: Level::Warning,
            message: message.into(),
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Picks the best container runtime for this host
pub struct RuntimeSelector {
    profile: HardwareProfile,
    runtimes: RwLock<Vec<Runtime>>,
    scores: ScoreCache,
    engine: BenchmarkEngine,
    include_build: bool,
    lock: Option<(PathBuf, Duration)>,
    /// This process already holds a batch newer than anything on disk
    benchmarked: AtomicBool,
}

impl RuntimeSelector {
    /// Assemble a selector from already-discovered parts
    pub fn new(
        profile: HardwareProfile,
        runtimes: Vec<Runtime>,
        scores: ScoreCache,
        engine: BenchmarkEngine,
    ) -> Self {
        Self {
            profile,
            runtimes: RwLock::new(runtimes),
            scores,
            engine,
            include_build: false,
            lock: None,
            benchmarked: AtomicBool::new(false),
        }
    }

    /// Serialize benchmark-and-save across processes through a lock file
    pub fn with_lock(mut self, path: PathBuf, timeout: Duration) -> Self {
        self.lock = Some((path, timeout));
        self
    }

    /// Include an image build in automatic benchmarks
    pub fn with_include_build(mut self, include_build: bool) -> Self {
        self.include_build = include_build;
        self
    }

    /// Detect hardware, discover runtimes and wire the real subprocess runner.
    pub async fn from_config(config: &Config) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
        Self::from_config_with(config, runner, Box::new(PathLocator::new())).await
    }

    /// Same as [`from_config`](Self::from_config) with an injected runner and locator
    pub async fn from_config_with(
        config: &Config,
        runner: Arc<dyn CommandRunner>,
        locator: Box<dyn crate::orchestration::discovery::Locator>,
    ) -> Self {
        let profile = HardwareProfile::detect(runner.as_ref()).await;
        let runtimes = RuntimeDiscoverer::new(runner.clone(), locator)
            .discover(&profile)
            .await;

        let cache_path = config
            .benchmark
            .cache_path
            .clone()
            .unwrap_or_else(ConfigManager::score_cache_path);
        let lock_path = cache_path.with_extension("lock");
        let scores = ScoreCache::new(cache_path)
            .with_validity(config.benchmark.validity())
            .with_benchmarking_disabled(!config.benchmark.enabled);
        let engine = BenchmarkEngine::new(
            runner,
            config.benchmark.image.clone(),
            ConfigManager::builds_dir(),
        );

        Self::new(profile, runtimes, scores, engine)
            .with_include_build(config.benchmark.include_build)
            .with_lock(lock_path, config.benchmark.lock_timeout())
    }

    /// Hardware this selector was built for
    pub fn profile(&self) -> &HardwareProfile {
        &self.profile
    }

    /// Score cache backing this selector
    pub fn scores(&self) -> &ScoreCache {
        &self.scores
    }

    /// Snapshot of the discovered runtimes with their current scores
    pub async fn available_runtimes(&self) -> Vec<Runtime> {
        self.runtimes.read().await.clone()
    }

    /// Load persisted scores onto the runtime entries without benchmarking
    pub async fn load_cached_scores(&self) -> CapsuleResult<()> {
        self.scores.load().await?;
        self.apply_scores().await;
        Ok(())
    }

    /// Path of the best runtime
    pub async fn select_optimal(&self) -> String {
        let selection = self.selection().await;
        info!("Selected {} ({})", selection.path(), selection.reason());
        selection.path()
    }

    /// Decide on a runtime, benchmarking first if the cached scores are stale.
    pub async fn selection(&self) -> Selection {
        let runtimes = self.available_runtimes().await;

        if let Some(native) = self.fast_path(&runtimes) {
            debug!("Native Apple Silicon with {}, skipping benchmarks", NATIVE_RUNTIME);
            return Selection::FastPath(native);
        }

        if runtimes.is_empty() {
            return Selection::Default;
        }

        if self.scores.benchmarking_disabled() {
            debug!("Benchmarking disabled, using static priority");
            return Selection::Priority(runtimes[0].clone());
        }

        self.refresh_scores(&runtimes).await;

        let runtimes = self.available_runtimes().await;
        let cached = self.scores.cached().await;
        let best = runtimes
            .iter()
            .filter_map(|rt| {
                cached
                    .get(&rt.name)
                    .filter(|r| r.is_usable())
                    .map(|r| (rt, r.score))
            })
            .min_by(|(_, a), (_, b)| a.total_cmp(b));

        match best {
            Some((runtime, score)) => Selection::Benchmarked {
                runtime: runtime.clone(),
                score,
            },
            None => {
                debug!("No usable benchmark scores, using static priority");
                Selection::Priority(runtimes[0].clone())
            }
        }
    }

    /// Re-run the benchmark batch regardless of cache state and persist it.
    pub async fn force_benchmark(
        &self,
        include_build: bool,
    ) -> CapsuleResult<Vec<BenchmarkResult>> {
        self.force_benchmark_with_progress(include_build, &|_, _, _| {})
            .await
    }

    /// [`force_benchmark`](Self::force_benchmark) with a per-trial callback
    pub async fn force_benchmark_with_progress(
        &self,
        include_build: bool,
        on_trial: &(dyn Fn(usize, usize, &Runtime) + Send + Sync),
    ) -> CapsuleResult<Vec<BenchmarkResult>> {
        if self.scores.benchmarking_disabled() {
            return Err(CapsuleError::BenchmarkDisabled);
        }

        let runtimes = self.available_runtimes().await;
        if runtimes.is_empty() {
            return Err(CapsuleError::NoRuntimeAvailable);
        }

        let guard = self.lock_benchmarks().await;
        let results = self
            .run_batch(&runtimes, include_build, guard.as_ref(), on_trial)
            .await;
        self.scores.save(&self.profile, &results).await?;
        self.benchmarked.store(true, Ordering::Release);
        self.apply_scores().await;
        Ok(results)
    }

    /// How many times faster the chosen runtime is than the slowest other
    /// benchmarked runtime.
    pub async fn relative_speed(&self) -> Option<f64> {
        let Selection::Benchmarked { runtime, score } = self.selection().await else {
            return None;
        };

        let cached = self.scores.cached().await;
        let slowest = self
            .available_runtimes()
            .await
            .iter()
            .filter(|rt| rt.name != runtime.name)
            .filter_map(|rt| cached.get(&rt.name).filter(|r| r.is_usable()))
            .map(|r| r.score)
            .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))))?;

        Some(slowest / score)
    }

    /// Advice for the current host and runtime set.
    ///
    /// Reads scores already cached in memory or on disk; never benchmarks.
    pub async fn recommendations(&self) -> Vec<Recommendation> {
        let runtimes = self.available_runtimes().await;
        let mut advice = Vec::new();

        if self.profile.is_native_apple_silicon
            && !runtimes.iter().any(|rt| rt.name == NATIVE_RUNTIME)
        {
            advice.push(Recommendation::info(
                "Install Apple's `container` runtime for native virtualization on Apple Silicon",
            ));
        }

        if self.profile.is_translated_mac() {
            advice.push(Recommendation::warning(
                "Running under Rosetta translation; \
                 install a native arm64 build for better performance",
            ));
        }

        if runtimes.is_empty() {
            advice.push(Recommendation::warning(
                "No container runtime found; install Podman, Docker, nerdctl or Finch",
            ));
            return advice;
        }

        if self.scores.benchmarking_disabled() {
            advice.push(Recommendation::info(
                "Benchmarking is disabled; selection uses static priority only",
            ));
        }

        let mut cached = self.scores.cached().await;
        if cached.is_empty() {
            cached = self.scores.load().await.unwrap_or_default();
        }
        for rt in &runtimes {
            if let Some(error) = cached.get(&rt.name).and_then(|r| r.error.as_deref()) {
                if !error.is_empty() {
                    advice.push(Recommendation::warning(format!(
                        "Last benchmark of {} failed: {}",
                        rt.name, error
                    )));
                }
            }
        }

        if !runtimes
            .iter()
            .any(|rt| rt.has_capability(capabilities::BUILDKIT))
        {
            advice.push(Recommendation::info(
                "No runtime reports BuildKit support; install docker-buildx for faster builds",
            ));
        }

        advice
    }

    fn fast_path(&self, runtimes: &[Runtime]) -> Option<Runtime> {
        if !self.profile.is_native_apple_silicon {
            return None;
        }
        runtimes.iter().find(|rt| rt.name == NATIVE_RUNTIME).cloned()
    }

    /// Benchmark when stale, otherwise load what is on disk. Failures are
    /// logged and leave selection to the fallbacks.
    async fn refresh_scores(&self, runtimes: &[Runtime]) {
        if self.benchmarked.load(Ordering::Acquire) {
            debug!("Reusing this process's benchmark batch");
        } else if self.scores.is_stale(&self.profile, runtimes).await {
            let guard = self.lock_benchmarks().await;

            // Another process may have finished while we waited
            if guard.is_some() && !self.scores.is_stale(&self.profile, runtimes).await {
                debug!("Scores refreshed by another process");
                self.load_scores().await;
            } else {
                info!("Benchmarking {} runtime(s)", runtimes.len());
                let results = self
                    .run_batch(runtimes, self.include_build, guard.as_ref(), &|_, _, _| {})
                    .await;
                if let Err(e) = self.scores.save(&self.profile, &results).await {
                    warn!("Failed to save benchmark results: {}", e);
                    self.scores
                        .remember(
                            results
                                .into_iter()
                                .map(|r| (r.runtime_name.clone(), r))
                                .collect(),
                        )
                        .await;
                }
                self.benchmarked.store(true, Ordering::Release);
            }
        } else {
            self.load_scores().await;
        }

        self.apply_scores().await;
    }

    /// Run a batch, refreshing the lock file before each trial so long
    /// batches are not reclaimed as stale.
    async fn run_batch(
        &self,
        runtimes: &[Runtime],
        include_build: bool,
        guard: Option<&FileLock>,
        on_trial: &(dyn Fn(usize, usize, &Runtime) + Send + Sync),
    ) -> Vec<BenchmarkResult> {
        self.engine
            .run_batch_with_progress(runtimes, include_build, &|index, total, runtime| {
                if let Some(lock) = guard {
                    lock.touch();
                }
                on_trial(index, total, runtime);
            })
            .await
    }

    async fn load_scores(&self) {
        if let Err(e) = self.scores.load().await {
            warn!("Failed to load benchmark scores: {}", e);
        }
    }

    async fn lock_benchmarks(&self) -> Option<FileLock> {
        let (path, timeout) = self.lock.as_ref()?;
        match FileLock::acquire(path, *timeout).await {
            Ok(lock) => Some(lock),
            Err(e) => {
                warn!("{}; benchmarking without the lock", e);
                None
            }
        }
    }

    /// Copy in-memory scores onto the runtime entries
    async fn apply_scores(&self) {
        let cached: BTreeMap<String, BenchmarkResult> = self.scores.cached().await;
        let mut runtimes = self.runtimes.write().await;
        for rt in runtimes.iter_mut() {
            match cached.get(&rt.name) {
                Some(result) => {
                    rt.performance_score = if result.is_usable() { result.score } else { 0.0 };
                    rt.last_benchmarked = Some(result.timestamp);
                }
                None => {
                    rt.performance_score = 0.0;
                    rt.last_benchmarked = None;
                }
            }
        }
    }
}
