//! Hardware fingerprinting
//!
//! Detects OS, architecture and whether the process runs natively on Apple
//! Silicon. The profile is computed once per process and doubles as the
//! fingerprint stored next to cached benchmark scores.

use crate::exec::CommandRunner;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Snapshot of the host hardware
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareProfile {
    /// Operating system (`std::env::consts::OS`, e.g. "macos", "linux")
    pub os: String,
    /// CPU architecture (`std::env::consts::ARCH`, e.g. "aarch64", "x86_64")
    pub arch: String,
    /// Apple Silicon running native code (not under Rosetta)
    #[serde(rename = "apple_silicon")]
    pub is_native_apple_silicon: bool,
    /// Logical CPU count
    pub cpu_cores: usize,
    /// Physical memory in whole gigabytes (0 if unknown)
    pub memory_gb: u64,
}

impl HardwareProfile {
    /// Detect the current host.
    ///
    /// Never fails: a translation check that cannot run is treated as
    /// "not translated".
    pub async fn detect(runner: &dyn CommandRunner) -> Self {
        let os = std::env::consts::OS.to_string();
        let arch = std::env::consts::ARCH.to_string();

        let mut native = is_apple_arm(&os, &arch);
        if native && is_translated(runner).await {
            debug!("Process runs under binary translation, disabling native fast path");
            native = false;
        }

        let profile = Self {
            os,
            arch,
            is_native_apple_silicon: native,
            cpu_cores: num_cpus::get(),
            memory_gb: total_memory_gb(),
        };
        debug!("Detected hardware: {}", profile);
        profile
    }

    /// Whether two profiles describe the same hardware class.
    ///
    /// Only OS, architecture and the Apple Silicon flag take part; core
    /// count and memory may drift without invalidating benchmarks.
    pub fn matches(&self, other: &HardwareProfile) -> bool {
        self.os == other.os
            && self.arch == other.arch
            && self.is_native_apple_silicon == other.is_native_apple_silicon
    }

    /// Human-readable platform label
    pub fn platform_name(&self) -> &'static str {
        match (self.os.as_str(), self.is_native_apple_silicon) {
            ("macos", true) => "macOS (Apple Silicon)",
            ("macos", false) => "macOS",
            ("linux", _) => "Linux",
            ("windows", _) => "Windows",
            _ => "Unknown",
        }
    }

    /// Apple hardware running translated code
    pub fn is_translated_mac(&self) -> bool {
        self.os == "macos" && self.arch == "aarch64" && !self.is_native_apple_silicon
    }
}

impl fmt::Display for HardwareProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ({} cores, {} GB{})",
            self.os,
            self.arch,
            self.cpu_cores,
            self.memory_gb,
            if self.is_native_apple_silicon {
                ", native Apple Silicon"
            } else {
                ""
            }
        )
    }
}

#[cfg(test)]
impl HardwareProfile {
    /// Fixed profile for tests in other modules
    pub(crate) fn fixture(os: &str, arch: &str, native: bool) -> Self {
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
            is_native_apple_silicon: native,
            cpu_cores: 8,
            memory_gb: 16,
        }
    }
}

fn is_apple_arm(os: &str, arch: &str) -> bool {
    os == "macos" && arch == "aarch64"
}

/// Ask the kernel whether this process is being translated by Rosetta
async fn is_translated(runner: &dyn CommandRunner) -> bool {
    match runner
        .run("sysctl", &["-n", "sysctl.proc_translated"])
        .await
    {
        Ok(output) if output.success => output.stdout.trim() == "1",
        Ok(_) => false,
        Err(e) => {
            debug!("Translation check failed, assuming native: {}", e);
            false
        }
    }
}

#[cfg(unix)]
fn total_memory_gb() -> u64 {
    // SAFETY: sysconf has no preconditions and only reads system configuration.
    let (pages, page_size) =
        unsafe { (libc::sysconf(libc::_SC_PHYS_PAGES), libc::sysconf(libc::_SC_PAGESIZE)) };
    if pages <= 0 || page_size <= 0 {
        return 0;
    }
    (pages as u64).saturating_mul(page_size as u64) / (1024 * 1024 * 1024)
}

#[cfg(not(unix))]
fn total_memory_gb() -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::ScriptedRunner;
    use crate::exec::CommandOutput;

    fn profile(os: &str, arch: &str, native: bool) -> HardwareProfile {
        HardwareProfile::fixture(os, arch, native)
    }

    #[test]
    fn apple_arm_detection() {
        assert!(is_apple_arm("macos", "aarch64"));
        assert!(!is_apple_arm("macos", "x86_64"));
        assert!(!is_apple_arm("linux", "aarch64"));
    }

    #[tokio::test]
    async fn translated_when_sysctl_reports_one() {
        let runner = ScriptedRunner::new().on("proc_translated", CommandOutput::ok("1\n"));
        assert!(is_translated(&runner).await);
    }

    #[tokio::test]
    async fn translation_check_failure_fails_open() {
        let runner = ScriptedRunner::new().spawn_error("sysctl");
        assert!(!is_translated(&runner).await);

        let runner = ScriptedRunner::new().on("sysctl", CommandOutput::failed(1, "unknown oid"));
        assert!(!is_translated(&runner).await);
    }

    #[tokio::test]
    async fn detect_uses_process_environment() {
        let runner = ScriptedRunner::new().on("proc_translated", CommandOutput::ok("0"));
        let detected = HardwareProfile::detect(&runner).await;

        assert_eq!(detected.os, std::env::consts::OS);
        assert_eq!(detected.arch, std::env::consts::ARCH);
        assert!(detected.cpu_cores >= 1);
        assert_eq!(
            detected.is_native_apple_silicon,
            is_apple_arm(std::env::consts::OS, std::env::consts::ARCH)
        );
    }

    #[test]
    fn matches_ignores_cores_and_memory() {
        let a = profile("linux", "x86_64", false);
        let mut b = a.clone();
        b.cpu_cores = 64;
        b.memory_gb = 256;
        assert!(a.matches(&b));

        assert!(!a.matches(&profile("linux", "aarch64", false)));
        assert!(!profile("macos", "aarch64", true).matches(&profile("macos", "aarch64", false)));
    }

    #[test]
    fn fingerprint_json_field_names() {
        let json = serde_json::to_value(profile("macos", "aarch64", true)).unwrap();
        assert_eq!(json["apple_silicon"], true);
        assert_eq!(json["os"], "macos");
        assert_eq!(json["cpu_cores"], 8);
        assert_eq!(json["memory_gb"], 16);
    }

    #[test]
    fn platform_names() {
        assert_eq!(
            profile("macos", "aarch64", true).platform_name(),
            "macOS (Apple Silicon)"
        );
        assert_eq!(profile("linux", "x86_64", false).platform_name(), "Linux");
        assert!(profile("macos", "aarch64", false).is_translated_mac());
    }
}
