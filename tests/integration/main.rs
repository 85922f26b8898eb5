//! Integration tests for Capsule

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Isolated home, config, state and an empty PATH
    struct Sandbox {
        dir: TempDir,
    }

    impl Sandbox {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::create_dir_all(dir.path().join("bin")).unwrap();
            let sandbox = Self { dir };
            sandbox.write_config("");
            sandbox
        }

        fn root(&self) -> &Path {
            self.dir.path()
        }

        fn config_path(&self) -> PathBuf {
            self.root().join("config.toml")
        }

        fn score_cache(&self) -> PathBuf {
            self.root().join("benchmarks.json")
        }

        /// Write a config whose score cache lives inside the sandbox
        fn write_config(&self, extra: &str) {
            let content = format!(
                "[benchmark]\ncache_path = {:?}\n{}",
                self.score_cache().display().to_string(),
                extra
            );
            std::fs::write(self.config_path(), content).unwrap();
        }

        fn cmd(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("capsule");
            cmd.env_clear()
                .env("HOME", self.root())
                .env("XDG_CONFIG_HOME", self.root().join("xdg-config"))
                .env("XDG_STATE_HOME", self.root().join("xdg-state"))
                .env("PATH", self.root().join("bin"))
                .env("CAPSULE_CONFIG", self.config_path());
            cmd
        }

        /// Install a shell script posing as podman that echoes the benchmark marker
        #[cfg(unix)]
        fn install_fake_podman(&self) -> PathBuf {
            use std::os::unix::fs::PermissionsExt;

            let path = self.root().join("bin").join("podman");
            let script = r#"#!/bin/sh
case "$1" in
  --version) echo "podman version 5.2.1" ;;
  run) for last; do :; done; echo "$last" ;;
  *) exit 0 ;;
esac
"#;
            std::fs::write(&path, script).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }
    }

    #[test]
    fn help_displays() {
        Sandbox::new()
            .cmd()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("fastest container runtime"));
    }

    #[test]
    fn version_displays() {
        Sandbox::new()
            .cmd()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("capsule"));
    }

    #[test]
    fn select_without_runtimes_prints_default() {
        Sandbox::new()
            .cmd()
            .arg("select")
            .env("CAPSULE_NO_BENCHMARK", "1")
            .assert()
            .success()
            .stdout("docker\n");
    }

    #[test]
    fn benchmark_disabled_is_reported() {
        Sandbox::new()
            .cmd()
            .arg("benchmark")
            .env("CAPSULE_NO_BENCHMARK", "true")
            .assert()
            .failure()
            .stderr(predicate::str::contains("disabled"));
    }

    #[test]
    fn runtimes_json_empty() {
        Sandbox::new()
            .cmd()
            .args(["runtimes", "--format", "json"])
            .assert()
            .success()
            .stdout("[]\n");
    }

    #[test]
    fn config_path_honours_flag() {
        let sandbox = Sandbox::new();
        sandbox
            .cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_init_then_show() {
        let sandbox = Sandbox::new();
        let path = sandbox.root().join("fresh").join("config.toml");

        sandbox
            .cmd()
            .args(["config", "init"])
            .env("CAPSULE_CONFIG", &path)
            .assert()
            .success();
        assert!(path.exists());

        sandbox
            .cmd()
            .args(["config", "show"])
            .env("CAPSULE_CONFIG", &path)
            .assert()
            .success()
            .stdout(predicate::str::contains("[benchmark]"))
            .stdout(predicate::str::contains("alpine:latest"));
    }

    #[test]
    fn config_show_applies_env_overrides() {
        Sandbox::new()
            .cmd()
            .args(["config", "show"])
            .env("CAPSULE_BENCHMARK_IMAGE", "busybox:1.36")
            .assert()
            .success()
            .stdout(predicate::str::contains("busybox:1.36"));
    }

    #[test]
    fn invalid_config_fails() {
        let sandbox = Sandbox::new();
        std::fs::write(sandbox.config_path(), "[benchmark\n").unwrap();
        sandbox
            .cmd()
            .arg("select")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn capsule_tag_is_deterministic() {
        let sandbox = Sandbox::new();
        let first = sandbox
            .cmd()
            .args(["capsule", "tag", "alpine:3.20", "git", "curl"])
            .assert()
            .success()
            .stdout(predicate::str::is_match("^capsule-[0-9a-f]{12}\n$").unwrap())
            .get_output()
            .stdout
            .clone();

        sandbox
            .cmd()
            .args(["capsule", "tag", "alpine:3.20", "git", "curl"])
            .assert()
            .success()
            .stdout(String::from_utf8(first.clone()).unwrap());

        sandbox
            .cmd()
            .args(["capsule", "tag", "alpine:3.20", "curl", "git"])
            .assert()
            .success()
            .stdout(predicate::ne(String::from_utf8(first).unwrap()));
    }

    #[test]
    fn capsule_tag_uses_configured_prefix() {
        let sandbox = Sandbox::new();
        sandbox.write_config("\n[capsule]\nprefix = \"ci-\"\n");
        sandbox
            .cmd()
            .args(["capsule", "tag", "alpine:3.20"])
            .assert()
            .success()
            .stdout(predicate::str::starts_with("ci-"));
    }

    #[test]
    fn completions_generate() {
        Sandbox::new()
            .cmd()
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("capsule"));
    }

    #[cfg(unix)]
    #[test]
    fn select_benchmarks_fake_runtime_and_caches_scores() {
        let sandbox = Sandbox::new();
        let podman = sandbox.install_fake_podman();

        sandbox
            .cmd()
            .arg("select")
            .assert()
            .success()
            .stdout(format!("{}\n", podman.display()));

        let cache = std::fs::read_to_string(sandbox.score_cache()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&cache).unwrap();
        assert_eq!(json["results"]["podman"]["runtime"], "podman");
        assert_eq!(json["results"]["podman"]["score"], 1.0);
    }

    #[cfg(unix)]
    #[test]
    fn runtimes_lists_fake_runtime() {
        let sandbox = Sandbox::new();
        sandbox.install_fake_podman();

        sandbox
            .cmd()
            .args(["runtimes", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::starts_with("podman\t"));
    }
}
