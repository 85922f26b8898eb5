//! Subprocess execution boundary
//!
//! Every external command the core runs (version checks, builds, runs, image
//! listing, inspect) goes through [`CommandRunner`] so tests can swap in a
//! scripted stand-in without touching a real container engine.

use crate::error::{CapsuleError, CapsuleResult};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Captured result of a finished subprocess
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Whether the process exited with status 0
    pub success: bool,
    /// Exit code, if the process was not killed by a signal
    pub code: Option<i32>,
    /// Captured stdout (lossy UTF-8)
    pub stdout: String,
    /// Captured stderr (lossy UTF-8)
    pub stderr: String,
}

impl CommandOutput {
    /// A successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// First non-empty line of stdout, trimmed
    pub fn first_line(&self) -> Option<&str> {
        self.stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

/// Abstract subprocess interface
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` to completion and capture its output.
    ///
    /// Returns `Err` only when the process could not be spawned; a non-zero
    /// exit is reported through [`CommandOutput::success`].
    async fn run(&self, program: &str, args: &[&str]) -> CapsuleResult<CommandOutput>;
}

/// Runs commands as real child processes via tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[&str]) -> CapsuleResult<CommandOutput> {
        debug!("Executing: {}", display_command(program, args));

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| CapsuleError::command_failed(display_command(program, args), e))?;

        Ok(output.into())
    }
}

/// Render a command line for logs and error messages
pub fn display_command(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner shared by unit tests across modules.

    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    enum Reply {
        Output(CommandOutput),
        SpawnError,
    }

    struct Rule {
        needle: String,
        reply: Reply,
        delay: Option<Duration>,
    }

    /// Matches each command line against registered needles (first match
    /// wins) and records every invocation.
    #[derive(Default)]
    pub(crate) struct ScriptedRunner {
        rules: Vec<Rule>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn on(mut self, needle: &str, output: CommandOutput) -> Self {
            self.rules.push(Rule {
                needle: needle.to_string(),
                reply: Reply::Output(output),
                delay: None,
            });
            self
        }

        pub(crate) fn on_slow(
            mut self,
            needle: &str,
            output: CommandOutput,
            delay: Duration,
        ) -> Self {
            self.rules.push(Rule {
                needle: needle.to_string(),
                reply: Reply::Output(output),
                delay: Some(delay),
            });
            self
        }

        pub(crate) fn spawn_error(mut self, needle: &str) -> Self {
            self.rules.push(Rule {
                needle: needle.to_string(),
                reply: Reply::SpawnError,
                delay: None,
            });
            self
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub(crate) fn count(&self, needle: &str) -> usize {
            self.calls()
                .iter()
                .filter(|line| line.contains(needle))
                .count()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, program: &str, args: &[&str]) -> CapsuleResult<CommandOutput> {
            let line = display_command(program, args);
            self.calls.lock().unwrap().push(line.clone());

            let Some(rule) = self.rules.iter().find(|r| line.contains(&r.needle)) else {
                return Ok(CommandOutput::failed(127, format!("unscripted: {}", line)));
            };

            if let Some(delay) = rule.delay {
                tokio::time::sleep(delay).await;
            }

            match &rule.reply {
                Reply::Output(output) => Ok(output.clone()),
                Reply::SpawnError => Err(CapsuleError::command_failed(
                    line,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_command_joins_args() {
        assert_eq!(display_command("docker", &[]), "docker");
        assert_eq!(
            display_command("docker", &["images", "-q"]),
            "docker images -q"
        );
    }

    #[test]
    fn first_line_skips_blank_lines() {
        let output = CommandOutput::ok("\n  podman version 5.2.1  \nextra\n");
        assert_eq!(output.first_line(), Some("podman version 5.2.1"));
        assert_eq!(CommandOutput::ok("").first_line(), None);
    }

    #[tokio::test]
    async fn system_runner_reports_spawn_failure() {
        let err = SystemRunner
            .run("capsule-definitely-not-a-binary", &["--version"])
            .await
            .unwrap_err();
        assert!(matches!(err, CapsuleError::CommandFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn system_runner_captures_output() {
        let output = SystemRunner.run("sh", &["-c", "echo hi; exit 3"]).await.unwrap();
        assert!(!output.success);
        assert_eq!(output.code, Some(3));
        assert_eq!(output.stdout.trim(), "hi");
    }
}
