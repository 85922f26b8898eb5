//! Info command - hardware, runtimes, scores and the current choice

use super::format_score;
use crate::config::Config;
use crate::error::CapsuleResult;
use crate::orchestration::{RuntimeSelector, Selection};
use crate::ui::{self, TaskSpinner, UiContext};
use tracing::debug;

/// Execute the info command
pub async fn execute(config: &Config) -> CapsuleResult<()> {
    let ctx = UiContext::detect();
    let selector = RuntimeSelector::from_config(config).await;
    if let Err(e) = selector.load_cached_scores().await {
        debug!("Ignoring unreadable score cache: {}", e);
    }

    ui::intro(&ctx, "Capsule");

    let profile = selector.profile();
    ui::section(&ctx, "Hardware");
    ui::key_value(&ctx, "Platform", profile.platform_name());
    ui::key_value(&ctx, "OS / arch", &format!("{} / {}", profile.os, profile.arch));
    ui::key_value(&ctx, "CPU cores", &profile.cpu_cores.to_string());
    ui::key_value(
        &ctx,
        "Memory",
        &if profile.memory_gb > 0 {
            format!("{} GB", profile.memory_gb)
        } else {
            "unknown".to_string()
        },
    );
    if profile.os == "macos" {
        let mode = if profile.is_native_apple_silicon {
            "native"
        } else if profile.is_translated_mac() {
            "translated (Rosetta)"
        } else {
            "no"
        };
        ui::key_value(&ctx, "Apple Silicon", mode);
    }

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start("Selecting runtime...");
    let selection = selector.selection().await;
    spinner.clear();

    ui::section(&ctx, "Runtimes");
    let runtimes = selector.available_runtimes().await;
    if runtimes.is_empty() {
        ui::step_warn_hint(
            &ctx,
            "No container runtime found",
            "Install podman, docker, nerdctl or finch",
        );
    }
    let chosen = selection.runtime().map(|rt| rt.name.clone());
    for rt in &runtimes {
        let line = format!(
            "{} {} (priority {}, score {})",
            rt.name,
            rt.version,
            rt.priority,
            format_score(rt.performance_score)
        );
        if chosen.as_deref() == Some(rt.name.as_str()) {
            ui::step_ok(&ctx, &line);
        } else {
            ui::step_info(&ctx, &line);
        }
    }

    ui::section(&ctx, "Selection");
    ui::key_value(&ctx, "Runtime", &selection.path());
    ui::key_value(&ctx, "Reason", selection.reason());
    if let Selection::Benchmarked { .. } = selection {
        if let Some(speed) = selector.relative_speed().await {
            ui::key_value(&ctx, "Relative speed", &format!("{:.2}x faster than slowest", speed));
        }
    }
    ui::key_value(
        &ctx,
        "Score cache",
        &selector.scores().path().display().to_string(),
    );
    if selector.scores().benchmarking_disabled() {
        ui::key_value(&ctx, "Benchmarking", "disabled");
    }

    Ok(())
}
