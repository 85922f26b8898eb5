//! Benchmark command - re-run the runtime benchmark now

use super::format_score;
use crate::cli::args::{BenchmarkArgs, OutputFormat};
use crate::config::Config;
use crate::error::CapsuleResult;
use crate::orchestration::{BenchmarkResult, RuntimeSelector};
use crate::ui::{self, BenchmarkProgress, UiContext};
use console::style;

/// Execute the benchmark command
pub async fn execute(args: BenchmarkArgs, config: &Config) -> CapsuleResult<()> {
    // JSON and plain output stay machine-readable
    let ctx = match args.format {
        OutputFormat::Table => UiContext::detect(),
        _ => UiContext::non_interactive(),
    };
    let include_build = args.build || config.benchmark.include_build;
    let selector = RuntimeSelector::from_config(config).await;

    let runtimes = selector.available_runtimes().await;
    if args.format == OutputFormat::Table {
        ui::intro(&ctx, "Benchmark");
        ui::key_value(&ctx, "Image", &config.benchmark.image);
        ui::key_value(
            &ctx,
            "Mode",
            if include_build { "build+exec" } else { "exec" },
        );
    }

    let progress = args
        .format
        .eq(&OutputFormat::Table)
        .then(|| BenchmarkProgress::new(&ctx, runtimes.len()));
    let outcome = selector
        .force_benchmark_with_progress(include_build, &|index, total, runtime| {
            if let Some(progress) = &progress {
                progress.on_trial(index, total, runtime);
            }
        })
        .await;
    if let Some(progress) = &progress {
        progress.finish();
    }
    let mut results = outcome?;
    sort_results(&mut results);

    match args.format {
        OutputFormat::Table => print_table(&ctx, &results),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
        OutputFormat::Plain => {
            for result in &results {
                println!("{}\t{}", result.runtime_name, result.score);
            }
        }
    }

    Ok(())
}

/// Usable results by ascending score, failures last
fn sort_results(results: &mut [BenchmarkResult]) {
    results.sort_by(|a, b| {
        b.is_usable()
            .cmp(&a.is_usable())
            .then_with(|| a.score.total_cmp(&b.score))
    });
}

fn print_table(ctx: &UiContext, results: &[BenchmarkResult]) {
    println!();
    println!(
        "{:<10} {:<8} {:<10} {:<30}",
        style("RUNTIME").bold(),
        style("SCORE").bold(),
        style("TIME").bold(),
        style("STATUS").bold()
    );
    println!("{}", "-".repeat(60));

    for result in results {
        let status = match &result.error {
            Some(error) if !error.is_empty() => style(first_line(error)).red(),
            _ => style("ok").green(),
        };
        println!(
            "{:<10} {:<8} {:<10} {}",
            result.runtime_name,
            format_score(result.score),
            format!("{:.2}s", result.total_duration().as_secs_f64()),
            status
        );
    }

    match results.iter().find(|r| r.is_usable()) {
        Some(best) => ui::outro(ctx, &format!("Fastest: {}", best.runtime_name)),
        None => ui::step_warn_hint(
            ctx,
            "Every runtime failed the benchmark",
            "Selection falls back to static priority",
        ),
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::BenchmarkMode;
    use chrono::Utc;
    use std::time::Duration;

    fn result(name: &str, score: f64, error: Option<&str>) -> BenchmarkResult {
        BenchmarkResult {
            runtime_name: name.to_string(),
            build_duration: Duration::ZERO,
            start_duration: Duration::from_millis(500),
            exec_duration: Duration::from_millis(500),
            score,
            timestamp: Utc::now(),
            error: error.map(str::to_string),
            mode: BenchmarkMode::Exec,
        }
    }

    #[test]
    fn sort_puts_fastest_first_and_failures_last() {
        let mut results = vec![
            result("docker", 0.0, Some("daemon not running")),
            result("nerdctl", 2.5, None),
            result("podman", 1.0, None),
        ];
        sort_results(&mut results);

        let names: Vec<_> = results.iter().map(|r| r.runtime_name.as_str()).collect();
        assert_eq!(names, vec!["podman", "nerdctl", "docker"]);
    }

    #[test]
    fn first_line_of_multiline_error() {
        assert_eq!(first_line("pull failed\ndetails"), "pull failed");
        assert_eq!(first_line(""), "");
    }
}
