//! Runtimes command - list discovered container runtimes

use super::format_score;
use crate::cli::args::{OutputFormat, RuntimesArgs};
use crate::config::Config;
use crate::error::CapsuleResult;
use crate::orchestration::{Runtime, RuntimeSelector};
use crate::ui::{self, UiContext};
use console::style;
use tracing::debug;

/// Execute the runtimes command
pub async fn execute(args: RuntimesArgs, config: &Config) -> CapsuleResult<()> {
    let selector = RuntimeSelector::from_config(config).await;
    if let Err(e) = selector.load_cached_scores().await {
        debug!("Ignoring unreadable score cache: {}", e);
    }
    let runtimes = selector.available_runtimes().await;

    if runtimes.is_empty() {
        match args.format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => {
                let ctx = UiContext::detect();
                ui::step_warn_hint(
                    &ctx,
                    "No container runtime found",
                    "Install podman, docker, nerdctl or finch",
                );
            }
        }
        return Ok(());
    }

    match args.format {
        OutputFormat::Table => print_table(&runtimes),
        OutputFormat::Json => print_json(&runtimes)?,
        OutputFormat::Plain => print_plain(&runtimes),
    }

    Ok(())
}

fn print_table(runtimes: &[Runtime]) {
    let ctx = UiContext::detect();
    ui::intro(&ctx, "Runtimes");

    println!(
        "{:<10} {:<9} {:<8} {:<14} {:<30}",
        style("NAME").bold(),
        style("PRIORITY").bold(),
        style("SCORE").bold(),
        style("VERSION").bold(),
        style("PATH").bold()
    );
    println!("{}", "-".repeat(75));

    for rt in runtimes {
        println!(
            "{:<10} {:<9} {:<8} {:<14} {:<30}",
            rt.name,
            rt.priority,
            format_score(rt.performance_score),
            rt.version,
            rt.path.display()
        );
        if !rt.capabilities.is_empty() {
            let caps: Vec<&str> = rt.capabilities.iter().map(String::as_str).collect();
            println!("{:<10} {}", "", style(caps.join(", ")).dim());
        }
    }

    println!();
    println!("{} runtime(s)", runtimes.len());
}

fn print_json(runtimes: &[Runtime]) -> CapsuleResult<()> {
    println!("{}", serde_json::to_string_pretty(runtimes)?);
    Ok(())
}

fn print_plain(runtimes: &[Runtime]) {
    for rt in runtimes {
        println!("{}\t{}", rt.name, rt.path.display());
    }
}
