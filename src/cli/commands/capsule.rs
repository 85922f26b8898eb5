//! Capsule command - query and maintain capsule images

use crate::cache::{
    capsule_tag_with_prefix, CapsuleCache, CapsuleManager, ClearReport, ImageDetails,
};
use crate::cli::args::{CapsuleAction, CapsuleArgs, OutputFormat};
use crate::config::Config;
use crate::error::{CapsuleError, CapsuleResult};
use crate::exec::{CommandRunner, SystemRunner};
use crate::orchestration::RuntimeSelector;
use crate::ui::{self, UiContext};
use console::style;
use std::sync::Arc;

/// Execute the capsule command
pub async fn execute(args: CapsuleArgs, config: &Config) -> CapsuleResult<()> {
    // Tags are computed locally; no runtime needed
    if let CapsuleAction::Tag { base, parts } = &args.action {
        print_tag(config, base, parts);
        return Ok(());
    }

    let selector = RuntimeSelector::from_config(config).await;
    let runtime = selector.select_optimal().await;
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    let cache = CapsuleCache::new(runner, runtime).with_ttl(config.capsule.ttl());
    let manager = CapsuleManager::new(Arc::new(cache)).with_prefix(config.capsule.prefix.clone());

    run_action(args.action, &manager, config, &UiContext::detect()).await
}

async fn run_action(
    action: CapsuleAction,
    manager: &CapsuleManager,
    config: &Config,
    ctx: &UiContext,
) -> CapsuleResult<()> {
    match action {
        CapsuleAction::Exists { tag } => {
            println!("{}", manager.capsule(tag).exists().await?);
        }
        CapsuleAction::Inspect { tag, format } => {
            let (exists, details) = manager.capsule(tag.as_str()).details().await?;
            let details = match (exists, details) {
                (true, Some(details)) => details,
                _ => return Err(CapsuleError::User(format!("Image {} not found", tag))),
            };
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&details)?),
                OutputFormat::Plain => print_details_plain(&details),
                OutputFormat::Table => print_details(ctx, &details),
            }
        }
        CapsuleAction::Verify { tag, digest } => {
            if !manager.capsule(tag.as_str()).verify(&digest).await {
                return Err(CapsuleError::DigestMismatch {
                    tag,
                    expected: digest,
                });
            }
            ui::step_ok_detail(ctx, "Digest verified", &tag);
        }
        CapsuleAction::List { format } => {
            let images = manager.list().await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&images)?),
                OutputFormat::Plain => images.iter().for_each(|image| println!("{}", image)),
                OutputFormat::Table if images.is_empty() => ui::step_info(ctx, "No capsules"),
                OutputFormat::Table => {
                    ui::intro(ctx, "Capsules");
                    for image in &images {
                        println!("  {}", image);
                    }
                    println!();
                    println!("{} capsule(s)", images.len());
                }
            }
        }
        CapsuleAction::Clear {
            older_than,
            all,
            yes,
        } => {
            let ctx = ctx.clone().with_auto_yes(yes);
            let prompt = if all {
                "Remove every capsule image?".to_string()
            } else {
                let days = older_than.unwrap_or(config.capsule.max_age_days);
                format!("Remove capsule images older than {} day(s)?", days)
            };

            if !ui::confirm(&ctx, &prompt, false).await? {
                ui::step_warn_hint(&ctx, "Nothing removed", "Pass --yes to skip confirmation");
                return Ok(());
            }

            let report = if all {
                manager.clear_all().await?
            } else {
                let days = older_than.unwrap_or(config.capsule.max_age_days);
                manager
                    .clear_old(chrono::Duration::days(i64::from(days)))
                    .await?
            };
            print_report(&ctx, &report);
        }
        CapsuleAction::Tag { base, parts } => print_tag(config, &base, &parts),
    }

    Ok(())
}

fn print_tag(config: &Config, base: &str, parts: &[String]) {
    let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
    println!("{}", capsule_tag_with_prefix(&config.capsule.prefix, base, &parts));
}

fn print_details(ctx: &UiContext, details: &ImageDetails) {
    ui::intro(ctx, &details.tag);
    ui::key_value(ctx, "Created", &details.created_at.to_rfc3339());
    ui::key_value(ctx, "Size", &format_size(details.size_bytes));
    ui::key_value(ctx, "Architecture", &details.architecture);
    if details.repo_digests.is_empty() {
        ui::key_value(ctx, "Digests", &style("none").dim().to_string());
    }
    for digest in &details.repo_digests {
        ui::key_value(ctx, "Digest", digest);
    }
}

fn print_details_plain(details: &ImageDetails) {
    println!("tag\t{}", details.tag);
    println!("created\t{}", details.created_at.to_rfc3339());
    println!("size\t{}", details.size_bytes);
    println!("architecture\t{}", details.architecture);
    for digest in &details.repo_digests {
        println!("digest\t{}", digest);
    }
}

fn print_report(ctx: &UiContext, report: &ClearReport) {
    for (image, reason) in &report.failed {
        ui::step_error_detail(ctx, image, reason);
    }
    ui::step_ok(ctx, &format!("Removed {} capsule(s)", report.removed.len()));
}

/// Human-readable byte size
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
