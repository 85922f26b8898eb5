//! Recommend command - advice for this host

use crate::config::Config;
use crate::error::CapsuleResult;
use crate::orchestration::{Level, RuntimeSelector};
use crate::ui::{self, UiContext};
use tracing::debug;

/// Execute the recommend command
pub async fn execute(config: &Config) -> CapsuleResult<()> {
    let ctx = UiContext::detect();
    let selector = RuntimeSelector::from_config(config).await;
    if let Err(e) = selector.load_cached_scores().await {
        debug!("Ignoring unreadable score cache: {}", e);
    }

    let advice = selector.recommendations().await;
    if advice.is_empty() {
        ui::step_ok(&ctx, "Nothing to recommend");
        return Ok(());
    }

    for item in &advice {
        match item.level {
            Level::Info => ui::step_info(&ctx, &item.message),
            Level::Warning => ui::step_warn(&ctx, &item.message),
        }
    }

    Ok(())
}
