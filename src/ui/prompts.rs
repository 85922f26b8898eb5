//! Confirmation prompt with CI/non-interactive fallback

use super::context::UiContext;
use crate::error::{CapsuleError, CapsuleResult};

/// Ask for confirmation. `--yes` approves; non-interactive returns `default`.
pub async fn confirm(ctx: &UiContext, message: &str, default: bool) -> CapsuleResult<bool> {
    if ctx.auto_yes() {
        return Ok(true);
    }

    if !ctx.is_interactive() {
        return Ok(default);
    }

    // cliclack blocks on terminal input
    let message = message.to_string();
    tokio::task::spawn_blocking(move || {
        cliclack::confirm(&message)
            .initial_value(default)
            .interact()
    })
    .await
    .map_err(|e| CapsuleError::Internal(format!("prompt task failed: {}", e)))?
    .map_err(|e| CapsuleError::io("reading confirmation", e))
}
