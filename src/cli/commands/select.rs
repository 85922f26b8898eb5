//! Select command - print the path of the best runtime
//!
//! Stdout carries only the path so the output can be used in scripts:
//! `$(capsule select) run --rm alpine true`.

use crate::config::Config;
use crate::error::CapsuleResult;
use crate::orchestration::RuntimeSelector;

/// Execute the select command
pub async fn execute(config: &Config) -> CapsuleResult<()> {
    let selector = RuntimeSelector::from_config(config).await;
    println!("{}", selector.select_optimal().await);
    Ok(())
}
