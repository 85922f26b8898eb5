//! Terminal output
//!
//! Uses `cliclack` for spinners, log lines and prompts and `indicatif` for
//! the benchmark bar, falling back to plain lines in CI or when piped.
//!
//! ```rust,ignore
//! let ctx = UiContext::detect();
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Selecting runtime...");
//! spinner.clear();
//! ui::step_warn_hint(&ctx, "Benchmark of docker failed", "Is the daemon running?");
//! ```

mod context;
mod output;
mod progress;
mod prompts;

pub use context::UiContext;
pub use output::{
    intro, key_value, outro, section, step_error_detail, step_info, step_ok, step_ok_detail,
    step_warn, step_warn_hint,
};
pub use progress::{BenchmarkProgress, TaskSpinner};
pub use prompts::confirm;
