//! CLI command implementations

pub mod benchmark;
pub mod capsule;
pub mod completions;
pub mod config;
pub mod info;
pub mod recommend;
pub mod runtimes;
pub mod select;

pub use benchmark::execute as benchmark;
pub use capsule::execute as capsule;
pub use completions::execute as completions;
pub use config::execute as config;
pub use info::execute as info;
pub use recommend::execute as recommend;
pub use runtimes::execute as runtimes;
pub use select::execute as select;

/// Render a normalized score for tables (`-` when not benchmarked)
pub(crate) fn format_score(score: f64) -> String {
    if score > 0.0 {
        format!("{:.2}x", score)
    } else {
        "-".to_string()
    }
}
