//! Progress indicators with CI fallback

use super::context::UiContext;
use crate::orchestration::Runtime;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    /// Start the spinner. Plain mode stays silent.
    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        }
    }

    /// Remove the spinner without printing anything
    pub fn clear(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.clear();
        }
    }
}

/// Per-runtime progress for a benchmark batch.
///
/// An indicatif bar in interactive mode, one line per trial otherwise.
pub struct BenchmarkProgress {
    bar: Option<ProgressBar>,
}

impl BenchmarkProgress {
    pub fn new(ctx: &UiContext, total: usize) -> Self {
        let bar = ctx.use_fancy_output().then(|| {
            let bar = ProgressBar::new(total as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template(concat!(
                        "  {spinner:.cyan} Benchmarking {bar:20.cyan/dim} ",
                        "{pos}/{len} {msg}  {elapsed:.dim}",
                    ))
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                    .progress_chars("━╸─"),
            );
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            bar
        });
        Self { bar }
    }

    /// Called before each trial with `(index, total, runtime)`
    pub fn on_trial(&self, index: usize, total: usize, runtime: &Runtime) {
        match &self.bar {
            Some(bar) => {
                bar.set_position(index as u64);
                bar.set_message(runtime.name.clone());
            }
            None => println!(
                "  {} [{}/{}] {}",
                style("...").dim(),
                index + 1,
                total,
                runtime.name
            ),
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}
