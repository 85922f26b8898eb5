//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// Capsule - pick the fastest container runtime on this machine
///
/// Discovers installed container engines, benchmarks them, caches the
/// ranking, and tracks previously built capsule images.
#[derive(Parser, Debug)]
#[command(name = "capsule")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "CAPSULE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the path of the best container runtime
    Select,

    /// List discovered container runtimes
    Runtimes(RuntimesArgs),

    /// Show hardware, runtimes, scores and the current choice
    Info,

    /// Re-run the runtime benchmark now
    Benchmark(BenchmarkArgs),

    /// Suggest improvements for this machine
    Recommend,

    /// Query and maintain capsule images
    Capsule(CapsuleArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

/// Arguments for the runtimes command
#[derive(Parser, Debug)]
pub struct RuntimesArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the benchmark command
#[derive(Parser, Debug)]
pub struct BenchmarkArgs {
    /// Include an image build in each trial
    #[arg(long)]
    pub build: bool,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show effective configuration (file plus environment)
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration file
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Arguments for the capsule command
#[derive(Parser, Debug)]
pub struct CapsuleArgs {
    /// Subcommand for capsule
    #[command(subcommand)]
    pub action: CapsuleAction,
}

/// Capsule subcommands
#[derive(Subcommand, Debug)]
pub enum CapsuleAction {
    /// Check whether an image exists (prints true/false)
    Exists {
        /// Image tag
        tag: String,
    },

    /// Show image metadata
    Inspect {
        /// Image tag
        tag: String,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Verify that an image carries the expected digest
    Verify {
        /// Image tag
        tag: String,

        /// Expected digest (substring match against repo digests)
        digest: String,
    },

    /// List capsule images
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove old capsule images (default age from config)
    Clear {
        /// Remove capsules older than N days (default: capsule.max_age_days)
        #[arg(long, value_name = "DAYS")]
        older_than: Option<u32>,

        /// Remove every capsule regardless of age
        #[arg(long, conflicts_with = "older_than")]
        all: bool,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Print the content-addressed tag for a base image and build inputs
    Tag {
        /// Base image
        base: String,

        /// Additional build inputs, hashed in order
        parts: Vec<String>,
    },
}

/// Output format for listing commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}
