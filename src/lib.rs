//! Capsule - container runtime selection
//!
//! Detects the host hardware, discovers installed container runtimes,
//! benchmarks them, and remembers the fastest one. Also tracks
//! content-addressed "capsule" images built with the chosen runtime.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod hardware;
pub mod lock;
pub mod orchestration;
pub mod ui;

pub use error::{CapsuleError, CapsuleResult};
