//! Stuck-job sweeper.
//!
//! Callbacks can be lost. The sweeper fails jobs that have been silent for
//! longer than their class timeout and re-evaluates the affected bundles, so
//! a lost callback ends in a failed bundle instead of one stuck forever.

mod config;
mod runner;

pub use config::SweeperConfig;
pub use runner::{SweepReport, Sweeper};
