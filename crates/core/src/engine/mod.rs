//! Stage transition engine: the bundle state machine.

mod config;
mod error;
mod stage_engine;
mod types;

pub use config::EngineConfig;
pub use error::EngineError;
pub use stage_engine::StageEngine;
pub use types::{Collaborators, GateOutcome, SubmitRequest};

pub(crate) use stage_engine::{fail_bundle, record_transition};
