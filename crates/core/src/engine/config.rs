//! Stage engine configuration.

use serde::{Deserialize, Serialize};

use crate::ledger::RenderFormat;

/// Configuration for the stage engine and finalizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Formats rendered for every bundle.
    #[serde(default = "default_formats")]
    pub formats: Vec<RenderFormat>,

    /// Require every render output to be an absolute http(s) URL before
    /// completing. When disabled only presence is checked.
    #[serde(default = "default_validate_outputs")]
    pub validate_outputs: bool,
}

fn default_formats() -> Vec<RenderFormat> {
    RenderFormat::ALL.to_vec()
}

fn default_validate_outputs() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            formats: default_formats(),
            validate_outputs: default_validate_outputs(),
        }
    }
}
