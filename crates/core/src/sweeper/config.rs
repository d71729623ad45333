//! Sweeper configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the stuck-job sweeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Enable/disable the background loop.
    /// `sweep_once` works either way.
    #[serde(default)]
    pub enabled: bool,

    /// How often to look for stuck jobs (seconds).
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Asset jobs without a callback for this long are failed (seconds).
    #[serde(default = "default_asset_timeout")]
    pub asset_timeout_secs: u64,

    /// Render jobs without a callback for this long are failed (seconds).
    #[serde(default = "default_render_timeout")]
    pub render_timeout_secs: u64,
}

fn default_interval() -> u64 {
    60
}

fn default_asset_timeout() -> u64 {
    1800 // 30 minutes
}

fn default_render_timeout() -> u64 {
    3600 // 1 hour
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_interval(),
            asset_timeout_secs: default_asset_timeout(),
            render_timeout_secs: default_render_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SweeperConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.interval_secs, 60);
        assert_eq!(config.asset_timeout_secs, 1800);
        assert_eq!(config.render_timeout_secs, 3600);
    }

    #[test]
    fn test_deserialize_partial() {
        let toml = r#"
            enabled = true
            render_timeout_secs = 600
        "#;
        let config: SweeperConfig = toml::from_str(toml).unwrap();
        assert!(config.enabled);
        assert_eq!(config.interval_secs, 60);
        assert_eq!(config.render_timeout_secs, 600);
    }
}
