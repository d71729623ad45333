use std::collections::HashSet;

use super::{types::Config, AuthMethod, ConfigError};

/// Validate configuration.
///
/// Checks what serde cannot: cross-field rules and required secrets.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    if config.auth.method == AuthMethod::ApiKey
        && config.auth.api_key.as_deref().is_none_or(str::is_empty)
    {
        return Err(invalid(
            "auth.api_key must be set when auth.method = \"api_key\"",
        ));
    }

    let secret_missing = config.webhook.secret.as_deref().is_none_or(str::is_empty);
    if secret_missing && !config.webhook.dev_mode {
        return Err(invalid(
            "webhook.secret is required unless webhook.dev_mode = true",
        ));
    }

    match reqwest::Url::parse(&config.webhook.public_base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        _ => {
            return Err(invalid(
                "webhook.public_base_url must be an absolute http(s) URL",
            ))
        }
    }

    let services = &config.services;
    for (name, service) in [
        ("analyzer", &services.analyzer),
        ("asset_generator", &services.asset_generator),
        ("script_generator", &services.script_generator),
        ("renderer", &services.renderer),
    ] {
        match service {
            None => {
                return Err(ConfigError::ValidationError(format!(
                    "services.{} is required",
                    name
                )))
            }
            Some(s) if s.url.trim().is_empty() => {
                return Err(ConfigError::ValidationError(format!(
                    "services.{}.url cannot be empty",
                    name
                )))
            }
            Some(_) => {}
        }
    }

    if config.engine.formats.is_empty() {
        return Err(invalid("engine.formats cannot be empty"));
    }
    let unique: HashSet<_> = config.engine.formats.iter().collect();
    if unique.len() != config.engine.formats.len() {
        return Err(invalid("engine.formats contains duplicates"));
    }

    if config.limits.min_duration_secs == 0 {
        return Err(invalid("limits.min_duration_secs must be greater than 0"));
    }
    if config.limits.min_duration_secs > config.limits.max_duration_secs {
        return Err(invalid(
            "limits.min_duration_secs cannot exceed limits.max_duration_secs",
        ));
    }

    let sweeper = &config.sweeper;
    if sweeper.enabled
        && (sweeper.interval_secs == 0
            || sweeper.asset_timeout_secs == 0
            || sweeper.render_timeout_secs == 0)
    {
        return Err(invalid(
            "sweeper interval and timeouts must be greater than 0 when enabled",
        ));
    }

    Ok(())
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::ValidationError(msg.to_string())
}
