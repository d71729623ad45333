use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::engine::EngineConfig;
use crate::sweeper::SweeperConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Authentication configuration for user-facing endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// Required when `method = "api_key"`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Owner id assigned to requests authenticated with the API key.
    #[serde(default = "default_api_key_owner")]
    pub api_key_owner: String,
}

fn default_api_key_owner() -> String {
    "api_key_user".to_string()
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    ApiKey,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::ApiKey => "api_key",
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("reelforge.db")
}

/// Inbound callback configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookConfig {
    /// Shared secret the external services echo back in the `secret` query parameter.
    #[serde(default)]
    pub secret: Option<String>,
    /// Skip secret checks when no secret is configured. Never enable in production.
    #[serde(default)]
    pub dev_mode: bool,
    /// Externally reachable base address used to build callback URLs.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: None,
            dev_mode: false,
            public_base_url: default_public_base_url(),
        }
    }
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

/// Connection settings for one external HTTP service
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Base URL (e.g., "http://renderer:9000")
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_timeout() -> u32 {
    30
}

/// External collaborators. All but `reviewer` are required to run the server.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub analyzer: Option<ServiceConfig>,
    #[serde(default)]
    pub asset_generator: Option<ServiceConfig>,
    #[serde(default)]
    pub script_generator: Option<ServiceConfig>,
    #[serde(default)]
    pub renderer: Option<ServiceConfig>,
    #[serde(default)]
    pub reviewer: Option<ServiceConfig>,
}

/// Request limits enforced at the generation-request boundary
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    #[serde(default = "default_min_duration")]
    pub min_duration_secs: u32,
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u32,
    /// Bundles each owner may create (0 = unlimited).
    #[serde(default)]
    pub max_bundles_per_owner: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            min_duration_secs: default_min_duration(),
            max_duration_secs: default_max_duration(),
            max_bundles_per_owner: 0,
        }
    }
}

fn default_min_duration() -> u32 {
    15
}

fn default_max_duration() -> u32 {
    60
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub webhook: SanitizedWebhookConfig,
    pub services: SanitizedServicesConfig,
    pub engine: EngineConfig,
    pub sweeper: SweeperConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedWebhookConfig {
    pub secret_configured: bool,
    pub dev_mode: bool,
    pub public_base_url: String,
}

/// Sanitized service config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedServiceConfig {
    pub url: String,
    pub api_key_configured: bool,
    pub timeout_secs: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedServicesConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<SanitizedServiceConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_generator: Option<SanitizedServiceConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_generator: Option<SanitizedServiceConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renderer: Option<SanitizedServiceConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<SanitizedServiceConfig>,
}

fn sanitize_service(service: &Option<ServiceConfig>) -> Option<SanitizedServiceConfig> {
    service.as_ref().map(|s| SanitizedServiceConfig {
        url: s.url.clone(),
        api_key_configured: s.api_key.as_deref().is_some_and(|k| !k.is_empty()),
        timeout_secs: s.timeout_secs,
    })
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: config.auth.method.as_str().to_string(),
            },
            server: config.server.clone(),
            database: config.database.clone(),
            webhook: SanitizedWebhookConfig {
                secret_configured: config
                    .webhook
                    .secret
                    .as_deref()
                    .is_some_and(|s| !s.is_empty()),
                dev_mode: config.webhook.dev_mode,
                public_base_url: config.webhook.public_base_url.clone(),
            },
            services: SanitizedServicesConfig {
                analyzer: sanitize_service(&config.services.analyzer),
                asset_generator: sanitize_service(&config.services.asset_generator),
                script_generator: sanitize_service(&config.services.script_generator),
                renderer: sanitize_service(&config.services.renderer),
                reviewer: sanitize_service(&config.services.reviewer),
            },
            engine: config.engine.clone(),
            sweeper: config.sweeper.clone(),
            limits: config.limits.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::RenderFormat;

    #[test]
    fn test_deserialize_valid_config_with_none_auth() {
        let toml = r#"
[auth]
method = "none"

[server]
host = "127.0.0.1"
port = 9000
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.auth.method, AuthMethod::None);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
    }

    #[test]
    fn test_deserialize_defaults() {
        let toml = r#"
[auth]
method = "none"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "reelforge.db");
        assert!(config.webhook.secret.is_none());
        assert!(!config.webhook.dev_mode);
        assert_eq!(config.limits.min_duration_secs, 15);
        assert_eq!(config.limits.max_duration_secs, 60);
        assert_eq!(config.engine.formats, RenderFormat::ALL.to_vec());
        assert!(config.services.renderer.is_none());
    }

    #[test]
    fn test_deserialize_missing_auth_fails() {
        let toml = r#"
[server]
port = 8080
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_services() {
        let toml = r#"
[auth]
method = "api_key"
api_key = "k"

[services.renderer]
url = "http://renderer:9000"
api_key = "render-key"

[services.reviewer]
url = "http://reviewer:9100"
timeout_secs = 120
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.auth.method, AuthMethod::ApiKey);
        assert_eq!(config.auth.api_key_owner, "api_key_user");

        let renderer = config.services.renderer.as_ref().unwrap();
        assert_eq!(renderer.url, "http://renderer:9000");
        assert_eq!(renderer.timeout_secs, 30);

        let reviewer = config.services.reviewer.as_ref().unwrap();
        assert_eq!(reviewer.timeout_secs, 120);
        assert!(reviewer.api_key.is_none());
    }

    #[test]
    fn test_sanitized_config_hides_secrets() {
        let toml = r#"
[auth]
method = "api_key"
api_key = "top-secret"

[webhook]
secret = "hook-secret"
public_base_url = "https://hooks.example"

[services.asset_generator]
url = "http://assets:9000"
api_key = "asset-key"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let sanitized = SanitizedConfig::from(&config);

        assert_eq!(sanitized.auth.method, "api_key");
        assert!(sanitized.webhook.secret_configured);
        let assets = sanitized.services.asset_generator.as_ref().unwrap();
        assert!(assets.api_key_configured);
        assert!(sanitized.services.renderer.is_none());

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("top-secret"));
        assert!(!json.contains("hook-secret"));
        assert!(!json.contains("asset-key"));
    }
}
