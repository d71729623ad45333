pub mod aggregator;
pub mod auth;
pub mod bundle;
pub mod config;
pub mod engine;
pub mod finalizer;
pub mod ledger;
pub mod metrics;
pub mod services;
pub mod sweeper;
pub mod testing;
pub mod webhook;

pub use aggregator::{FanInOutcome, FanInVerdict};
pub use auth::{
    create_authenticator, ApiKeyAuthenticator, AuthError, AuthRequest, Authenticator, Identity,
    NoneAuthenticator,
};
pub use bundle::{
    Bundle, BundleError, BundleFilter, BundleStore, SqliteBundleStore, Stage,
};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthMethod, Config, ConfigError,
    SanitizedConfig,
};
pub use engine::{Collaborators, EngineConfig, EngineError, GateOutcome, StageEngine, SubmitRequest};
pub use finalizer::{FinalizeOutcome, Finalizer};
pub use ledger::{Job, JobClass, JobLedger, LedgerError, SqliteJobLedger};
pub use sweeper::{SweepReport, Sweeper, SweeperConfig};
pub use webhook::{CallbackUrls, SecretVerifier, WebhookError, WebhookGateway, WebhookOutcome};
