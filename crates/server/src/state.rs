use std::sync::Arc;

use reelforge_core::services::ResultFetcher;
use reelforge_core::{
    Authenticator, BundleStore, CallbackUrls, Collaborators, Config, Finalizer, JobLedger,
    SanitizedConfig, SecretVerifier, StageEngine, Sweeper, WebhookGateway,
};

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    bundles: Arc<dyn BundleStore>,
    ledger: Arc<dyn JobLedger>,
    engine: Arc<StageEngine>,
    finalizer: Arc<Finalizer>,
    gateway: WebhookGateway,
    verifier: SecretVerifier,
}

impl AppState {
    /// Wire the engine, finalizer and webhook gateway around the given stores
    /// and collaborators.
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        bundles: Arc<dyn BundleStore>,
        ledger: Arc<dyn JobLedger>,
        services: Collaborators,
        fetcher: Arc<dyn ResultFetcher>,
    ) -> Self {
        let callbacks = CallbackUrls::new(
            config.webhook.public_base_url.clone(),
            config.webhook.secret.clone(),
        );
        let finalizer = Arc::new(Finalizer::new(
            config.engine.clone(),
            Arc::clone(&bundles),
            Arc::clone(&ledger),
            services.reviewer.clone(),
        ));
        let engine = Arc::new(StageEngine::new(
            config.engine.clone(),
            config.limits.clone(),
            Arc::clone(&bundles),
            Arc::clone(&ledger),
            services,
            callbacks,
        ));
        let verifier = SecretVerifier::from_config(&config.webhook);
        let gateway = WebhookGateway::new(
            verifier.clone(),
            Arc::clone(&ledger),
            fetcher,
            Arc::clone(&engine),
            Arc::clone(&finalizer),
        );

        Self {
            config,
            authenticator,
            bundles,
            ledger,
            engine,
            finalizer,
            gateway,
            verifier,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn bundles(&self) -> &dyn BundleStore {
        self.bundles.as_ref()
    }

    pub fn ledger(&self) -> &dyn JobLedger {
        self.ledger.as_ref()
    }

    pub fn engine(&self) -> &Arc<StageEngine> {
        &self.engine
    }

    pub fn gateway(&self) -> &WebhookGateway {
        &self.gateway
    }

    /// Secret check shared by webhooks and the compose trigger.
    pub fn verifier(&self) -> &SecretVerifier {
        &self.verifier
    }

    /// Build the stuck-job sweeper over this state's stores.
    pub fn sweeper(&self) -> Arc<Sweeper> {
        Arc::new(Sweeper::new(
            self.config.sweeper.clone(),
            Arc::clone(&self.ledger),
            Arc::clone(&self.engine),
            Arc::clone(&self.finalizer),
        ))
    }
}
