//! Session-scoped client facade
//!
//! [`TaskdeskClient`] wires one isolated session: a token store, a request
//! pipeline (with its own throttle and deduplicator) and a lifecycle
//! manager registered as the pipeline's `401` handler. Two clients built
//! from the same config share nothing.

use std::sync::Arc;

use taskdesk_common::time::{Clock, SystemClock};
use taskdesk_domain::{Config, Result, TaskdeskError};
use tracing::{debug, info};
use url::Url;

use crate::api::{
    retry_config, ApiClient, HttpRetryPolicy, IdentityHeaders, RequestPipeline, RequestStep,
    ResponseStep,
};
use crate::auth::{
    CredentialIssuer, ExpiryExtractor, HttpAuthApi, JwtExpiryExtractor, TokenLifecycleManager,
};
use crate::http::{HttpTransport, NetworkStatusMonitor, ReqwestTransport};
use crate::storage::{backend_from_settings, KeyValueStore, TokenStore};

/// One authenticated API session.
#[derive(Debug, Clone)]
pub struct TaskdeskClient {
    api: ApiClient,
    auth: TokenLifecycleManager,
    network: NetworkStatusMonitor,
}

impl TaskdeskClient {
    pub fn builder(config: Config) -> TaskdeskClientBuilder {
        TaskdeskClientBuilder::new(config)
    }

    /// Build with the storage backend named in `config` and the reqwest
    /// transport.
    ///
    /// # Errors
    /// Returns `TaskdeskError::Config` for an invalid configuration and
    /// `TaskdeskError::Internal` if the HTTP client cannot be created.
    pub fn from_config(config: Config) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn auth(&self) -> &TokenLifecycleManager {
        &self.auth
    }

    pub fn network(&self) -> &NetworkStatusMonitor {
        &self.network
    }

    /// Cancel every session timer. Stored credentials stay untouched so the
    /// next client can restore them.
    pub fn shutdown(&self) {
        self.auth.shutdown();
        debug!("taskdesk client shut down");
    }
}

/// Builder for [`TaskdeskClient`]. Anything not overridden comes from the
/// config.
pub struct TaskdeskClientBuilder {
    config: Config,
    transport: Option<Arc<dyn HttpTransport>>,
    storage: Option<Arc<dyn KeyValueStore>>,
    clock: Option<Arc<dyn Clock>>,
    extractor: Option<Arc<dyn ExpiryExtractor>>,
    network: Option<NetworkStatusMonitor>,
    request_steps: Vec<Arc<dyn RequestStep>>,
    response_steps: Vec<Arc<dyn ResponseStep>>,
}

impl TaskdeskClientBuilder {
    fn new(config: Config) -> Self {
        Self {
            config,
            transport: None,
            storage: None,
            clock: None,
            extractor: None,
            network: None,
            request_steps: Vec::new(),
            response_steps: Vec::new(),
        }
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn expiry_extractor(mut self, extractor: Arc<dyn ExpiryExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Share a connectivity monitor owned by the host application.
    pub fn network(mut self, network: NetworkStatusMonitor) -> Self {
        self.network = Some(network);
        self
    }

    /// Extra pre-send step, run after the identity headers and before the
    /// request id and bearer token are attached.
    pub fn request_step(mut self, step: Arc<dyn RequestStep>) -> Self {
        self.request_steps.push(step);
        self
    }

    pub fn response_step(mut self, step: Arc<dyn ResponseStep>) -> Self {
        self.response_steps.push(step);
        self
    }

    /// # Errors
    /// Returns `TaskdeskError::Config` for an invalid configuration and
    /// `TaskdeskError::Internal` if the default transport cannot be created.
    pub fn build(self) -> Result<TaskdeskClient> {
        let config = self.config;
        config.validate()?;

        let base_url = Url::parse(&config.api.base_url)
            .map_err(|e| TaskdeskError::Config(format!("Invalid api.base_url: {e}")))?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };
        let storage = self.storage.unwrap_or_else(|| backend_from_settings(&config.storage));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let extractor = self.extractor.unwrap_or_else(|| Arc::new(JwtExpiryExtractor));
        let network = self.network.unwrap_or_default();

        let tokens = TokenStore::new(storage);
        let dedup_window = config.dedup.enabled.then(|| config.dedup.window());

        let mut builder = RequestPipeline::builder(base_url, transport, tokens.clone())
            .max_concurrent(config.throttle.max_concurrent)
            .dedup_window(dedup_window)
            .retry(
                retry_config(&config.retry)?,
                HttpRetryPolicy::new(config.retry.retry_rate_limited),
            )
            .network(network.clone())
            .timeout(config.api.timeout())
            .clock(Arc::clone(&clock))
            .request_step(Arc::new(IdentityHeaders::from_settings(&config.api)));
        for step in self.request_steps {
            builder = builder.request_step(step);
        }
        for step in self.response_steps {
            builder = builder.response_step(step);
        }
        let pipeline = builder.build()?;

        let issuer =
            CredentialIssuer::new(extractor, Arc::clone(&clock), config.session.fallback_ttl());
        let auth = TokenLifecycleManager::new(
            Arc::new(HttpAuthApi::new(pipeline.clone())),
            tokens,
            issuer,
            clock,
            config.session.clone(),
        );
        pipeline.set_unauthorized_handler(auth.unauthorized_handler());

        info!(
            base_url = %config.api.base_url,
            storage = ?config.storage.backend,
            max_concurrent = config.throttle.max_concurrent,
            dedup = config.dedup.enabled,
            "taskdesk client ready"
        );

        Ok(TaskdeskClient { api: ApiClient::new(pipeline), auth, network })
    }
}
