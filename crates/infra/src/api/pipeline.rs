//! Request pipeline
//!
//! Every outbound call goes through [`RequestPipeline::send`]:
//!
//! 1. Offline check against the [`NetworkStatusMonitor`]
//! 2. Deduplication of identical idempotent requests
//! 3. Per attempt: token read, pre-send steps, throttle slot, transport call
//!    under a wall-clock timeout, post-receive steps, classification
//! 4. One refresh-and-resubmit on `401`, otherwise retry with backoff
//!
//! The throttle slot only covers the network exchange itself. Backoff sleeps
//! and refresh waits happen without a slot so the refresh call (which goes
//! through this same pipeline) can never queue behind requests waiting on it.

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::HeaderMap;
use taskdesk_common::resilience::{ConcurrencyThrottle, RequestDeduplicator, RetryConfig};
use taskdesk_common::time::{Clock, SystemClock};
use taskdesk_domain::{Result, TaskdeskError};
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace, warn};
use url::Url;

use super::classifier::ErrorClassifier;
use super::errors::{ClientError, ErrorKind};
use super::request::{DedupKey, RequestDescriptor};
use super::response::ApiResponse;
use super::retry::HttpRetryPolicy;
use super::steps::{AttemptContext, BearerAuth, RequestIdHeader, RequestStep, ResponseStep};
use crate::http::{HttpTransport, NetworkStatusMonitor, PreparedRequest, TransportError};
use crate::storage::TokenStore;

/// Default bound on concurrent network attempts
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Default per-attempt timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default lifetime of a dedup entry
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(5);

pub(crate) type SharedOutcome = std::result::Result<ApiResponse, ClientError>;

/// Session-side reaction to rejected credentials.
///
/// Implemented by the token lifecycle manager. The pipeline only holds a weak
/// reference, so a dropped manager simply turns `401`s into plain errors.
#[async_trait]
pub trait UnauthorizedHandler: Send + Sync {
    /// Make fresh credentials available.
    ///
    /// `rejected` is the access token the server refused (or that expired
    /// locally). If the stored token already differs, another request has
    /// refreshed in the meantime and implementations return `Ok` without a
    /// new refresh.
    async fn refresh_credentials(&self, rejected: &str) -> std::result::Result<(), ClientError>;

    /// Credentials were refused even after a refresh; end the session.
    async fn expire_session(&self);
}

/// Snapshot of pipeline bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    /// Network attempts currently holding a throttle slot
    pub active_requests: usize,
    /// Attempts waiting for a slot
    pub queued_requests: usize,
    /// Live dedup entries
    pub pending_dedup: usize,
    pub online: bool,
}

/// Cheap to clone; clones share throttle, dedup table and token store.
#[derive(Clone)]
pub struct RequestPipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    base_url: RwLock<Url>,
    default_headers: RwLock<HeaderMap>,
    transport: Arc<dyn HttpTransport>,
    tokens: TokenStore,
    throttle: ConcurrencyThrottle,
    dedup: Option<RequestDeduplicator<DedupKey, SharedOutcome>>,
    retry: RetryConfig,
    policy: HttpRetryPolicy,
    classifier: ErrorClassifier,
    network: NetworkStatusMonitor,
    timeout: RwLock<Duration>,
    clock: Arc<dyn Clock>,
    request_steps: Vec<Arc<dyn RequestStep>>,
    response_steps: Vec<Arc<dyn ResponseStep>>,
    unauthorized: OnceLock<Weak<dyn UnauthorizedHandler>>,
}

impl fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("base_url", &self.inner.base_url.read().as_str())
            .field("timeout", &*self.inner.timeout.read())
            .field("throttle", &self.inner.throttle.metrics())
            .field("dedup", &self.inner.dedup)
            .finish_non_exhaustive()
    }
}

impl RequestPipeline {
    /// Start a pipeline sending to `base_url` through `transport`, reading
    /// bearer tokens from `tokens`.
    pub fn builder(
        base_url: Url,
        transport: Arc<dyn HttpTransport>,
        tokens: TokenStore,
    ) -> RequestPipelineBuilder {
        RequestPipelineBuilder::new(base_url, transport, tokens)
    }

    /// Register the 401 handler. Only the first registration takes effect.
    pub fn set_unauthorized_handler(&self, handler: Weak<dyn UnauthorizedHandler>) -> bool {
        self.inner.unauthorized.set(handler).is_ok()
    }

    /// Base URL relative request paths are resolved against.
    pub fn base_url(&self) -> Url {
        self.inner.base_url.read().clone()
    }

    /// Point later requests at another server. Requests already in flight
    /// keep the URL they resolved.
    pub fn set_base_url(&self, base_url: Url) {
        info!(base_url = %base_url, "pipeline base URL changed");
        *self.inner.base_url.write() = base_url;
    }

    /// Per-attempt wall-clock timeout.
    pub fn timeout(&self) -> Duration {
        *self.inner.timeout.read()
    }

    /// Change the per-attempt timeout for later attempts.
    ///
    /// # Errors
    /// Returns [`TaskdeskError::Config`] for a zero timeout.
    pub fn set_timeout(&self, timeout: Duration) -> Result<()> {
        if timeout.is_zero() {
            return Err(TaskdeskError::Config("request timeout must be greater than 0".into()));
        }
        *self.inner.timeout.write() = timeout;
        Ok(())
    }

    /// Headers sent with every request, before any step runs.
    pub fn default_headers(&self) -> HeaderMap {
        self.inner.default_headers.read().clone()
    }

    /// Merge `headers` into the default headers, replacing same-named ones.
    pub fn set_default_headers(&self, headers: HeaderMap) {
        self.inner.default_headers.write().extend(headers);
    }

    /// Token store the bearer step reads from.
    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    /// Connectivity flag consulted before every attempt.
    pub fn network(&self) -> &NetworkStatusMonitor {
        &self.inner.network
    }

    /// Send one logical request.
    ///
    /// # Errors
    /// Returns the classified failure once retries (and the single
    /// refresh-and-resubmit for `401`) are exhausted. Callers that joined a
    /// deduplicated execution receive the same error value.
    pub async fn send(&self, descriptor: RequestDescriptor) -> SharedOutcome {
        if !self.inner.network.is_online() {
            debug!(request_id = descriptor.request_id(), "offline, request not sent");
            return Err(ClientError::offline().for_request(&descriptor));
        }

        let shared = self
            .inner
            .dedup
            .as_ref()
            .filter(|_| descriptor.request_options().dedup)
            .and_then(|dedup| descriptor.dedup_key(&self.base_url()).map(|key| (dedup, key)));

        let inner = Arc::clone(&self.inner);
        match shared {
            Some((dedup, key)) => {
                let (outcome, role) =
                    dedup.run_with_role(key, move || inner.execute(descriptor)).await;
                trace!(?role, "dedup outcome delivered");
                outcome
            }
            None => inner.execute(descriptor).await,
        }
    }

    /// Current throttle, dedup and connectivity counters.
    pub fn stats(&self) -> PipelineStats {
        let throttle = self.inner.throttle.metrics();
        PipelineStats {
            active_requests: throttle.in_flight,
            queued_requests: throttle.queued,
            pending_dedup: self.inner.dedup.as_ref().map_or(0, RequestDeduplicator::len),
            online: self.inner.network.is_online(),
        }
    }

    /// Forget in-flight dedup entries. Callers already waiting keep their
    /// outcome.
    pub fn clear_dedup_cache(&self) {
        if let Some(dedup) = &self.inner.dedup {
            dedup.clear();
        }
    }

    /// Stop admitting new network attempts.
    pub fn close(&self) {
        self.inner.throttle.close();
    }
}

impl PipelineInner {
    fn handler(&self) -> Option<Arc<dyn UnauthorizedHandler>> {
        self.unauthorized.get().and_then(Weak::upgrade)
    }

    #[instrument(
        name = "api_request",
        skip_all,
        fields(
            request_id = %descriptor.request_id(),
            method = %descriptor.method(),
            url = %descriptor.url(),
        )
    )]
    async fn execute(self: Arc<Self>, descriptor: RequestDescriptor) -> SharedOutcome {
        let options = descriptor.request_options();
        let mut descriptor = descriptor;
        let mut retries = 0u32;
        let mut refreshed = false;

        loop {
            if !self.network.is_online() {
                return Err(ClientError::offline().for_request(&descriptor));
            }

            let mut token = if options.authenticated { self.tokens.access_token() } else { None };

            // A token already past its expiry is refreshed before sending
            // instead of collecting a guaranteed 401.
            if options.authenticated && options.refresh_on_unauthorized && !refreshed {
                if let (Some(credentials), Some(handler)) =
                    (self.tokens.credentials(), self.handler())
                {
                    if credentials.is_expired(self.clock.now()) {
                        debug!("access token expired, refreshing before send");
                        refreshed = true;
                        if let Err(err) =
                            handler.refresh_credentials(credentials.access_token()).await
                        {
                            return Err(forced_logout(&err, &descriptor));
                        }
                        token = self.tokens.access_token();
                    }
                }
            }

            let err = match self.attempt(&descriptor, token.as_deref()).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            if err.kind() == ErrorKind::Unauthorized && options.refresh_on_unauthorized {
                let (Some(rejected), Some(handler)) = (token.as_deref(), self.handler()) else {
                    return Err(err);
                };
                if refreshed {
                    warn!("credentials rejected after refresh, ending session");
                    handler.expire_session().await;
                    return Err(ClientError::forced_logout().for_request(&descriptor));
                }

                refreshed = true;
                debug!("received 401, refreshing session before resubmitting");
                if let Err(refresh_err) = handler.refresh_credentials(rejected).await {
                    return Err(forced_logout(&refresh_err, &descriptor));
                }
                descriptor = descriptor.next_attempt();
                continue;
            }

            match self.retry.next_delay(&self.policy, &err, retries) {
                Some(delay) => {
                    warn!(
                        kind = %err.kind(),
                        status = err.status(),
                        attempt = descriptor.attempt(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retries += 1;
                    descriptor = descriptor.next_attempt();
                }
                None => {
                    debug!(kind = %err.kind(), status = err.status(), "request failed");
                    return Err(err);
                }
            }
        }
    }

    async fn attempt(&self, descriptor: &RequestDescriptor, token: Option<&str>) -> SharedOutcome {
        let base_url = self.base_url.read().clone();
        let url = descriptor.resolve_url(&base_url).map_err(|e| e.for_request(descriptor))?;
        let ctx = AttemptContext { descriptor, access_token: token };

        let prepared = PreparedRequest {
            method: descriptor.method().clone(),
            url,
            headers: self.default_headers.read().clone(),
            body: descriptor.body().cloned(),
            request_id: descriptor.request_id().to_string(),
            attempt: descriptor.attempt(),
        };
        let prepared = self.request_steps.iter().fold(prepared, |req, step| step.apply(req, &ctx));

        let slot = self.throttle.acquire().await.map_err(|e| {
            ClientError::new(ErrorKind::Unknown)
                .with_message(format!("Request could not be admitted: {e}"))
                .for_request(descriptor)
        })?;

        let timeout = *self.timeout.read();
        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, self.transport.execute(prepared))
            .await
            .unwrap_or(Err(TransportError::Timeout));
        let latency = started.elapsed();
        drop(slot);

        let outcome = self.response_steps.iter().fold(outcome, |out, step| step.apply(out, &ctx));

        match outcome {
            Ok(raw) if raw.status.is_success() => {
                debug!(
                    status = raw.status.as_u16(),
                    latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                    "request completed"
                );
                let body = raw.json_body();
                Ok(ApiResponse::new(
                    raw.status,
                    raw.headers,
                    body,
                    descriptor.request_id().to_string(),
                    latency,
                    descriptor.attempt() + 1,
                ))
            }
            Ok(raw) => Err(self.classifier.classify_response(&raw).for_request(descriptor)),
            Err(transport) => {
                Err(self.classifier.classify_transport(&transport).for_request(descriptor))
            }
        }
    }
}

fn forced_logout(cause: &ClientError, descriptor: &RequestDescriptor) -> ClientError {
    warn!(kind = %cause.kind(), "session refresh failed, request finalized as forced logout");
    ClientError::forced_logout().for_request(descriptor)
}

/// Builder for [`RequestPipeline`]
pub struct RequestPipelineBuilder {
    base_url: Url,
    transport: Arc<dyn HttpTransport>,
    tokens: TokenStore,
    max_concurrent: usize,
    dedup_window: Option<Duration>,
    retry: RetryConfig,
    policy: HttpRetryPolicy,
    network: NetworkStatusMonitor,
    timeout: Duration,
    clock: Arc<dyn Clock>,
    request_steps: Vec<Arc<dyn RequestStep>>,
    response_steps: Vec<Arc<dyn ResponseStep>>,
}

impl RequestPipelineBuilder {
    fn new(base_url: Url, transport: Arc<dyn HttpTransport>, tokens: TokenStore) -> Self {
        Self {
            base_url,
            transport,
            tokens,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            dedup_window: Some(DEFAULT_DEDUP_WINDOW),
            retry: RetryConfig::default(),
            policy: HttpRetryPolicy::default(),
            network: NetworkStatusMonitor::default(),
            timeout: DEFAULT_TIMEOUT,
            clock: Arc::new(SystemClock),
            request_steps: Vec::new(),
            response_steps: Vec::new(),
        }
    }

    /// Bound on concurrent network attempts.
    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    /// `None` disables deduplication.
    pub fn dedup_window(mut self, window: Option<Duration>) -> Self {
        self.dedup_window = window;
        self
    }

    /// Backoff schedule and the policy deciding which failures retry.
    pub fn retry(mut self, retry: RetryConfig, policy: HttpRetryPolicy) -> Self {
        self.retry = retry;
        self.policy = policy;
        self
    }

    /// Shared connectivity flag; requests fail fast while it is offline.
    pub fn network(mut self, network: NetworkStatusMonitor) -> Self {
        self.network = network;
        self
    }

    /// Per-attempt wall-clock timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Clock used for local expiry checks and `Retry-After` dates.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Append a pre-send step. Steps run in insertion order, before the
    /// built-in request id and bearer steps.
    pub fn request_step(mut self, step: Arc<dyn RequestStep>) -> Self {
        self.request_steps.push(step);
        self
    }

    /// Append a post-receive step. Steps run in insertion order.
    pub fn response_step(mut self, step: Arc<dyn ResponseStep>) -> Self {
        self.response_steps.push(step);
        self
    }

    /// # Errors
    /// Returns [`TaskdeskError::Config`] for a zero concurrency bound, a zero
    /// timeout or an invalid retry configuration.
    pub fn build(self) -> Result<RequestPipeline> {
        if self.timeout.is_zero() {
            return Err(TaskdeskError::Config("request timeout must be greater than 0".into()));
        }
        self.retry
            .validate()
            .map_err(|e| TaskdeskError::Config(format!("invalid retry configuration: {e}")))?;
        let throttle = ConcurrencyThrottle::new(self.max_concurrent)
            .map_err(|e| TaskdeskError::Config(format!("invalid throttle configuration: {e}")))?;

        let mut request_steps = self.request_steps;
        request_steps.push(Arc::new(RequestIdHeader));
        request_steps.push(Arc::new(BearerAuth));

        Ok(RequestPipeline {
            inner: Arc::new(PipelineInner {
                base_url: RwLock::new(self.base_url),
                default_headers: RwLock::new(HeaderMap::new()),
                transport: self.transport,
                tokens: self.tokens,
                throttle,
                dedup: self.dedup_window.map(RequestDeduplicator::new),
                retry: self.retry,
                policy: self.policy,
                classifier: ErrorClassifier::new(Arc::clone(&self.clock)),
                network: self.network,
                timeout: RwLock::new(self.timeout),
                clock: self.clock,
                request_steps,
                response_steps: self.response_steps,
                unauthorized: OnceLock::new(),
            }),
        })
    }
}
