//! Verb-level API client
//!
//! Thin convenience layer over [`RequestPipeline`]: builds descriptors for
//! the common verbs and decodes typed bodies.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::instrument;

use super::errors::{ClientError, ErrorKind};
use super::pipeline::RequestPipeline;
use super::request::RequestDescriptor;
use super::response::ApiResponse;

/// Client-facing counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientStats {
    /// Network attempts currently holding a throttle slot
    pub active_requests: usize,
    /// Attempts waiting for a slot
    pub queued_requests: usize,
    /// Dedup entries currently tracked
    pub pending_dedup: usize,
    pub online: bool,
}

/// Verb helpers over a shared [`RequestPipeline`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ApiClient {
    pipeline: RequestPipeline,
}

impl ApiClient {
    pub fn new(pipeline: RequestPipeline) -> Self {
        Self { pipeline }
    }

    /// The underlying pipeline, for runtime settings and stats.
    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    /// Send a fully described request.
    pub async fn send(&self, descriptor: RequestDescriptor) -> Result<ApiResponse, ClientError> {
        self.pipeline.send(descriptor).await
    }

    /// `GET path?params`
    pub async fn get<I, K, V>(&self, path: &str, params: I) -> Result<ApiResponse, ClientError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.send(RequestDescriptor::get(path).params(params)).await
    }

    /// `POST path` with a JSON body.
    pub async fn post(&self, path: &str, body: Value) -> Result<ApiResponse, ClientError> {
        self.send(RequestDescriptor::post(path).json(body)).await
    }

    /// `PUT path` with a JSON body.
    pub async fn put(&self, path: &str, body: Value) -> Result<ApiResponse, ClientError> {
        self.send(RequestDescriptor::put(path).json(body)).await
    }

    /// `PATCH path` with a JSON body.
    pub async fn patch(&self, path: &str, body: Value) -> Result<ApiResponse, ClientError> {
        self.send(RequestDescriptor::patch(path).json(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, ClientError> {
        self.send(RequestDescriptor::delete(path)).await
    }

    pub async fn head(&self, path: &str) -> Result<ApiResponse, ClientError> {
        self.send(RequestDescriptor::head(path)).await
    }

    pub async fn options(&self, path: &str) -> Result<ApiResponse, ClientError> {
        self.send(RequestDescriptor::options(path)).await
    }

    /// `GET` and decode the (envelope-unwrapped) body.
    ///
    /// # Errors
    /// Request failures as for [`send`](Self::send); an `Unknown` error if
    /// the body does not decode into `T`.
    #[instrument(skip(self, params))]
    pub async fn get_json<T, I, K, V>(&self, path: &str, params: I) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.get(path, params).await?.data()
    }

    /// `POST` a serializable body and decode the (envelope-unwrapped) reply.
    #[instrument(skip(self, body))]
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body).map_err(|e| {
            ClientError::new(ErrorKind::Unknown)
                .with_message(format!("Request body could not be encoded: {e}"))
        })?;
        self.post(path, body).await?.data()
    }

    /// Current throttle, dedup and connectivity counters.
    pub fn stats(&self) -> ClientStats {
        let stats = self.pipeline.stats();
        ClientStats {
            active_requests: stats.active_requests,
            queued_requests: stats.queued_requests,
            pending_dedup: stats.pending_dedup,
            online: stats.online,
        }
    }

    /// See [`RequestPipeline::clear_dedup_cache`].
    pub fn clear_dedup_cache(&self) {
        self.pipeline.clear_dedup_cache();
    }
}
