//! Shared fixtures for the infra integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::StatusCode;
use serde_json::{json, Value};
use taskdesk_common::time::Clock;
use taskdesk_domain::Config;
use taskdesk_infra::http::{HttpTransport, PreparedRequest, RawResponse, TransportError};
use taskdesk_infra::storage::MemoryStore;
use taskdesk_infra::TaskdeskClient;

pub type Outcome = Result<RawResponse, TransportError>;

/// Fixed wall-clock origin for session tests.
pub fn start() -> DateTime<Utc> {
    Utc.timestamp_opt(1_800_000_000, 0).single().expect("valid timestamp")
}

/// Unsigned token carrying only an `exp` claim.
pub fn jwt(exp: DateTime<Utc>) -> String {
    let payload = URL_SAFE_NO_PAD.encode(json!({ "exp": exp.timestamp() }).to_string());
    format!("eyJhbGciOiJIUzI1NiJ9.{payload}.sig")
}

pub fn respond(status: u16, body: Value) -> Outcome {
    let status = StatusCode::from_u16(status).expect("valid status code");
    Ok(RawResponse::new(status, HeaderMap::new(), body.to_string().into_bytes()))
}

/// Enveloped login/refresh response.
pub fn auth_response(token: &str, refresh_token: &str) -> Outcome {
    respond(
        200,
        json!({
            "success": true,
            "data": {
                "user": { "id": 1, "email": "ada@example.com" },
                "token": token,
                "refreshToken": refresh_token
            }
        }),
    )
}

/// Transport answering from per-path scripts.
///
/// Each path has a queue of outcomes; the last one repeats once the queue
/// is down to it. Every request is recorded.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Outcome>>>,
    requests: Mutex<Vec<PreparedRequest>>,
    latency: Duration,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency, ..Self::default() }
    }

    pub fn script(&self, path: &str, outcome: Outcome) -> &Self {
        self.scripts.lock().entry(path.to_string()).or_default().push_back(outcome);
        self
    }

    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.requests.lock().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<PreparedRequest> {
        self.requests().into_iter().filter(|r| r.url.path() == path).collect()
    }

    pub fn calls(&self, path: &str) -> usize {
        self.requests_to(path).len()
    }

    /// `Authorization` header of every request to `path`, in order.
    pub fn bearers(&self, path: &str) -> Vec<String> {
        self.requests_to(path)
            .iter()
            .filter_map(|r| r.headers.get(AUTHORIZATION))
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: PreparedRequest) -> Outcome {
        let path = request.url.path().to_string();
        self.requests.lock().push(request);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut scripts = self.scripts.lock();
        match scripts.get_mut(&path) {
            Some(queue) if queue.len() > 1 => queue.pop_front().expect("queue is not empty"),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => respond(404, json!({ "message": format!("no script for {path}") })),
        }
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.api.base_url = "http://taskdesk.test/api".to_string();
    config
}

/// Client over `transport` with in-memory storage.
pub fn client(transport: Arc<ScriptedTransport>, clock: Arc<dyn Clock>) -> TaskdeskClient {
    TaskdeskClient::builder(test_config())
        .transport(transport)
        .storage(Arc::new(MemoryStore::new()))
        .clock(clock)
        .build()
        .expect("client should build")
}
