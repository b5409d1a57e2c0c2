//! Logical request description and deduplication identity

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use super::errors::{ClientError, ErrorKind};

/// Per-request behaviour switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    /// Attach the bearer token
    pub authenticated: bool,
    /// On `401`, refresh the session once and resubmit
    pub refresh_on_unauthorized: bool,
    /// Share in-flight executions with identical idempotent requests
    pub dedup: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self { authenticated: true, refresh_on_unauthorized: true, dedup: true }
    }
}

/// One logical request. Everything except `attempt` is fixed at creation;
/// `request_id` is reused across retries for log correlation.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    method: Method,
    url: String,
    params: BTreeMap<String, String>,
    body: Option<Value>,
    request_id: String,
    attempt: u32,
    created_at: DateTime<Utc>,
    options: RequestOptions,
}

impl RequestDescriptor {
    /// `url` is either absolute or a path relative to the API base URL.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: BTreeMap::new(),
            body: None,
            request_id: Uuid::now_v7().to_string(),
            attempt: 0,
            created_at: Utc::now(),
            options: RequestOptions::default(),
        }
    }

    /// `GET url`
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// `POST url`; never deduplicated.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// `PUT url`; never deduplicated.
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    /// `PATCH url`; never deduplicated.
    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::PATCH, url)
    }

    /// `DELETE url`
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// `HEAD url`
    pub fn head(url: impl Into<String>) -> Self {
        Self::new(Method::HEAD, url)
    }

    /// `OPTIONS url`
    pub fn options(url: impl Into<String>) -> Self {
        Self::new(Method::OPTIONS, url)
    }

    /// Add a query parameter. Later values for the same name win.
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(name.into(), value.to_string());
        self
    }

    /// Add several query parameters, as for [`param`](Self::param).
    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        for (name, value) in params {
            self.params.insert(name.into(), value.to_string());
        }
        self
    }

    /// JSON request body.
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Send without a bearer token.
    pub fn anonymous(mut self) -> Self {
        self.options.authenticated = false;
        self
    }

    /// Surface `401` as-is instead of refreshing the session.
    pub fn no_auth_refresh(mut self) -> Self {
        self.options.refresh_on_unauthorized = false;
        self
    }

    /// Always run a fresh execution, even for an idempotent method.
    pub fn no_dedup(mut self) -> Self {
        self.options.dedup = false;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The URL as given: absolute, or relative to the base URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Query parameters, sorted by name.
    pub fn query(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Id shared by every attempt of this request.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Zero-based attempt number
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// When the logical request was created, not the current attempt.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn request_options(&self) -> RequestOptions {
        self.options
    }

    /// `GET`, `HEAD`, `OPTIONS` and `DELETE`: the methods eligible for
    /// deduplication.
    pub fn is_idempotent(&self) -> bool {
        matches!(self.method, Method::GET | Method::HEAD | Method::OPTIONS | Method::DELETE)
    }

    /// The same request, one attempt later.
    pub(crate) fn next_attempt(&self) -> Self {
        Self { attempt: self.attempt.saturating_add(1), ..self.clone() }
    }

    /// The same request back at its first attempt.
    pub(crate) fn restart(&self) -> Self {
        Self { attempt: 0, ..self.clone() }
    }

    /// Absolute URL including query parameters.
    ///
    /// # Errors
    /// Returns an `Unknown` [`ClientError`] if the URL cannot be parsed.
    pub fn resolve_url(&self, base: &Url) -> Result<Url, ClientError> {
        let mut url = match Url::parse(&self.url) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let joined = format!(
                    "{}/{}",
                    base.as_str().trim_end_matches('/'),
                    self.url.trim_start_matches('/')
                );
                Url::parse(&joined).map_err(|e| invalid_url(&self.url, &e))?
            }
            Err(e) => return Err(invalid_url(&self.url, &e)),
        };

        if !self.params.is_empty() {
            url.query_pairs_mut().extend_pairs(self.params.iter());
        }
        Ok(url)
    }

    /// Deduplication identity, for idempotent methods only.
    pub fn dedup_key(&self, base: &Url) -> Option<DedupKey> {
        if !self.is_idempotent() {
            return None;
        }
        let url = self.resolve_url(base).ok()?;
        Some(DedupKey::new(&self.method, &url, self.body.as_ref()))
    }
}

fn invalid_url(url: &str, err: &url::ParseError) -> ClientError {
    ClientError::new(ErrorKind::Unknown).with_message(format!("Invalid request URL '{url}': {err}"))
}

/// Structured identity of a request for deduplication:
/// `(method, normalized URL, sorted params, body hash)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    method: Method,
    url: String,
    params: Vec<(String, String)>,
    body_hash: Option<[u8; 32]>,
}

impl DedupKey {
    /// Build a key from a fully resolved URL. Query parameters embedded in
    /// the URL are folded into the sorted parameter list; scheme and host are
    /// already lowercased by `Url`; a trailing path slash is ignored.
    pub fn new(method: &Method, url: &Url, body: Option<&Value>) -> Self {
        let mut params: Vec<(String, String)> =
            url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();
        params.sort();

        let mut base = url.clone();
        base.set_query(None);
        base.set_fragment(None);
        let mut normalized = base.to_string();
        if base.path() != "/" && normalized.ends_with('/') {
            normalized.pop();
        }

        // serde_json maps are key-ordered, so serialization is canonical.
        let body_hash = body
            .and_then(|value| serde_json::to_vec(value).ok())
            .map(|bytes| *blake3::hash(&bytes).as_bytes());

        Self { method: method.clone(), url: normalized, params, body_hash }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Normalized URL without query or fragment.
    pub fn url(&self) -> &str {
        &self.url
    }
}
