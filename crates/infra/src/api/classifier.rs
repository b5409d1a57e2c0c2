//! Maps failed HTTP exchanges to [`ClientError`]s

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::Value;
use taskdesk_common::time::{Clock, SystemClock};

use super::errors::{ClientError, ErrorKind, FieldErrors};
use crate::http::{RawResponse, TransportError};

/// Turns transport failures and non-success responses into classified
/// errors. A `message` (or string `error`) field in the response body
/// replaces the kind's default message.
#[derive(Clone)]
pub struct ErrorClassifier {
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ErrorClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorClassifier").finish_non_exhaustive()
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl ErrorClassifier {
    /// `clock` is used to resolve HTTP-date `Retry-After` values.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn kind_for_status(status: StatusCode) -> ErrorKind {
        match status.as_u16() {
            401 => ErrorKind::Unauthorized,
            403 => ErrorKind::Forbidden,
            404 => ErrorKind::NotFound,
            422 => ErrorKind::Validation,
            429 => ErrorKind::RateLimited,
            500..=599 => ErrorKind::ServerError,
            _ => ErrorKind::Unknown,
        }
    }

    pub fn classify_response(&self, response: &RawResponse) -> ClientError {
        let body = response.json_body();
        let kind = Self::kind_for_status(response.status);
        let status = response.status.as_u16();

        let mut error = ClientError::new(kind).with_status(status);
        if kind == ErrorKind::Unknown {
            error = error.with_message(format!("Request failed with status {status}"));
        }
        if let Some(message) = server_message(&body) {
            error = error.with_server_message(message);
        }

        match kind {
            ErrorKind::Validation => error.with_field_errors(field_errors(&body)),
            ErrorKind::RateLimited => match self.retry_after(&response.headers) {
                Some(delay) => error.with_retry_after(delay),
                None => error,
            },
            _ => error,
        }
    }

    pub fn classify_transport(&self, error: &TransportError) -> ClientError {
        match error {
            TransportError::Timeout => ClientError::new(ErrorKind::Timeout),
            TransportError::Connect(_) | TransportError::Request(_) => {
                ClientError::new(ErrorKind::NetworkUnavailable)
            }
        }
    }

    /// `Retry-After` as delta-seconds or an HTTP date.
    fn retry_after(&self, headers: &HeaderMap) -> Option<Duration> {
        let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
        if let Ok(seconds) = raw.parse::<u64>() {
            return Some(Duration::from_secs(seconds));
        }
        let at = DateTime::parse_from_rfc2822(raw).ok()?;
        let wait = at.signed_duration_since(self.clock.now());
        Some(wait.to_std().unwrap_or(Duration::ZERO))
    }
}

fn server_message(body: &Value) -> Option<String> {
    ["message", "error"]
        .iter()
        .filter_map(|field| body.get(field).and_then(Value::as_str))
        .map(str::trim)
        .find(|message| !message.is_empty())
        .map(str::to_string)
}

/// Accepts `{"errors": {"field": "msg" | ["msg", ...]}}` and
/// `{"errors": [{"field"|"param"|"path": .., "message"|"msg": ..}]}`.
fn field_errors(body: &Value) -> FieldErrors {
    let mut out = FieldErrors::new();
    match body.get("errors") {
        Some(Value::Object(map)) => {
            for (field, value) in map {
                let messages: Vec<String> = match value {
                    Value::String(message) => vec![message.clone()],
                    Value::Array(items) => {
                        items.iter().filter_map(Value::as_str).map(str::to_string).collect()
                    }
                    _ => Vec::new(),
                };
                if !messages.is_empty() {
                    out.entry(field.clone()).or_default().extend(messages);
                }
            }
        }
        Some(Value::Array(items)) => {
            for item in items {
                let field = ["field", "param", "path"]
                    .iter()
                    .find_map(|key| item.get(key).and_then(Value::as_str));
                let message = ["message", "msg"]
                    .iter()
                    .find_map(|key| item.get(key).and_then(Value::as_str));
                if let (Some(field), Some(message)) = (field, message) {
                    out.entry(field.to_string()).or_default().push(message.to_string());
                }
            }
        }
        _ => {}
    }
    out
}
