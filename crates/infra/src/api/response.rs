//! Successful response wrapper

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::errors::{ClientError, ErrorKind};

/// A successful (2xx) response with its latency metadata.
///
/// Cloning is cheap; the decoded body is shared, so callers that joined the
/// same deduplicated request hold the very same body.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Arc<Value>,
    request_id: String,
    latency: Duration,
    attempts: u32,
}

impl ApiResponse {
    pub(crate) fn new(
        status: StatusCode,
        headers: HeaderMap,
        body: Value,
        request_id: String,
        latency: Duration,
        attempts: u32,
    ) -> Self {
        Self { status, headers, body: Arc::new(body), request_id, latency, attempts }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Decoded body. `Null` for empty bodies.
    pub fn body(&self) -> &Arc<Value> {
        &self.body
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Duration of the final (successful) network attempt
    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// Network attempts made, including the successful one
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Deserialize the whole body.
    ///
    /// # Errors
    /// Returns an `Unknown` [`ClientError`] if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        T::deserialize(self.body.as_ref()).map_err(|e| self.decode_error(&e))
    }

    /// Deserialize the payload of a `{ success, data, message }` envelope,
    /// or the whole body when it is not enveloped.
    ///
    /// # Errors
    /// Returns an `Unknown` [`ClientError`] when the envelope reports
    /// `success: false` or the payload does not match `T`.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        if self.body.get("success").and_then(Value::as_bool) == Some(false) {
            let error = ClientError::new(ErrorKind::Unknown).with_status(self.status.as_u16());
            return Err(match self.body.get("message").and_then(Value::as_str) {
                Some(message) => error.with_server_message(message),
                None => error,
            });
        }

        let payload = match self.body.get("data") {
            Some(data) if !data.is_null() => data,
            _ => self.body.as_ref(),
        };
        T::deserialize(payload).map_err(|e| self.decode_error(&e))
    }

    fn decode_error(&self, err: &serde_json::Error) -> ClientError {
        ClientError::new(ErrorKind::Unknown)
            .with_status(self.status.as_u16())
            .with_message(format!("Unexpected response format: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Task {
        id: u32,
    }

    fn ok(body: Value) -> ApiResponse {
        ApiResponse::new(StatusCode::OK, HeaderMap::new(), body, "r".into(), Duration::ZERO, 1)
    }

    #[test]
    fn data_unwraps_envelopes() {
        let enveloped = ok(json!({ "success": true, "data": { "id": 3 }, "message": "ok" }));
        assert_eq!(enveloped.data::<Task>().unwrap(), Task { id: 3 });

        let bare = ok(json!({ "id": 4 }));
        assert_eq!(bare.data::<Task>().unwrap(), Task { id: 4 });
        assert_eq!(bare.json::<Task>().unwrap(), Task { id: 4 });
    }

    #[test]
    fn data_surfaces_unsuccessful_envelopes() {
        let failed = ok(json!({ "success": false, "message": "Task is archived" }));
        let err = failed.data::<Task>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert_eq!(err.message(), "Task is archived");
        assert!(err.has_server_message());

        let silent = ok(json!({ "success": false })).data::<Task>().unwrap_err();
        assert_eq!(silent.message(), ErrorKind::Unknown.default_message());
        assert!(!silent.has_server_message());
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let err = ok(json!({ "name": "x" })).json::<Task>().unwrap_err();
        assert!(err.message().starts_with("Unexpected response format"));
    }
}
