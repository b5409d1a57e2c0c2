//! Wire-level HTTP transport
//!
//! The request pipeline hands a fully prepared request to an
//! [`HttpTransport`] and gets back the raw status, headers and body. The
//! production implementation is [`ReqwestTransport`]; tests substitute
//! scripted transports.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client as ReqwestClient, Method, StatusCode};
use serde_json::Value;
use taskdesk_domain::{Result, TaskdeskError};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// A request after every pre-send step has been applied.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    pub request_id: String,
    /// Zero-based attempt number for this logical request
    pub attempt: u32,
}

/// Status, headers and fully buffered body of an HTTP exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self { status, headers, body }
    }

    /// Body decoded as JSON.
    ///
    /// Empty bodies (e.g. `204`) decode to `Null`; bodies that are not JSON
    /// are kept as a string value.
    pub fn json_body(&self) -> Value {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Value::Null;
        }
        serde_json::from_slice(&self.body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&self.body).into_owned()))
    }
}

/// Failure before a complete response was received
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Request(String),
}

/// Sends one prepared request. Implementations must not retry.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(
        &self,
        request: PreparedRequest,
    ) -> std::result::Result<RawResponse, TransportError>;
}

/// [`HttpTransport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: ReqwestClient,
}

impl ReqwestTransport {
    /// Start building a new transport.
    pub fn builder() -> ReqwestTransportBuilder {
        ReqwestTransportBuilder::default()
    }

    /// Convenience constructor with default configuration.
    ///
    /// # Errors
    /// Returns `TaskdeskError::Internal` if the TLS backend cannot be
    /// initialised.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(
        &self,
        request: PreparedRequest,
    ) -> std::result::Result<RawResponse, TransportError> {
        let PreparedRequest { method, url, headers, body, request_id, attempt } = request;
        debug!(attempt = attempt + 1, %method, %url, %request_id, "sending HTTP request");

        let mut builder = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(map_reqwest_error)?;
        debug!(attempt = attempt + 1, %status, %request_id, "received HTTP response");

        Ok(RawResponse { status, headers, body: body.to_vec() })
    }
}

/// Builder for [`ReqwestTransport`].
#[derive(Debug)]
pub struct ReqwestTransportBuilder {
    timeout: Duration,
    connect_timeout: Duration,
    user_agent: Option<String>,
}

impl Default for ReqwestTransportBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: None,
        }
    }
}

impl ReqwestTransportBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// # Errors
    /// Returns `TaskdeskError::Internal` if the client cannot be built.
    pub fn build(self) -> Result<ReqwestTransport> {
        let mut builder = ReqwestClient::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        let client = builder
            .build()
            .map_err(|err| TaskdeskError::Internal(format!("failed to build HTTP client: {err}")))?;

        Ok(ReqwestTransport { client })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout;
    }
    if err.is_connect() {
        return TransportError::Connect(err.to_string());
    }
    TransportError::Request(err.to_string())
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use reqwest::header::HeaderValue;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn request(method: Method, url: &str, body: Option<Value>) -> PreparedRequest {
        let mut headers = HeaderMap::new();
        headers.insert("X-Request-Id", HeaderValue::from_static("req-1"));
        PreparedRequest {
            method,
            url: Url::parse(url).unwrap(),
            headers,
            body,
            request_id: "req-1".into(),
            attempt: 0,
        }
    }

    #[tokio::test]
    async fn forwards_headers_and_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tasks"))
            .and(header("X-Request-Id", "req-1"))
            .and(body_json(json!({ "title": "write tests" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 7 })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new().unwrap();
        let response = transport
            .execute(request(
                Method::POST,
                &format!("{}/api/tasks", server.uri()),
                Some(json!({ "title": "write tests" })),
            ))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.json_body(), json!({ "id": 7 }));
    }

    #[tokio::test]
    async fn returns_error_statuses_as_responses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new().unwrap();
        let response =
            transport.execute(request(Method::GET, &server.uri(), None)).await.unwrap();

        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.json_body(), Value::String("maintenance".into()));
    }

    #[tokio::test]
    async fn empty_body_decodes_to_null() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new().unwrap();
        let response =
            transport.execute(request(Method::DELETE, &server.uri(), None)).await.unwrap();

        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert_eq!(response.json_body(), Value::Null);
    }

    #[tokio::test]
    async fn maps_refused_connection_to_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener); // release the port so that requests fail with ECONNREFUSED

        let transport = ReqwestTransport::new().unwrap();
        let result =
            transport.execute(request(Method::GET, &format!("http://{addr}"), None)).await;

        assert!(matches!(result, Err(TransportError::Connect(_))), "got {result:?}");
    }

    #[tokio::test]
    async fn maps_slow_response_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let transport =
            ReqwestTransport::builder().timeout(Duration::from_millis(50)).build().unwrap();
        let result = transport.execute(request(Method::GET, &server.uri(), None)).await;

        assert_eq!(result.unwrap_err(), TransportError::Timeout);
    }
}
