//! Ordered pre-send and post-receive steps
//!
//! Each step is a pure transformation: a [`RequestStep`] maps one prepared
//! request to the next, a [`ResponseStep`] maps one attempt outcome to the
//! next. Steps never share mutable state across requests; anything
//! attempt-specific (the bearer token in effect) arrives through
//! [`AttemptContext`].

use reqwest::header::{HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use taskdesk_domain::constants::{
    CONTENT_TYPE_JSON, HEADER_API_VERSION, HEADER_CLIENT_PLATFORM, HEADER_CLIENT_VERSION,
    HEADER_REQUESTED_WITH, HEADER_REQUEST_ID, REQUESTED_WITH_VALUE,
};
use taskdesk_domain::ApiSettings;
use tracing::warn;

use super::request::RequestDescriptor;
use crate::http::{PreparedRequest, RawResponse, TransportError};

/// Result of one network attempt, before classification
pub type AttemptOutcome = Result<RawResponse, TransportError>;

/// Per-attempt inputs visible to steps
#[derive(Debug, Clone, Copy)]
pub struct AttemptContext<'a> {
    pub descriptor: &'a RequestDescriptor,
    /// Access token read for this attempt, if the request is authenticated
    pub access_token: Option<&'a str>,
}

pub trait RequestStep: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, request: PreparedRequest, ctx: &AttemptContext<'_>) -> PreparedRequest;
}

pub trait ResponseStep: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, outcome: AttemptOutcome, ctx: &AttemptContext<'_>) -> AttemptOutcome;
}

fn set_header(request: &mut PreparedRequest, name: HeaderName, value: &str, step: &'static str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            request.headers.insert(name, value);
        }
        Err(_) => warn!(step, header = %name, "skipping header with invalid value"),
    }
}

/// Content negotiation and client identification headers
#[derive(Debug, Clone)]
pub struct IdentityHeaders {
    api_version: String,
    client_version: String,
    platform: String,
}

impl IdentityHeaders {
    pub fn new(
        api_version: impl Into<String>,
        client_version: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            client_version: client_version.into(),
            platform: platform.into(),
        }
    }

    pub fn from_settings(settings: &ApiSettings) -> Self {
        Self::new(&settings.api_version, &settings.client_version, &settings.platform)
    }
}

impl RequestStep for IdentityHeaders {
    fn name(&self) -> &'static str {
        "identity_headers"
    }

    fn apply(&self, mut request: PreparedRequest, _ctx: &AttemptContext<'_>) -> PreparedRequest {
        let name = self.name();
        set_header(&mut request, CONTENT_TYPE, CONTENT_TYPE_JSON, name);
        set_header(&mut request, ACCEPT, CONTENT_TYPE_JSON, name);
        set_header(&mut request, HeaderName::from_static("x-api-version"), &self.api_version, name);
        set_header(
            &mut request,
            HeaderName::from_static("x-client-version"),
            &self.client_version,
            name,
        );
        set_header(&mut request, HeaderName::from_static("x-client-platform"), &self.platform, name);
        set_header(
            &mut request,
            HeaderName::from_static("x-requested-with"),
            REQUESTED_WITH_VALUE,
            name,
        );
        request
    }
}

/// `X-Request-Id`, constant across retries of one logical request
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdHeader;

impl RequestStep for RequestIdHeader {
    fn name(&self) -> &'static str {
        "request_id"
    }

    fn apply(&self, mut request: PreparedRequest, ctx: &AttemptContext<'_>) -> PreparedRequest {
        set_header(
            &mut request,
            HeaderName::from_static("x-request-id"),
            ctx.descriptor.request_id(),
            self.name(),
        );
        request
    }
}

/// `Authorization: Bearer <token>` when the attempt carries a token
#[derive(Debug, Clone, Copy, Default)]
pub struct BearerAuth;

impl RequestStep for BearerAuth {
    fn name(&self) -> &'static str {
        "bearer_auth"
    }

    fn apply(&self, mut request: PreparedRequest, ctx: &AttemptContext<'_>) -> PreparedRequest {
        match ctx.access_token {
            Some(token) => {
                set_header(&mut request, AUTHORIZATION, &format!("Bearer {token}"), self.name());
            }
            None => {
                request.headers.remove(AUTHORIZATION);
            }
        }
        request
    }
}

/// Header names the built-in steps write, for callers that inspect requests.
pub const BUILT_IN_HEADERS: [&str; 5] = [
    HEADER_API_VERSION,
    HEADER_CLIENT_VERSION,
    HEADER_CLIENT_PLATFORM,
    HEADER_REQUESTED_WITH,
    HEADER_REQUEST_ID,
];
