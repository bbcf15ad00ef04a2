//! Backend transport.
//!
//! [`ApiClient`] is the narrow seam between the command engine and the
//! network: it takes a fully built request and returns the raw response.
//! [`HttpApiClient`] is the `reqwest` implementation; tests substitute an
//! in-memory recorder.

pub mod auth;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderName;
use serde_json::{Map, Value};

use crate::error::CommandError;
use crate::manifest::HttpMethod;
use crate::request::BuiltRequest;

use self::auth::TokenProvider;

/// Fixed timeout for every backend call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Header carrying the cluster ID for raw requests.
pub const CLUSTER_HEADER: &str = "x-cid";

/// A request ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: String,
    /// JSON body, sent with `Content-Type: application/json` when present.
    pub body: Option<Map<String, Value>>,
    /// Value for the `X-CID` header.
    pub cluster_header: Option<String>,
}

impl ApiRequest {
    /// A bodiless `GET`.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            body: None,
            cluster_header: None,
        }
    }
}

impl From<BuiltRequest> for ApiRequest {
    fn from(built: BuiltRequest) -> Self {
        Self {
            method: built.method,
            url: built.url,
            body: built.body,
            cluster_header: None,
        }
    }
}

/// A raw backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Canonical reason phrase, possibly empty.
    pub reason: String,
    /// Response body bytes.
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Whether the status is below 400.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status < 400
    }

    /// Status line text, e.g. `200 OK`.
    #[must_use]
    pub fn status_text(&self) -> String {
        if self.reason.is_empty() {
            self.status.to_string()
        } else {
            format!("{} {}", self.status, self.reason)
        }
    }

    /// Body as (lossy) UTF-8.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Converts a failure status into [`CommandError::Api`].
    ///
    /// # Errors
    ///
    /// Returns the API error when the status is 400 or above.
    pub fn error_for_status(self) -> Result<Self, CommandError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(CommandError::Api {
                status: self.status,
                body: self.text(),
            })
        }
    }
}

/// Sends requests to the backend.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Performs one call. A non-success status is still `Ok`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Auth`] when no token is available and
    /// [`CommandError::Transport`] when the call produced no response.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, CommandError>;
}

/// `reqwest`-backed client that fetches a fresh bearer token per call.
pub struct HttpApiClient {
    http: reqwest::Client,
    tokens: Box<dyn TokenProvider>,
}

impl HttpApiClient {
    /// Creates a client using `tokens` for authentication.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Transport`] if the TLS backend cannot be initialised.
    pub fn new(tokens: Box<dyn TokenProvider>) -> Result<Self, CommandError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("runos/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, tokens })
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, CommandError> {
        let token = self.tokens.bearer_token().await?;

        let mut builder = self
            .http
            .request(to_reqwest_method(request.method), &request.url)
            .bearer_auth(token);
        if let Some(cid) = &request.cluster_header {
            builder = builder.header(HeaderName::from_static(CLUSTER_HEADER), cid);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!(method = %request.method, url = %request.url, "Sending request");
        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        tracing::debug!(status = status.as_u16(), bytes = body.len(), "Received response");

        Ok(ApiResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }
}
