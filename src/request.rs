use async_trait::async_trait;
use reqwest::Method;
use url::Url;

use crate::error::ApiError;

pub const AUTHORIZATION: &str = "Authorization";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// One outbound request, built fresh for every attempt
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Attach `Authorization: Bearer <token>`; a missing token is sent as `null`
    pub fn bearer(mut self, token: Option<&str>) -> Self {
        let value = format!("Bearer {}", token.unwrap_or("null"));
        self.set_header(AUTHORIZATION, value);
        self
    }

    /// Attach an already serialized JSON body with its content type
    pub fn json_body(mut self, body: String) -> Self {
        self.set_header(CONTENT_TYPE, JSON_CONTENT_TYPE.to_string());
        self.body = Some(body);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value));
    }
}

/// Status and raw body of a completed HTTP exchange
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse a successful body; an empty body (e.g. 204) reads as `null`
    pub fn json(&self) -> Result<serde_json::Value, ApiError> {
        if self.body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Parse an error body, falling back to `{}` when it is not JSON
    pub fn error_info(&self) -> serde_json::Value {
        serde_json::from_str(&self.body)
            .unwrap_or_else(|_| serde_json::Value::Object(Default::default()))
    }

    pub fn into_error(self) -> ApiError {
        ApiError::Request {
            status: self.status,
            info: self.error_info(),
        }
    }
}

/// Sends a request and hands back whatever the server answered.
///
/// Non-2xx statuses are not errors at this layer; only failures to get a
/// response at all are.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: RequestDescriptor) -> Result<RawResponse, ApiError>;
}

/// Production transport backed by a shared `reqwest::Client`
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: RequestDescriptor) -> Result<RawResponse, ApiError> {
        let mut request_builder = self.client.request(request.method, &request.url);

        for (name, value) in &request.headers {
            request_builder = request_builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = request.body {
            request_builder = request_builder.body(body);
        }

        let response = request_builder
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(format!("Failed to read response body: {}", e)))?;

        Ok(RawResponse { status, body })
    }
}

/// Build the full URL for a server-relative path.
///
/// A missing leading slash is added and an existing one is kept, so
/// `cases` and `/cases` resolve to the same URL.
pub fn build_url(base_url: &str, path: &str) -> Result<String, ApiError> {
    let base = base_url.trim_end_matches('/');
    let full_path = if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    };

    let url = Url::parse(&full_path)
        .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", full_path, e)))?;
    Ok(url.to_string())
}
