use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use thiserror::Error;

/// Failure before any HTTP response was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{context}: {details}")]
pub struct TransportError {
    pub context: &'static str,
    pub details: String,
}

impl TransportError {
    pub fn new(context: &'static str, details: impl std::fmt::Display) -> Self {
        Self {
            context,
            details: details.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Build a POST request carrying a JSON body.
    ///
    /// # Errors
    /// Returns an error if the body cannot be serialized.
    pub fn post_json<T: Serialize>(
        url: impl Into<String>,
        body: &T,
    ) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(body)?;
        Ok(Self {
            method: Method::POST,
            url: url.into(),
            headers: vec![("Content-Type", "application/json".to_string())],
            body: Some(body),
        })
    }

    #[must_use]
    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// First `max_chars` of the body prefixed with `": "`, or empty.
    #[must_use]
    pub fn snippet(&self, max_chars: usize) -> String {
        let snippet: String = self.text().chars().take(max_chars).collect();
        if snippet.is_empty() {
            String::new()
        } else {
            format!(": {snippet}")
        }
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Build a transport whose client enforces `timeout` on every request.
    ///
    /// # Errors
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .user_agent(user_agent())
            .build()
            .map_err(|error| TransportError::new("failed to build HTTP client", error))?;
        Ok(Self { client })
    }

    #[must_use]
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|error| TransportError::new("request failed", error))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|error| TransportError::new("failed to read response body", error))?;

        Ok(HttpResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

#[must_use]
pub fn user_agent() -> String {
    format!("correcteur/{}", env!("CARGO_PKG_VERSION"))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_json_sets_content_type_and_body() {
        let request = HttpRequest::post_json("https://example.com", &serde_json::json!({"a": 1}))
            .expect("body should serialize")
            .header("Authorization", "Bearer key");

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.header_value("content-type"), Some("application/json"));
        assert_eq!(request.header_value("authorization"), Some("Bearer key"));
        assert_eq!(request.body.as_deref(), Some(br#"{"a":1}"#.as_slice()));
    }

    #[test]
    fn response_snippet_truncates_and_prefixes() {
        let response = HttpResponse::new(StatusCode::BAD_GATEWAY, "upstream exploded");
        assert_eq!(response.snippet(8), ": upstream");
        assert_eq!(HttpResponse::new(StatusCode::OK, "").snippet(8), "");
    }

    #[test]
    fn response_headers_are_case_insensitive() {
        let response =
            HttpResponse::new(StatusCode::FORBIDDEN, "").with_header("x-ratelimit-remaining", "0");
        assert_eq!(response.header("X-RateLimit-Remaining"), Some("0"));
    }
}
