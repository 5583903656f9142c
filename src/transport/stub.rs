//! Deterministic transport returning canned results.
//!
//! Used by tests to drive the flow without network access. Every request is
//! recorded so assertions can inspect exactly what would have been sent.

use async_trait::async_trait;
use std::sync::Mutex;

use super::{find_header, Header, MultipartBody, Transport, TransportResult};
use crate::error::TransportError;

/// A request captured by [`StubTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub headers: Vec<Header>,
    pub body: Option<MultipartBody>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

struct Route {
    method: &'static str,
    url: String,
    required_fields: Vec<(String, String)>,
    result: TransportResult,
}

impl Route {
    fn matches(&self, method: &str, url: &str, body: Option<&MultipartBody>) -> bool {
        if self.method != method || self.url != url {
            return false;
        }
        self.required_fields
            .iter()
            .all(|(name, value)| body.and_then(|b| b.get(name)) == Some(value.as_str()))
    }
}

/// Transport that answers known requests with fixed results.
#[derive(Default)]
pub struct StubTransport {
    routes: Vec<Route>,
    recorded: Mutex<Vec<RecordedRequest>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `GET url` with `result`.
    pub fn on_get(mut self, url: impl Into<String>, result: TransportResult) -> Self {
        self.routes.push(Route {
            method: "GET",
            url: url.into(),
            required_fields: Vec::new(),
            result,
        });
        self
    }

    /// Answer any `POST url` with `result`.
    pub fn on_post(self, url: impl Into<String>, result: TransportResult) -> Self {
        self.on_post_with(url, &[], result)
    }

    /// Answer `POST url` with `result` only when the body carries all `fields`.
    pub fn on_post_with(
        mut self,
        url: impl Into<String>,
        fields: &[(&str, &str)],
        result: TransportResult,
    ) -> Self {
        self.routes.push(Route {
            method: "POST",
            url: url.into(),
            required_fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            result,
        });
        self
    }

    /// Requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.recorded
            .lock()
            .map(|r| r.to_vec())
            .unwrap_or_default()
    }

    fn respond(
        &self,
        method: &'static str,
        url: &str,
        headers: &[Header],
        body: Option<MultipartBody>,
    ) -> TransportResult {
        let result = self
            .routes
            .iter()
            .find(|route| route.matches(method, url, body.as_ref()))
            .map(|route| route.result.clone())
            .unwrap_or_else(|| {
                Err(TransportError::Unmatched {
                    method: method.to_string(),
                    url: url.to_string(),
                })
            });

        if let Ok(mut recorded) = self.recorded.lock() {
            recorded.push(RecordedRequest {
                method,
                url: url.to_string(),
                headers: headers.to_vec(),
                body,
            });
        }

        result
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn post(&self, url: &str, body: MultipartBody, headers: &[Header]) -> TransportResult {
        self.respond("POST", url, headers, Some(body))
    }

    async fn get(&self, url: &str, headers: &[Header]) -> TransportResult {
        self.respond("GET", url, headers, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportResponse;

    #[tokio::test]
    async fn test_returns_canned_response() {
        let stub = StubTransport::new().on_get(
            "https://example.com/me",
            Ok(TransportResponse::new(200, r#"{"id":"1"}"#)),
        );

        let response = stub.get("https://example.com/me", &[]).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body.as_deref(), Some(r#"{"id":"1"}"#));
    }

    #[tokio::test]
    async fn test_unknown_request_is_unmatched() {
        let stub = StubTransport::new();

        let result = stub.get("https://example.com/other", &[]).await;
        assert_eq!(
            result,
            Err(TransportError::Unmatched {
                method: "GET".into(),
                url: "https://example.com/other".into(),
            })
        );
    }

    #[tokio::test]
    async fn test_post_requires_fields() {
        let stub = StubTransport::new().on_post_with(
            "https://example.com/token",
            &[("code", "good")],
            Ok(TransportResponse::new(200, "{}")),
        );

        let bad = MultipartBody::new().text("code", "bad");
        assert!(stub.post("https://example.com/token", bad, &[]).await.is_err());

        let good = MultipartBody::new().text("code", "good");
        assert!(stub.post("https://example.com/token", good, &[]).await.is_ok());

        let requests = stub.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].method, "POST");
        assert_eq!(requests[1].body.as_ref().unwrap().get("code"), Some("good"));
    }
}
