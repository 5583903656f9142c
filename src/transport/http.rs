//! Networked transport backed by `reqwest`.

use async_trait::async_trait;
use reqwest::multipart::Form;
use reqwest::{Client, RequestBuilder};
use std::time::Duration;
use tracing::debug;

use super::{Header, MultipartBody, Transport, TransportResponse, TransportResult};
use crate::error::TransportError;

/// HTTP request timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// HTTP connection timeout.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Production transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http_client: Client,
}

impl HttpTransport {
    /// Create a transport with the default timeouts.
    pub fn new() -> Result<Self, TransportError> {
        let http_client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| TransportError::Request {
                url: String::new(),
                detail: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { http_client })
    }

    /// Wrap an already configured client.
    pub fn with_client(http_client: Client) -> Self {
        Self { http_client }
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> TransportResult {
        let response = request.send().await.map_err(|e| map_error(url, e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(|e| map_error(url, e))?;

        debug!("{} responded with HTTP {}", url, status);

        Ok(TransportResponse {
            status,
            headers,
            body: Some(body),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, url: &str, body: MultipartBody, headers: &[Header]) -> TransportResult {
        let form = body
            .fields()
            .iter()
            .fold(Form::new(), |form, (name, value)| {
                form.text(name.clone(), value.clone())
            });

        // The multipart form sets its own Content-Type with the boundary.
        let request = headers
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case("content-type"))
            .fold(self.http_client.post(url), |req, (name, value)| {
                req.header(name.as_str(), value.as_str())
            })
            .multipart(form);

        self.send(url, request).await
    }

    async fn get(&self, url: &str, headers: &[Header]) -> TransportResult {
        let request = headers
            .iter()
            .fold(self.http_client.get(url), |req, (name, value)| {
                req.header(name.as_str(), value.as_str())
            });

        self.send(url, request).await
    }
}

fn map_error(url: &str, error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
        }
    } else {
        TransportError::Request {
            url: url.to_string(),
            detail: error.to_string(),
        }
    }
}
