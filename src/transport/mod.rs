//! HTTP transport capability.
//!
//! The flow never talks to the network directly. Requests go through a
//! [`Transport`] chosen when the client is constructed: [`HttpTransport`] in
//! production, [`StubTransport`] in tests.

pub mod http;
pub mod stub;

use async_trait::async_trait;

use crate::error::TransportError;

pub use http::HttpTransport;
pub use stub::StubTransport;

/// A request or response header.
pub type Header = (String, String);

/// Outcome of a single HTTP exchange.
pub type TransportResult = Result<TransportResponse, TransportError>;

/// Text fields sent as a `multipart/form-data` body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartBody {
    fields: Vec<(String, String)>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text field. Field order is preserved.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Value of the first field with this name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// A completed HTTP exchange. Status codes are not interpreted here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: Vec<Header>,
    pub body: Option<String>,
}

impl TransportResponse {
    /// A response carrying a body and no headers.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Some(body.into()),
        }
    }

    /// A response without a body.
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Case-insensitive header lookup.
pub fn find_header<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Issues HTTP requests on behalf of the flow.
///
/// Implementations perform exactly one attempt per call and report any
/// response, whatever its status, as `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, url: &str, body: MultipartBody, headers: &[Header]) -> TransportResult;

    async fn get(&self, url: &str, headers: &[Header]) -> TransportResult;
}
