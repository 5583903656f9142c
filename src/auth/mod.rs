//! Microsoft sign-in.
//!
//! [`OAuthClient`] runs the three calls of the authorization code flow: build
//! the authorize URL, exchange the returned code, fetch the user's profile.
//! Configuration is re-resolved on every call and all HTTP goes through the
//! injected [`Transport`].

pub mod callback_server;
pub mod graph;
pub mod oauth;
pub mod response;

use std::sync::Arc;

use crate::config::{ConfigProvider, Endpoints};
use crate::transport::Transport;

/// Entry point for the login flow.
#[derive(Clone)]
pub struct OAuthClient {
    config: ConfigProvider,
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
}

impl OAuthClient {
    /// Create a client talking to the Microsoft endpoints.
    pub fn new(config: ConfigProvider, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            endpoints: Endpoints::default(),
        }
    }

    /// Replace the remote endpoints, e.g. to point at a mock server.
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn config(&self) -> &ConfigProvider {
        &self.config
    }
}

impl std::fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClient")
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}
