//! Error types for the login flow.
//!
//! Uses `thiserror` for library-style errors with automatic `Display` and `Error` implementations.

use thiserror::Error;

/// Failures reported by a [`Transport`](crate::transport::Transport) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request to {url} failed: {detail}")]
    Request { url: String, detail: String },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("No canned response for {method} {url}")]
    Unmatched { method: String, url: String },
}

/// Errors surfaced by the authorization code flow.
#[derive(Error, Debug)]
pub enum OAuthError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Response had no body")]
    NoBody,

    #[error("Failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Identity provider returned {code} (HTTP {status})")]
    Provider {
        status: u16,
        code: String,
        description: Option<String>,
    },

    #[error("{0} is not configured")]
    MissingConfig(&'static str),

    #[error("{0} must not be empty")]
    InvalidArgument(&'static str),

    #[error("Authorization was denied: {0}")]
    Denied(String),

    #[error("Callback did not include an authorization code")]
    MissingCode,

    #[error("State validation failed (possible CSRF attack)")]
    StateMismatch,
}

impl OAuthError {
    /// Returns a user-friendly message for display on an error page.
    pub fn user_message(&self) -> &str {
        match self {
            Self::Transport(TransportError::Timeout { .. }) => {
                "Microsoft did not respond in time. Please try again."
            }
            Self::Transport(_) => "Could not reach Microsoft. Check your connection.",
            Self::NoBody | Self::Decode(_) => "Unexpected response from Microsoft. Please try again.",
            Self::Provider { .. } => "Microsoft rejected the sign-in. Please try again.",
            Self::MissingConfig(_) => "Sign-in is not configured on this server.",
            Self::InvalidArgument(_) | Self::MissingCode => "Invalid sign-in request.",
            Self::Denied(_) => "Sign-in was cancelled or denied.",
            Self::StateMismatch => "Security error. Please try signing in again.",
        }
    }

    /// Returns true if the caller should send the user back through the login flow.
    pub fn restart_login(&self) -> bool {
        !matches!(self, Self::MissingConfig(_))
    }
}
