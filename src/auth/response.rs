//! Turns transport results into typed responses or [`OAuthError`]s.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::OAuthError;
use crate::transport::TransportResult;

/// Error bodies returned by the token endpoint and by Microsoft Graph.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    /// RFC 6749 token endpoint error.
    OAuth {
        error: String,
        error_description: Option<String>,
    },
    /// Graph API error envelope.
    Graph { error: GraphError },
}

#[derive(Debug, Deserialize)]
struct GraphError {
    code: String,
    message: Option<String>,
}

/// Normalize a transport result into `T`.
///
/// Transport failures pass through untouched. A missing or blank body is
/// [`OAuthError::NoBody`]. A JSON body with a top-level `error` member becomes
/// [`OAuthError::Provider`]; anything else is deserialized into `T`.
pub fn normalize<T: DeserializeOwned>(result: TransportResult) -> Result<T, OAuthError> {
    let response = result?;
    let status = response.status;

    let body = match response.body {
        Some(body) if !body.trim().is_empty() => body,
        _ => return Err(OAuthError::NoBody),
    };

    let value: Value = serde_json::from_str(&body)?;

    if value.get("error").is_some() {
        if let Ok(error) = serde_json::from_value::<ErrorBody>(value.clone()) {
            return Err(provider_error(status, error));
        }
    }

    Ok(serde_json::from_value(value)?)
}

fn provider_error(status: u16, error: ErrorBody) -> OAuthError {
    match error {
        ErrorBody::OAuth {
            error,
            error_description,
        } => OAuthError::Provider {
            status,
            code: error,
            description: error_description,
        },
        ErrorBody::Graph { error } => OAuthError::Provider {
            status,
            code: error.code,
            description: error.message,
        },
    }
}
