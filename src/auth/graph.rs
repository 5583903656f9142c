//! Microsoft Graph profile lookup for the signed-in user.

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::response::normalize;
use super::OAuthClient;
use crate::error::OAuthError;
use crate::transport::Header;

/// User profile from Microsoft Graph /me endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Unique identifier for the user.
    pub id: String,

    /// User's display name.
    pub display_name: Option<String>,

    /// User's given (first) name.
    pub given_name: Option<String>,

    /// User's surname (last name).
    pub surname: Option<String>,

    /// User's email address.
    pub mail: Option<String>,

    /// User Principal Name (typically email-like format).
    pub user_principal_name: Option<String>,

    pub job_title: Option<String>,

    pub office_location: Option<String>,

    pub mobile_phone: Option<String>,

    #[serde(default)]
    pub business_phones: Vec<String>,

    pub preferred_language: Option<String>,

    /// Members not modelled above, such as `@odata.context`.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserProfile {
    /// Get the best available display name.
    pub fn display_name_or_upn(&self) -> String {
        self.display_name
            .clone()
            .or_else(|| self.user_principal_name.clone())
            .unwrap_or_else(|| "Unknown User".to_string())
    }

    /// Get the best available email.
    pub fn email(&self) -> String {
        self.mail
            .clone()
            .or_else(|| self.user_principal_name.clone())
            .unwrap_or_else(|| "No email".to_string())
    }
}

impl OAuthClient {
    /// Fetch the signed-in user's profile with a bearer token.
    pub async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, OAuthError> {
        if access_token.is_empty() {
            return Err(OAuthError::InvalidArgument("access_token"));
        }

        let headers: Vec<Header> = vec![
            ("Authorization".into(), format!("Bearer {}", access_token)),
            ("Content-Type".into(), "application/json".into()),
        ];

        debug!("Fetching user profile from {}", self.endpoints.profile);

        let result = self.transport.get(&self.endpoints.profile, &headers).await;

        normalize(result).map_err(|e| {
            error!("Profile request failed: {}", e);
            e
        })
    }
}
