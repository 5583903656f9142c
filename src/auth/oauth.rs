//! Authorization URL construction and authorization code exchange.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};
use url::Url;

use super::response::normalize;
use super::OAuthClient;
use crate::config::OAuthConfig;
use crate::error::OAuthError;
use crate::secure::SecretString;
use crate::transport::{Header, MultipartBody};

/// Host and port of the incoming request, used to build the redirect URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectContext {
    pub host: String,
    pub port: Option<u16>,
}

impl RedirectContext {
    pub fn new(host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Build a context from a `Host` header value such as `localhost:4000`.
    pub fn from_host_header(value: &str) -> Self {
        let value = value.trim();
        match value.rsplit_once(':') {
            Some((host, port)) => match port.parse::<u16>() {
                Ok(port) => Self::new(host, Some(port)),
                Err(_) => Self::new(value, None),
            },
            None => Self::new(value, None),
        }
    }

    /// Plain HTTP with the port for `localhost`, HTTPS on the bare host everywhere else.
    pub fn base_url(&self) -> String {
        if self.host == "localhost" {
            match self.port {
                Some(port) => format!("http://{}:{}", self.host, port),
                None => format!("http://{}", self.host),
            }
        } else {
            format!("https://{}", self.host)
        }
    }

    pub fn redirect_uri(&self, callback_path: &str) -> String {
        format!("{}{}", self.base_url(), callback_path)
    }
}

/// Token response from the Microsoft identity platform.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: SecretString,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub ext_expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<SecretString>,
    #[serde(default)]
    pub id_token: Option<String>,
    /// Any other members of the response.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TokenResponse {
    /// When the access token expires, counting from `now`.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let seconds = i64::try_from(self.expires_in?).ok()?;
        now.checked_add_signed(Duration::try_seconds(seconds)?)
    }
}

/// Query parameters returned to the redirect URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: Option<String>,
}

/// Authorization URL without a `state` parameter.
pub fn authorize_url(endpoint: &str, config: &OAuthConfig, context: &RedirectContext) -> String {
    let client_id = config.client_id.clone().unwrap_or_default();
    let redirect_uri = context.redirect_uri(&config.callback_path);
    let scope = config.scope();

    let params = [
        ("client_id", client_id.as_str()),
        ("response_type", "code"),
        ("redirect_uri", redirect_uri.as_str()),
        ("scope", scope.as_str()),
        ("response_mode", "query"),
    ];

    let query = params
        .iter()
        .map(|(name, value)| format!("{}={}", name, urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");

    format!("{}?{}", endpoint, query)
}

/// Append `state` as the final query parameter.
pub fn append_state(url: &str, state: &str) -> String {
    format!("{}&state={}", url, urlencoding::encode(state))
}

/// Multipart fields for the authorization code grant.
fn token_request(
    config: &OAuthConfig,
    client_id: &str,
    client_secret: &SecretString,
    code: &str,
    context: &RedirectContext,
) -> MultipartBody {
    MultipartBody::new()
        .text("grant_type", "authorization_code")
        .text("client_id", client_id)
        .text("redirect_uri", context.redirect_uri(&config.callback_path))
        .text("code", code)
        .text("scope", config.scope())
        .text("client_secret", client_secret.expose())
}

impl OAuthClient {
    /// Build the URL that sends the user to Microsoft's sign-in page.
    pub fn build_authorize_url(&self, context: &RedirectContext) -> String {
        let config = self.config.load();
        if config.client_id.is_none() {
            warn!("Building authorization URL without a client_id");
        }

        let url = authorize_url(&self.endpoints.authorize, &config, context);
        debug!(
            "Built authorization URL for {}",
            context.redirect_uri(&config.callback_path)
        );
        url
    }

    /// Build the authorization URL with an anti-forgery `state` appended last.
    pub fn build_authorize_url_with_state(
        &self,
        context: &RedirectContext,
        state: &str,
    ) -> Result<String, OAuthError> {
        if state.is_empty() {
            return Err(OAuthError::InvalidArgument("state"));
        }
        Ok(append_state(&self.build_authorize_url(context), state))
    }

    /// Exchange an authorization code for tokens.
    ///
    /// Makes a single attempt; failures are returned to the caller as-is.
    pub async fn exchange_code(
        &self,
        code: &str,
        context: &RedirectContext,
    ) -> Result<TokenResponse, OAuthError> {
        if code.is_empty() {
            return Err(OAuthError::InvalidArgument("code"));
        }

        let config = self.config.load();
        let client_id = config.require_client_id()?;
        let client_secret = config.require_client_secret()?;

        let body = token_request(&config, client_id, client_secret, code, context);
        let headers: Vec<Header> = vec![("Content-Type".into(), "multipart/form-data".into())];

        debug!("Exchanging authorization code at {}", self.endpoints.token);

        let result = self
            .transport
            .post(&self.endpoints.token, body, &headers)
            .await;

        let token: TokenResponse = normalize(result).map_err(|e| {
            error!("Token exchange failed: {}", e);
            e
        })?;

        info!("Authorization code exchanged for tokens");
        Ok(token)
    }
}

/// Generate a random URL-safe value for the `state` parameter.
pub fn generate_state() -> String {
    let mut rng = rand::thread_rng();
    let state_bytes: Vec<u8> = (0..16).map(|_| rng.gen()).collect();
    URL_SAFE_NO_PAD.encode(&state_bytes)
}

/// Check the `state` returned on the callback against the one that was sent.
pub fn verify_state(expected: &str, received: Option<&str>) -> Result<(), OAuthError> {
    match received {
        Some(received) if !expected.is_empty() && received == expected => Ok(()),
        _ => Err(OAuthError::StateMismatch),
    }
}

/// Parse the callback URL to extract code and state.
pub fn parse_callback_url(url_string: &str) -> Result<CallbackParams, OAuthError> {
    let url = Url::parse(url_string).map_err(|_| OAuthError::MissingCode)?;

    let params: HashMap<_, _> = url.query_pairs().collect();

    // Check for error response
    if let Some(error) = params.get("error") {
        let description = params
            .get("error_description")
            .map(|s| s.to_string())
            .unwrap_or_else(|| error.to_string());
        return Err(OAuthError::Denied(description));
    }

    let code = params
        .get("code")
        .filter(|c| !c.is_empty())
        .ok_or(OAuthError::MissingCode)?
        .to_string();

    Ok(CallbackParams {
        code,
        state: params.get("state").map(|s| s.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigProvider, Endpoints, TOKEN_URL};
    use crate::error::TransportError;
    use crate::transport::{StubTransport, TransportResponse};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn provider(pairs: &[(&str, &str)]) -> ConfigProvider {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ConfigProvider::new(env, HashMap::<String, String>::new())
    }

    fn credentials() -> ConfigProvider {
        provider(&[
            ("MICROSOFT_CLIENT_ID", "cid"),
            ("MICROSOFT_CLIENT_SECRET", "csecret"),
        ])
    }

    fn query_value(url: &str, name: &str) -> Option<String> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn test_base_url() {
        assert_eq!(
            RedirectContext::new("localhost", Some(4000)).base_url(),
            "http://localhost:4000"
        );
        assert_eq!(
            RedirectContext::new("example.com", Some(8443)).base_url(),
            "https://example.com"
        );
        assert_eq!(
            RedirectContext::new("localhost", None).base_url(),
            "http://localhost"
        );
    }

    #[test]
    fn test_from_host_header() {
        assert_eq!(
            RedirectContext::from_host_header("localhost:4000"),
            RedirectContext::new("localhost", Some(4000))
        );
        assert_eq!(
            RedirectContext::from_host_header("example.com"),
            RedirectContext::new("example.com", None)
        );
        assert_eq!(
            RedirectContext::from_host_header("[::1]:8080"),
            RedirectContext::new("[::1]", Some(8080))
        );
    }

    #[test]
    fn test_authorize_url_exact() {
        let client = OAuthClient::new(credentials(), Arc::new(StubTransport::new()));
        let url = client.build_authorize_url(&RedirectContext::new("localhost", Some(4000)));

        assert_eq!(
            url,
            "https://login.microsoftonline.com/common/oauth2/v2.0/authorize\
             ?client_id=cid\
             &response_type=code\
             &redirect_uri=http%3A%2F%2Flocalhost%3A4000%2Fauth%2Fmicrosoft%2Fcallback\
             &scope=https%3A%2F%2Fgraph.microsoft.com%2FUser.Read\
             &response_mode=query"
        );
    }

    #[test]
    fn test_redirect_uri_ignores_port_on_remote_hosts() {
        let client = OAuthClient::new(credentials(), Arc::new(StubTransport::new()));
        let url = client.build_authorize_url(&RedirectContext::new("example.com", Some(8080)));

        assert_eq!(
            query_value(&url, "redirect_uri").as_deref(),
            Some("https://example.com/auth/microsoft/callback")
        );
    }

    #[test]
    fn test_spaces_encoded_as_percent_20() {
        let config = provider(&[
            ("MICROSOFT_CLIENT_ID", "cid"),
            ("MICROSOFT_SCOPES_LIST", "openid User.Read"),
        ]);
        let client = OAuthClient::new(config, Arc::new(StubTransport::new()));
        let url = client.build_authorize_url(&RedirectContext::new("example.com", None));

        assert!(url.contains("&scope=openid%20User.Read&"));
        assert!(!url.contains('+'));
    }

    #[test]
    fn test_state_is_last_and_extends_base_url() {
        let client = OAuthClient::new(credentials(), Arc::new(StubTransport::new()));
        let context = RedirectContext::new("example.com", None);

        let base = client.build_authorize_url(&context);
        let with_state = client
            .build_authorize_url_with_state(&context, "a b/c")
            .unwrap();

        assert_eq!(with_state, format!("{}&state=a%20b%2Fc", base));
        assert_eq!(query_value(&with_state, "state").as_deref(), Some("a b/c"));
    }

    #[test]
    fn test_empty_state_rejected() {
        let client = OAuthClient::new(credentials(), Arc::new(StubTransport::new()));
        let result = client.build_authorize_url_with_state(&RedirectContext::new("x.com", None), "");
        assert!(matches!(result, Err(OAuthError::InvalidArgument("state"))));
    }

    #[test]
    fn test_authorize_url_is_deterministic() {
        let client = OAuthClient::new(credentials(), Arc::new(StubTransport::new()));
        let context = RedirectContext::new("localhost", Some(3000));

        assert_eq!(
            client.build_authorize_url_with_state(&context, "s").unwrap(),
            client.build_authorize_url_with_state(&context, "s").unwrap()
        );
    }

    #[test]
    fn test_missing_client_id_still_builds() {
        let client = OAuthClient::new(provider(&[]), Arc::new(StubTransport::new()));
        let url = client.build_authorize_url(&RedirectContext::new("example.com", None));
        assert!(url.contains("?client_id=&response_type=code"));
    }

    #[tokio::test]
    async fn test_exchange_code_posts_form() {
        let stub = Arc::new(StubTransport::new().on_post_with(
            TOKEN_URL,
            &[("code", "authcode123")],
            Ok(TransportResponse::new(200, r#"{"access_token":"tok1"}"#)),
        ));
        let client = OAuthClient::new(credentials(), stub.clone());

        let token = client
            .exchange_code("authcode123", &RedirectContext::new("example.com", None))
            .await
            .unwrap();
        assert_eq!(token.access_token.expose(), "tok1");

        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].header("content-type"), Some("multipart/form-data"));

        let body = requests[0].body.as_ref().unwrap();
        let fields: Vec<(&str, &str)> = body
            .fields()
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(
            fields,
            vec![
                ("grant_type", "authorization_code"),
                ("client_id", "cid"),
                ("redirect_uri", "https://example.com/auth/microsoft/callback"),
                ("code", "authcode123"),
                ("scope", "https://graph.microsoft.com/User.Read"),
                ("client_secret", "csecret"),
            ]
        );
    }

    #[tokio::test]
    async fn test_exchange_code_rejects_empty_code() {
        let stub = Arc::new(StubTransport::new());
        let client = OAuthClient::new(credentials(), stub.clone());

        let result = client
            .exchange_code("", &RedirectContext::new("example.com", None))
            .await;

        assert!(matches!(result, Err(OAuthError::InvalidArgument("code"))));
        assert!(stub.requests().is_empty());
    }

    #[tokio::test]
    async fn test_exchange_code_requires_secret() {
        let stub = Arc::new(StubTransport::new());
        let client = OAuthClient::new(provider(&[("MICROSOFT_CLIENT_ID", "cid")]), stub.clone());

        let result = client
            .exchange_code("code", &RedirectContext::new("example.com", None))
            .await;

        assert!(matches!(
            result,
            Err(OAuthError::MissingConfig("MICROSOFT_CLIENT_SECRET"))
        ));
        assert!(stub.requests().is_empty());
    }

    #[tokio::test]
    async fn test_exchange_code_surfaces_transport_error() {
        let failure = TransportError::Timeout {
            url: "https://mock/token".into(),
        };
        let stub = Arc::new(StubTransport::new().on_post("https://mock/token", Err(failure.clone())));
        let client = OAuthClient::new(credentials(), stub.clone()).with_endpoints(Endpoints {
            token: "https://mock/token".into(),
            ..Endpoints::default()
        });

        let result = client
            .exchange_code("code", &RedirectContext::new("example.com", None))
            .await;

        match result {
            Err(OAuthError::Transport(e)) => assert_eq!(e, failure),
            other => panic!("expected transport error, got {:?}", other),
        }
        assert_eq!(stub.requests().len(), 1);
    }

    #[test]
    fn test_expires_at() {
        let token: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","expires_in":3600}"#).unwrap();
        let now = Utc::now();
        assert_eq!(token.expires_at(now), Some(now + Duration::seconds(3600)));

        let token: TokenResponse = serde_json::from_str(r#"{"access_token":"a"}"#).unwrap();
        assert_eq!(token.expires_at(now), None);
    }

    #[test]
    fn test_generate_state() {
        let a = generate_state();
        let b = generate_state();
        // 16 bytes encode to 22 base64url characters
        assert_eq!(a.len(), 22);
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_state() {
        assert!(verify_state("xyz", Some("xyz")).is_ok());
        assert!(matches!(
            verify_state("xyz", Some("abc")),
            Err(OAuthError::StateMismatch)
        ));
        assert!(matches!(verify_state("xyz", None), Err(OAuthError::StateMismatch)));
        assert!(matches!(verify_state("", Some("")), Err(OAuthError::StateMismatch)));
    }

    #[test]
    fn test_parse_callback_success() {
        let url = "http://localhost:4000/auth/microsoft/callback?code=abc123&state=xyz789";
        let params = parse_callback_url(url).unwrap();
        assert_eq!(params.code, "abc123");
        assert_eq!(params.state.as_deref(), Some("xyz789"));
    }

    #[test]
    fn test_parse_callback_error() {
        let url = "http://localhost:4000/auth/microsoft/callback?error=access_denied&error_description=User%20cancelled";
        match parse_callback_url(url) {
            Err(OAuthError::Denied(description)) => assert_eq!(description, "User cancelled"),
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_callback_missing_code() {
        let url = "http://localhost:4000/auth/microsoft/callback?state=xyz789";
        let result = parse_callback_url(url);
        assert!(matches!(result, Err(OAuthError::MissingCode)));
    }
}
