//! Login with Microsoft.
//!
//! A small helper for the OAuth2 authorization code flow against the Microsoft
//! identity platform: build the authorize URL, exchange the returned code for
//! tokens, and read the signed-in user's profile from Microsoft Graph.
//!
//! ```no_run
//! use std::sync::Arc;
//! use mslogin::{ConfigProvider, HttpTransport, OAuthClient, RedirectContext};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = OAuthClient::new(
//!     ConfigProvider::from_environment()?,
//!     Arc::new(HttpTransport::new()?),
//! );
//! let context = RedirectContext::from_host_header("localhost:4000");
//!
//! let state = mslogin::generate_state();
//! let login_url = client.build_authorize_url_with_state(&context, &state)?;
//! // Redirect the user to `login_url`; Microsoft sends them back with `code` and `state`.
//!
//! # let code = "code-from-callback";
//! let token = client.exchange_code(code, &context).await?;
//! let profile = client.fetch_profile(token.access_token.expose()).await?;
//! println!("Signed in as {}", profile.display_name_or_upn());
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]

pub mod auth;
pub mod config;
pub mod error;
pub mod secure;
pub mod transport;

pub use auth::graph::UserProfile;
pub use auth::oauth::{
    generate_state, parse_callback_url, verify_state, CallbackParams, RedirectContext,
    TokenResponse,
};
pub use auth::response::normalize;
pub use auth::OAuthClient;
pub use config::{AppConfig, ConfigProvider, ConfigSource, EnvSource, Endpoints, OAuthConfig};
pub use error::{OAuthError, TransportError};
pub use secure::SecretString;
pub use transport::{
    HttpTransport, MultipartBody, StubTransport, Transport, TransportResponse, TransportResult,
};
