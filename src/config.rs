//! Configuration loading and management.
//!
//! Every setting resolves from the process environment first, then the embedded
//! config.toml, then a hardcoded default. Resolution happens on each call so a
//! changed environment takes effect without a restart.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use crate::error::OAuthError;
use crate::secure::SecretString;

/// Embedded configuration file content.
const CONFIG_TOML: &str = include_str!("../config.toml");

/// Microsoft identity platform authorization endpoint.
pub const AUTHORIZE_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/authorize";
/// Microsoft identity platform token endpoint.
pub const TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
/// Microsoft Graph signed-in user endpoint.
pub const PROFILE_URL: &str = "https://graph.microsoft.com/v1.0/me";

pub const DEFAULT_SCOPES: &str = "https://graph.microsoft.com/User.Read";
pub const DEFAULT_CALLBACK_PATH: &str = "/auth/microsoft/callback";

/// A setting's environment variable and its key in the `[microsoft]` table.
struct Setting {
    env: &'static str,
    key: &'static str,
}

const CLIENT_ID: Setting = Setting {
    env: "MICROSOFT_CLIENT_ID",
    key: "client_id",
};
const CLIENT_SECRET: Setting = Setting {
    env: "MICROSOFT_CLIENT_SECRET",
    key: "client_secret",
};
const SCOPES_LIST: Setting = Setting {
    env: "MICROSOFT_SCOPES_LIST",
    key: "scopes_list",
};
const CALLBACK_PATH: Setting = Setting {
    env: "MICROSOFT_CALLBACK_PATH",
    key: "callback_path",
};

/// A read-only source of named configuration values.
pub trait ConfigSource: Send + Sync {
    fn lookup(&self, name: &str) -> Option<String>;
}

/// Reads values from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn lookup(&self, name: &str) -> Option<String> {
        env::var(name).ok()
    }
}

impl ConfigSource for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Static application configuration (config.toml).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub microsoft: MicrosoftConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MicrosoftConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<SecretString>,
    #[serde(default)]
    pub scopes_list: Option<String>,
    #[serde(default)]
    pub callback_path: Option<String>,
}

/// Where the demo binary listens for the OAuth callback.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Parse the config.toml embedded at compile time.
    pub fn embedded() -> Result<Self> {
        Self::from_toml_str(CONFIG_TOML).context("Failed to parse embedded config.toml")
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid application configuration")
    }
}

impl ConfigSource for AppConfig {
    fn lookup(&self, name: &str) -> Option<String> {
        let microsoft = &self.microsoft;
        match name {
            "client_id" => microsoft.client_id.clone(),
            "client_secret" => microsoft
                .client_secret
                .as_ref()
                .map(|s| s.expose().to_string()),
            "scopes_list" => microsoft.scopes_list.clone(),
            "callback_path" => microsoft.callback_path.clone(),
            _ => None,
        }
    }
}

/// OAuth settings resolved for a single call.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
    pub scopes: String,
    pub callback_path: String,
}

impl OAuthConfig {
    /// The configured scopes joined by single spaces.
    ///
    /// Accepts both space and `+` as separators in the configured value.
    pub fn scope(&self) -> String {
        self.scopes
            .split(|c: char| c.is_whitespace() || c == '+')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn require_client_id(&self) -> Result<&str, OAuthError> {
        self.client_id
            .as_deref()
            .ok_or(OAuthError::MissingConfig(CLIENT_ID.env))
    }

    pub fn require_client_secret(&self) -> Result<&SecretString, OAuthError> {
        self.client_secret
            .as_ref()
            .ok_or(OAuthError::MissingConfig(CLIENT_SECRET.env))
    }
}

/// Layers the environment over the application config.
#[derive(Clone)]
pub struct ConfigProvider {
    env: Arc<dyn ConfigSource>,
    app: Arc<dyn ConfigSource>,
}

impl ConfigProvider {
    pub fn new(env: impl ConfigSource + 'static, app: impl ConfigSource + 'static) -> Self {
        Self {
            env: Arc::new(env),
            app: Arc::new(app),
        }
    }

    /// Process environment layered over the embedded config.toml.
    pub fn from_environment() -> Result<Self> {
        Ok(Self::new(EnvSource, AppConfig::embedded()?))
    }

    /// Resolve a fresh configuration snapshot.
    pub fn load(&self) -> OAuthConfig {
        OAuthConfig {
            client_id: self.resolve(&CLIENT_ID),
            client_secret: self.resolve(&CLIENT_SECRET).map(SecretString::from),
            scopes: self
                .resolve(&SCOPES_LIST)
                .unwrap_or_else(|| DEFAULT_SCOPES.to_string()),
            callback_path: self
                .resolve(&CALLBACK_PATH)
                .unwrap_or_else(|| DEFAULT_CALLBACK_PATH.to_string()),
        }
    }

    fn resolve(&self, setting: &Setting) -> Option<String> {
        present(self.env.lookup(setting.env)).or_else(|| present(self.app.lookup(setting.key)))
    }
}

impl std::fmt::Debug for ConfigProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigProvider").finish_non_exhaustive()
    }
}

/// Blank values count as unset.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Remote endpoints used by the flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub authorize: String,
    pub token: String,
    pub profile: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            authorize: AUTHORIZE_URL.to_string(),
            token: TOKEN_URL.to_string(),
            profile: PROFILE_URL.to_string(),
        }
    }
}
