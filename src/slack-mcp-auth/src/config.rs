//! Authentication resolution and refresh settings.
//!
//! Two auth modes exist with distinct required inputs; behavior is always
//! selected by matching the resolved [`AuthConfig`], never by probing for
//! fields. Bot mode wins whenever `SLACK_BOT_TOKEN` is present, even if
//! user variables are also set - existing bot deployments keep working
//! when operators later add user credentials.

use std::path::PathBuf;
use std::sync::RwLock;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::warn;

use slack_mcp_api::SlackAuth;

/// Default days between automatic refreshes.
pub const DEFAULT_REFRESH_INTERVAL_DAYS: u32 = 7;

/// How requests to Slack are authenticated.
#[derive(Clone)]
pub enum AuthConfig {
    /// Bot token (`xoxb-`); no refresh.
    Bot {
        /// The bot token.
        token: SecretString,
    },
    /// User token (`xoxc-`) plus session cookie (`xoxd-`); refreshable.
    User {
        /// The user token.
        token: SecretString,
        /// The `d` session cookie.
        cookie: SecretString,
    },
}

impl AuthConfig {
    /// Whether this is user-mode auth.
    pub fn is_user(&self) -> bool {
        matches!(self, Self::User { .. })
    }

    /// The bearer token.
    pub fn token(&self) -> &str {
        match self {
            Self::Bot { token } | Self::User { token, .. } => token.expose_secret(),
        }
    }

    /// The session cookie, user mode only.
    pub fn cookie(&self) -> Option<&str> {
        match self {
            Self::Bot { .. } => None,
            Self::User { cookie, .. } => Some(cookie.expose_secret()),
        }
    }

    /// The client binding for this auth.
    pub fn to_slack_auth(&self) -> SlackAuth {
        match self {
            Self::Bot { token } => SlackAuth::bot(token.expose_secret()),
            Self::User { token, cookie } => {
                SlackAuth::user(token.expose_secret(), cookie.expose_secret())
            }
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bot { .. } => f.debug_struct("Bot").field("token", &"[REDACTED]").finish(),
            Self::User { .. } => f
                .debug_struct("User")
                .field("token", &"[REDACTED]")
                .field("cookie", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Configuration failures surfaced at startup; never retryable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// User token present but with the wrong prefix.
    #[error("SLACK_USER_TOKEN must start with 'xoxc-'")]
    InvalidUserTokenPrefix,
    /// User token present but the cookie is missing.
    #[error(
        "SLACK_USER_TOKEN is set but SLACK_COOKIE_D is missing; both are required for user authentication"
    )]
    MissingCookie,
    /// Neither auth mode is configured.
    #[error(
        "no Slack authentication configured: set SLACK_BOT_TOKEN, or SLACK_USER_TOKEN and SLACK_COOKIE_D"
    )]
    NotConfigured,
}

/// Resolves the active [`AuthConfig`] from the environment and caches it.
pub struct AuthResolver {
    cached: RwLock<Option<AuthConfig>>,
}

impl AuthResolver {
    /// Create a resolver with nothing cached.
    pub fn new() -> Self {
        Self {
            cached: RwLock::new(None),
        }
    }

    /// Resolve from the process environment, returning the cached value on
    /// subsequent calls until [`AuthResolver::reset`].
    pub fn resolve(&self) -> Result<AuthConfig, AuthError> {
        self.resolve_with(env_lookup)
    }

    /// Resolve through an injected variable lookup (tests).
    pub fn resolve_with(
        &self,
        get: impl Fn(&str) -> Option<String>,
    ) -> Result<AuthConfig, AuthError> {
        {
            let cached = self.cached.read().expect("auth cache lock poisoned");
            if let Some(config) = &*cached {
                return Ok(config.clone());
            }
        }
        let config = resolve_auth_config(get)?;
        *self.cached.write().expect("auth cache lock poisoned") = Some(config.clone());
        Ok(config)
    }

    /// Drop the cached resolution (tests).
    pub fn reset(&self) {
        *self.cached.write().expect("auth cache lock poisoned") = None;
    }
}

impl Default for AuthResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// One uncached resolution pass.
fn resolve_auth_config(get: impl Fn(&str) -> Option<String>) -> Result<AuthConfig, AuthError> {
    if let Some(bot_token) = get("SLACK_BOT_TOKEN").filter(|t| !t.is_empty()) {
        if !bot_token.starts_with("xoxb-") {
            warn!("SLACK_BOT_TOKEN does not start with 'xoxb-', this may be incorrect");
        }
        return Ok(AuthConfig::Bot {
            token: SecretString::from(bot_token),
        });
    }

    if let Some(user_token) = get("SLACK_USER_TOKEN").filter(|t| !t.is_empty()) {
        if !user_token.starts_with("xoxc-") {
            return Err(AuthError::InvalidUserTokenPrefix);
        }
        let cookie = get("SLACK_COOKIE_D")
            .filter(|c| !c.is_empty())
            .ok_or(AuthError::MissingCookie)?;
        return Ok(AuthConfig::User {
            token: SecretString::from(user_token),
            cookie: SecretString::from(cookie),
        });
    }

    Err(AuthError::NotConfigured)
}

/// Refresh settings from the environment.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Path of the persisted credentials file.
    pub credentials_path: PathBuf,
    /// Days between automatic refreshes.
    pub interval_days: u32,
    /// Workspace subdomain used in the refresh URL.
    pub workspace: Option<String>,
    /// Whether automatic refresh is enabled.
    pub enabled: bool,
}

impl RefreshConfig {
    /// Load from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    /// Load through an injected variable lookup (tests).
    ///
    /// Invalid interval values silently fall back to the default; only the
    /// literal `"false"` disables refresh.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let credentials_path = get("SLACK_CREDENTIALS_PATH")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_credentials_path);

        let interval_days = get("SLACK_REFRESH_INTERVAL_DAYS")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|days| *days > 0)
            .unwrap_or(DEFAULT_REFRESH_INTERVAL_DAYS);

        let workspace = get("SLACK_WORKSPACE").filter(|w| !w.is_empty());
        let enabled = get("SLACK_REFRESH_ENABLED").as_deref() != Some("false");

        Self {
            credentials_path,
            interval_days,
            workspace,
            enabled,
        }
    }
}

fn default_credentials_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".slack-mcp-server")
        .join("credentials.json")
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Search is a user-token-only Slack API.
pub fn is_search_available(auth: &AuthConfig) -> bool {
    auth.is_user()
}

/// Refresh needs user auth, a workspace to scrape, and the enable flag.
pub fn is_refresh_available(auth: &AuthConfig, config: &RefreshConfig) -> bool {
    auth.is_user() && config.workspace.is_some() && config.enabled
}
