//! Thin wrapper over the Slack Web API.
//!
//! Requests carry a bearer token and, in user mode, the session cookie.
//! Every method returns decoded JSON; error envelopes are mapped onto the
//! stable code set in [`crate::error`].

use reqwest::header::{COOKIE, RETRY_AFTER};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use slack_mcp_common::http_client::create_api_client;

use crate::error::SlackError;

/// Default Slack Web API base.
pub const DEFAULT_API_BASE: &str = "https://slack.com/api";

/// Fallback wait when Slack rate-limits without a Retry-After header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

/// Credentials a client is bound to.
#[derive(Clone)]
pub struct SlackAuth {
    token: SecretString,
    cookie: Option<SecretString>,
}

impl SlackAuth {
    /// Bot-mode binding: bearer token only.
    pub fn bot(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            cookie: None,
        }
    }

    /// User-mode binding: bearer token plus session cookie.
    pub fn user(token: impl Into<String>, cookie: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            cookie: Some(SecretString::from(cookie.into())),
        }
    }

    /// Whether this binding carries a session cookie.
    pub fn is_user(&self) -> bool {
        self.cookie.is_some()
    }
}

impl std::fmt::Debug for SlackAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackAuth")
            .field("token", &"[REDACTED]")
            .field("cookie", &self.cookie.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// One bound Slack Web API client.
pub struct SlackClient {
    http: reqwest::Client,
    api_base: String,
    auth: SlackAuth,
}

impl SlackClient {
    /// Create a client against the public Slack API.
    pub fn new(auth: SlackAuth) -> Result<Self, SlackError> {
        Self::with_api_base(auth, DEFAULT_API_BASE)
    }

    /// Create a client against a custom API base (tests point this at a
    /// local mock server).
    pub fn with_api_base(auth: SlackAuth, api_base: impl Into<String>) -> Result<Self, SlackError> {
        let http = create_api_client().map_err(SlackError::Network)?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            auth,
        })
    }

    /// Whether the bound credentials are user-mode.
    pub fn is_user_auth(&self) -> bool {
        self.auth.is_user()
    }

    /// Call one Web API method with query parameters.
    ///
    /// `context` is spliced into error messages so failures identify the
    /// offending id.
    pub async fn call(
        &self,
        method: &str,
        params: &[(&str, String)],
        context: &str,
    ) -> Result<Value, SlackError> {
        let url = format!("{}/{}", self.api_base, method);
        let mut request = self
            .http
            .get(&url)
            .bearer_auth(self.auth.token.expose_secret())
            .query(params);
        if let Some(cookie) = &self.auth.cookie {
            request = request.header(COOKIE, format!("d={}", cookie.expose_secret()));
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(SlackError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            return Err(SlackError::Network(format!(
                "Slack returned HTTP {status} for {method}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SlackError::Json(e.to_string()))?;

        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            let slack_code = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            tracing::debug!(method, code = slack_code, "slack api error");
            return Err(SlackError::api(slack_code, context));
        }

        Ok(body)
    }

    /// `conversations.list` - one page of public channels.
    pub async fn conversations_list(
        &self,
        limit: u32,
        cursor: Option<&str>,
        exclude_archived: bool,
    ) -> Result<Value, SlackError> {
        let mut params = vec![
            ("types", "public_channel".to_string()),
            ("exclude_archived", exclude_archived.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }
        self.call("conversations.list", &params, "conversations.list")
            .await
    }

    /// `conversations.history` - messages in a channel.
    pub async fn conversations_history(
        &self,
        channel: &str,
        limit: u32,
        oldest: Option<&str>,
        latest: Option<&str>,
        cursor: Option<&str>,
    ) -> Result<Value, SlackError> {
        let mut params = vec![
            ("channel", channel.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(oldest) = oldest {
            params.push(("oldest", oldest.to_string()));
        }
        if let Some(latest) = latest {
            params.push(("latest", latest.to_string()));
        }
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }
        self.call("conversations.history", &params, channel).await
    }

    /// `conversations.replies` - messages in a thread.
    pub async fn conversations_replies(
        &self,
        channel: &str,
        thread_ts: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<Value, SlackError> {
        let mut params = vec![
            ("channel", channel.to_string()),
            ("ts", thread_ts.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }
        let context = format!("{thread_ts} in {channel}");
        self.call("conversations.replies", &params, &context).await
    }

    /// `users.list` - one page of workspace users.
    pub async fn users_list(&self, limit: u32, cursor: Option<&str>) -> Result<Value, SlackError> {
        let mut params = vec![("limit", limit.to_string())];
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }
        self.call("users.list", &params, "users.list").await
    }

    /// `users.info` - a single user.
    pub async fn users_info(&self, user: &str) -> Result<Value, SlackError> {
        let params = vec![("user", user.to_string())];
        self.call("users.info", &params, user).await
    }

    /// `search.messages` - requires a user token.
    pub async fn search_messages(
        &self,
        query: &str,
        count: u32,
        page: Option<u32>,
        sort: Option<&str>,
        sort_dir: Option<&str>,
    ) -> Result<Value, SlackError> {
        let mut params = vec![
            ("query", query.to_string()),
            ("count", count.to_string()),
        ];
        if let Some(page) = page {
            params.push(("page", page.to_string()));
        }
        if let Some(sort) = sort {
            params.push(("sort", sort.to_string()));
        }
        if let Some(sort_dir) = sort_dir {
            params.push(("sort_dir", sort_dir.to_string()));
        }
        self.call("search.messages", &params, query).await
    }

    /// `auth.test` - validate the bound credentials.
    pub async fn auth_test(&self) -> Result<Value, SlackError> {
        self.call("auth.test", &[], "auth.test").await
    }
}
