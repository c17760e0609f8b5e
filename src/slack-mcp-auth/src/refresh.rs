//! The refresh engine.
//!
//! Moves a user-mode session forward before it lapses: fetch the workspace
//! home page with the current cookie, extract the rotated token and cookie,
//! validate them against `auth.test`, persist, and rebind the live client.
//! A failed refresh never touches the persisted file or the bound client -
//! the server keeps serving with whatever worked last.
//!
//! Exactly one refresh runs at a time. The guard is an atomic
//! compare-and-set on the status flag; losers return `REFRESH_IN_PROGRESS`
//! immediately without waiting.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::header::{COOKIE, SET_COOKIE};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use slack_mcp_api::{SlackAuth, SlackClient, SlackClientHolder};
use slack_mcp_common::http_client::create_scrape_client;
use slack_mcp_common::{ErrorLog, ErrorLogEntry, mask_secret};

use crate::config::RefreshConfig;
use crate::error::{RefreshError, RefreshErrorCode};
use crate::extract::{extract_api_token, extract_rotated_cookie, looks_like_signin};
use crate::store::{
    CREDENTIALS_VERSION, CredentialMetadata, CredentialSet, CredentialStore, RefreshSource,
    StoredCredentials,
};

/// Attempts per `refresh_with_retry` run.
const MAX_ATTEMPTS: u32 = 3;

/// Backoff base delay.
const BASE_DELAY: Duration = Duration::from_secs(1);

/// Backoff multiplier per attempt.
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Backoff ceiling.
const MAX_DELAY: Duration = Duration::from_secs(30);

/// Jitter applied to each delay, as a fraction.
const JITTER: f64 = 0.25;

/// Whether a refresh is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStatus {
    /// Nothing running.
    Idle,
    /// A refresh holds the guard.
    InProgress,
}

/// A recorded refresh failure.
#[derive(Debug, Clone)]
pub struct RefreshFailure {
    /// Stable code.
    pub code: RefreshErrorCode,
    /// Message.
    pub message: String,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// Which attempt failed.
    pub attempt: u32,
    /// Whether the code was retryable.
    pub retryable: bool,
}

/// In-memory refresh state; readers get consistent snapshots.
#[derive(Debug, Clone)]
pub struct RefreshState {
    /// Whether a refresh is running.
    pub status: RefreshStatus,
    /// Last time a refresh started.
    pub last_attempt: Option<DateTime<Utc>>,
    /// Last time a refresh succeeded.
    pub last_success: Option<DateTime<Utc>>,
    /// The most recent terminal failure.
    pub last_error: Option<RefreshFailure>,
    /// Terminal failures since the last success.
    pub consecutive_failures: u32,
    /// Whether the running refresh was manually triggered.
    pub is_manual_trigger: bool,
}

impl RefreshState {
    fn new() -> Self {
        Self {
            status: RefreshStatus::Idle,
            last_attempt: None,
            last_success: None,
            last_error: None,
            consecutive_failures: 0,
            is_manual_trigger: false,
        }
    }
}

/// What a successful refresh reports back.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    /// When the new credentials were stamped.
    pub refreshed_at: DateTime<Utc>,
    /// Total rotations recorded in the store.
    pub total_refreshes: u64,
}

/// The refresh engine. One per process.
pub struct RefreshManager {
    store: CredentialStore,
    holder: std::sync::Arc<SlackClientHolder>,
    errorlog: ErrorLog,
    workspace: String,
    interval_days: u32,
    home_base: String,
    api_base: String,
    scrape: reqwest::Client,
    in_progress: AtomicBool,
    state: Mutex<RefreshState>,
    cancel: CancellationToken,
    base_delay: Duration,
    max_delay: Duration,
}

impl RefreshManager {
    /// Create a manager for a refresh-capable configuration.
    ///
    /// Fails with `REFRESH_NOT_AVAILABLE` when no workspace is configured -
    /// there is nothing to scrape without one.
    pub fn new(
        store: CredentialStore,
        holder: std::sync::Arc<SlackClientHolder>,
        config: &RefreshConfig,
        errorlog: ErrorLog,
        cancel: CancellationToken,
    ) -> Result<Self, RefreshError> {
        let workspace = config.workspace.clone().ok_or_else(|| {
            RefreshError::new(
                RefreshErrorCode::RefreshNotAvailable,
                "refresh requires SLACK_WORKSPACE to be set",
            )
        })?;
        let scrape = create_scrape_client()
            .map_err(|e| RefreshError::new(RefreshErrorCode::Unknown, e))?;

        Ok(Self {
            store,
            holder,
            errorlog,
            home_base: format!("https://{workspace}.slack.com"),
            api_base: slack_mcp_api::client::DEFAULT_API_BASE.to_string(),
            workspace,
            interval_days: config.interval_days,
            scrape,
            in_progress: AtomicBool::new(false),
            state: Mutex::new(RefreshState::new()),
            cancel,
            base_delay: BASE_DELAY,
            max_delay: MAX_DELAY,
        })
    }

    /// Point the scrape and validation at custom bases (tests).
    pub fn with_bases(mut self, home_base: impl Into<String>, api_base: impl Into<String>) -> Self {
        self.home_base = home_base.into();
        self.api_base = api_base.into();
        self
    }

    /// Shrink the retry delays (tests).
    pub fn with_retry_delays(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// A consistent snapshot of the refresh state.
    pub fn state(&self) -> RefreshState {
        self.state.lock().expect("refresh state lock poisoned").clone()
    }

    /// Whether a refresh currently holds the guard.
    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Whether persisted credentials exist, load cleanly, and are older
    /// than the refresh interval. Any load failure reads as "not due";
    /// the operator sees the underlying problem through the error log
    /// when an actual refresh runs.
    pub fn is_refresh_due(&self) -> bool {
        let Ok(credentials) = self.store.load() else {
            return false;
        };
        let due_at = credentials.metadata.last_refreshed
            + chrono::Duration::hours(24 * i64::from(self.interval_days));
        due_at <= Utc::now()
    }

    /// One guarded refresh attempt, no retries.
    pub async fn refresh(&self, is_manual: bool) -> Result<RefreshOutcome, RefreshError> {
        self.begin(is_manual)?;
        let result = self.attempt_refresh(is_manual).await;
        match result {
            Ok(outcome) => {
                self.finish_success();
                Ok(outcome)
            }
            Err(e) => {
                self.report_terminal_failure(&e, 1);
                self.finish_failure(&e, 1);
                Err(e)
            }
        }
    }

    /// A guarded refresh with exponential backoff on retryable failures.
    ///
    /// The guard is held across all attempts; concurrent callers fail fast
    /// with `REFRESH_IN_PROGRESS` for the whole run.
    pub async fn refresh_with_retry(&self, is_manual: bool) -> Result<RefreshOutcome, RefreshError> {
        self.begin(is_manual)?;

        let mut attempt = 1;
        loop {
            match self.attempt_refresh(is_manual).await {
                Ok(outcome) => {
                    self.finish_success();
                    info!(
                        manual = is_manual,
                        total_refreshes = outcome.total_refreshes,
                        "credentials refreshed"
                    );
                    return Ok(outcome);
                }
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        attempt,
                        max_attempts = MAX_ATTEMPTS,
                        code = %e.code,
                        delay_ms = delay.as_millis(),
                        "refresh attempt failed, retrying"
                    );
                    self.errorlog.log(
                        ErrorLogEntry::warn("refresh", e.code.as_str(), e.message.clone())
                            .with_attempt(attempt)
                            .with_retryable(true),
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel.cancelled() => {
                            warn!("refresh cancelled during backoff");
                            self.finish_failure(&e, attempt);
                            return Err(e);
                        }
                    }
                    attempt += 1;
                }
                Err(e) => {
                    self.report_terminal_failure(&e, attempt);
                    self.finish_failure(&e, attempt);
                    return Err(e);
                }
            }
        }
    }

    /// Take the guard or fail fast.
    fn begin(&self, is_manual: bool) -> Result<(), RefreshError> {
        self.in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| {
                RefreshError::new(
                    RefreshErrorCode::RefreshInProgress,
                    "a credential refresh is already in progress",
                )
            })?;

        let mut state = self.state.lock().expect("refresh state lock poisoned");
        state.status = RefreshStatus::InProgress;
        state.last_attempt = Some(Utc::now());
        state.is_manual_trigger = is_manual;
        Ok(())
    }

    fn finish_success(&self) {
        {
            let mut state = self.state.lock().expect("refresh state lock poisoned");
            state.status = RefreshStatus::Idle;
            state.last_success = Some(Utc::now());
            state.last_error = None;
            state.consecutive_failures = 0;
            state.is_manual_trigger = false;
        }
        self.in_progress.store(false, Ordering::SeqCst);
    }

    fn finish_failure(&self, err: &RefreshError, attempt: u32) {
        {
            let mut state = self.state.lock().expect("refresh state lock poisoned");
            state.status = RefreshStatus::Idle;
            state.last_error = Some(RefreshFailure {
                code: err.code,
                message: err.message.clone(),
                timestamp: Utc::now(),
                attempt,
                retryable: err.is_retryable(),
            });
            state.consecutive_failures += 1;
            state.is_manual_trigger = false;
        }
        self.in_progress.store(false, Ordering::SeqCst);
    }

    fn report_terminal_failure(&self, err: &RefreshError, attempt: u32) {
        error!(code = %err.code, attempt, "refresh failed: {}", err.message);
        self.errorlog.log(
            ErrorLogEntry::error("refresh", err.code.as_str(), err.message.clone())
                .with_attempt(attempt)
                .with_retryable(err.is_retryable())
                .with_context("workspace", self.workspace.clone().into()),
        );
        if err.code == RefreshErrorCode::SessionRevoked {
            error!(
                "Slack session revoked for workspace '{}'. To restore service:\n\
                 1. Sign in to {} in a browser\n\
                 2. Copy the fresh 'd' cookie (starts with xoxd-) from the browser's cookies\n\
                 3. Update SLACK_COOKIE_D (and SLACK_USER_TOKEN if rotated), or delete {}\n\
                 4. Restart the server",
                self.workspace,
                self.home_base,
                self.store.path().display()
            );
        }
    }

    /// Backoff with ±25% jitter, clamped to the ceiling.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let base = self.base_delay.as_secs_f64() * BACKOFF_MULTIPLIER.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());
        let jitter = rand::thread_rng().gen_range(-JITTER..=JITTER);
        Duration::from_secs_f64((capped * (1.0 + jitter)).max(0.0))
    }

    /// One full scrape → extract → validate → persist → rebind pass.
    async fn attempt_refresh(&self, is_manual: bool) -> Result<RefreshOutcome, RefreshError> {
        let current = self.store.load()?;

        let (body, final_url, set_cookie_values) = self.fetch_home_page(&current).await?;

        if looks_like_signin(&final_url, &body) {
            return Err(RefreshError::new(
                RefreshErrorCode::SessionRevoked,
                format!("workspace page for '{}' redirected to sign-in", self.workspace),
            ));
        }

        let cookie = extract_rotated_cookie(&set_cookie_values)
            .unwrap_or_else(|| current.credentials.cookie.clone());

        let token = extract_api_token(&body).ok_or_else(|| {
            RefreshError::new(
                RefreshErrorCode::InvalidResponse,
                "workspace page contained no api_token",
            )
        })?;

        self.validate_credentials(&token, &cookie).await?;

        let refreshed_at = Utc::now();
        let next = StoredCredentials {
            version: CREDENTIALS_VERSION,
            credentials: CredentialSet {
                token: token.clone(),
                cookie: cookie.clone(),
                workspace: current.credentials.workspace.clone(),
            },
            metadata: CredentialMetadata {
                last_refreshed: refreshed_at,
                refresh_count: current.metadata.refresh_count + 1,
                source: if is_manual {
                    RefreshSource::ManualRefresh
                } else {
                    RefreshSource::AutoRefresh
                },
            },
        };
        self.store.save(&next)?;

        self.holder
            .update_credentials(&token, &cookie)
            .map_err(|e| RefreshError::new(RefreshErrorCode::Unknown, e.to_string()))?;

        info!(
            token = %mask_secret(&token),
            cookie_rotated = cookie != current.credentials.cookie,
            "new session credentials bound"
        );

        Ok(RefreshOutcome {
            refreshed_at,
            total_refreshes: next.metadata.refresh_count,
        })
    }

    /// Fetch the workspace home page, classifying HTTP-level failures.
    async fn fetch_home_page(
        &self,
        current: &StoredCredentials,
    ) -> Result<(String, String, Vec<String>), RefreshError> {
        let response = self
            .scrape
            .get(&self.home_base)
            .header(COOKIE, format!("d={}", current.credentials.cookie))
            .send()
            .await
            .map_err(|e| RefreshError::new(RefreshErrorCode::NetworkError, e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(RefreshError::new(
                RefreshErrorCode::RateLimited,
                "workspace page returned HTTP 429",
            ));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(RefreshError::new(
                RefreshErrorCode::SessionRevoked,
                format!("workspace page returned HTTP {status}"),
            ));
        }
        if !status.is_success() {
            return Err(RefreshError::new(
                RefreshErrorCode::NetworkError,
                format!("workspace page returned HTTP {status}"),
            ));
        }

        let final_url = response.url().to_string();
        let set_cookie_values = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| RefreshError::new(RefreshErrorCode::NetworkError, e.to_string()))?;

        Ok((body, final_url, set_cookie_values))
    }

    /// Prove the extracted pair actually works before persisting it.
    async fn validate_credentials(&self, token: &str, cookie: &str) -> Result<(), RefreshError> {
        let client =
            SlackClient::with_api_base(SlackAuth::user(token, cookie), self.api_base.clone())
                .map_err(|e| RefreshError::new(RefreshErrorCode::InvalidResponse, e.to_string()))?;

        match client.auth_test().await {
            Ok(_) => Ok(()),
            Err(e) if e.code() == "invalid_auth" => Err(RefreshError::new(
                RefreshErrorCode::SessionRevoked,
                format!("auth.test rejected the refreshed credentials: {e}"),
            )),
            Err(e) => Err(RefreshError::new(
                RefreshErrorCode::InvalidResponse,
                format!("auth.test validation failed: {e}"),
            )),
        }
    }
}
