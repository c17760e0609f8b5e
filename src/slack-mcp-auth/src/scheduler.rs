//! Periodic refresh scheduling.
//!
//! A single spawned task ticks at a fixed check interval and hands off to
//! the refresh manager when a refresh is actually due. Manual triggers
//! bypass the due-check entirely. The scheduler never runs for bot auth or
//! when the operator disabled refresh - `start` is a no-op then.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RefreshError;
use crate::refresh::{RefreshManager, RefreshOutcome};

/// Default milliseconds between due-checks: one hour.
pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 3_600_000;

/// The scheduler's picture of when it runs.
#[derive(Debug, Clone)]
pub struct RefreshSchedule {
    /// Days between automatic refreshes.
    pub interval_days: u32,
    /// Milliseconds between due-checks.
    pub check_interval_ms: u64,
    /// When the next due-check happens.
    pub next_check_at: Option<DateTime<Utc>>,
    /// Whether automatic refresh runs at all.
    pub enabled: bool,
}

impl RefreshSchedule {
    /// A schedule with the default check cadence.
    pub fn new(interval_days: u32, enabled: bool) -> Self {
        Self {
            interval_days,
            check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
            next_check_at: None,
            enabled,
        }
    }

    /// Override the check cadence (tests).
    pub fn with_check_interval_ms(mut self, check_interval_ms: u64) -> Self {
        self.check_interval_ms = check_interval_ms;
        self
    }
}

/// Owns the periodic tick. One per process.
pub struct RefreshScheduler {
    manager: Arc<RefreshManager>,
    schedule: Mutex<RefreshSchedule>,
    handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl RefreshScheduler {
    /// Create a scheduler over a refresh manager.
    pub fn new(manager: Arc<RefreshManager>, schedule: RefreshSchedule) -> Self {
        Self {
            manager,
            schedule: Mutex::new(schedule),
            handle: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    /// A snapshot of the schedule.
    pub fn schedule(&self) -> RefreshSchedule {
        self.schedule.lock().expect("schedule lock poisoned").clone()
    }

    /// Start the periodic tick. No-ops when disabled or already running.
    pub fn start(self: &Arc<Self>) {
        {
            let schedule = self.schedule.lock().expect("schedule lock poisoned");
            if !schedule.enabled {
                info!("refresh scheduler disabled, not starting");
                return;
            }
        }

        let mut handle = self.handle.lock().expect("scheduler handle lock poisoned");
        if handle.is_some() {
            debug!("refresh scheduler already running");
            return;
        }

        let this = self.clone();
        *handle = Some(tokio::spawn(async move { this.run().await }));
        info!("refresh scheduler started");
    }

    async fn run(self: Arc<Self>) {
        let period = {
            let schedule = self.schedule.lock().expect("schedule lock poisoned");
            Duration::from_millis(schedule.check_interval_ms)
        };
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Consume the immediate first tick; the first real check happens
        // one full period from now.
        ticker.tick().await;
        self.advance_next_check(period);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("refresh scheduler tick loop cancelled");
                    return;
                }
                _ = ticker.tick() => {
                    self.advance_next_check(period);
                    self.on_tick().await;
                }
            }
        }
    }

    fn advance_next_check(&self, period: Duration) {
        let mut schedule = self.schedule.lock().expect("schedule lock poisoned");
        schedule.next_check_at =
            Some(Utc::now() + chrono::Duration::milliseconds(period.as_millis() as i64));
    }

    async fn on_tick(&self) {
        if self.manager.is_in_progress() {
            debug!("refresh already in progress, skipping tick");
            return;
        }
        if !self.manager.is_refresh_due() {
            debug!("refresh not due, skipping tick");
            return;
        }

        info!("scheduled refresh is due");
        if let Err(e) = self.manager.refresh_with_retry(false).await {
            // Already recorded by the manager; the scheduler just keeps
            // ticking with the previous credentials.
            warn!(code = %e.code, "scheduled refresh failed");
        }
    }

    /// Run a refresh now, regardless of the due-check and tick schedule.
    pub async fn trigger_manual(&self) -> Result<RefreshOutcome, RefreshError> {
        info!("manual refresh triggered");
        self.manager.refresh_with_retry(true).await
    }

    /// Cancel the tick loop.
    pub fn stop(&self) {
        self.cancel.cancel();
        if let Some(handle) = self
            .handle
            .lock()
            .expect("scheduler handle lock poisoned")
            .take()
        {
            handle.abort();
        }
        info!("refresh scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RefreshConfig;
    use crate::store::{
        CREDENTIALS_VERSION, CredentialMetadata, CredentialSet, CredentialStore, RefreshSource,
        StoredCredentials,
    };
    use serde_json::json;
    use slack_mcp_api::{SlackAuth, SlackClientHolder};
    use slack_mcp_common::ErrorLog;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE_WITH_TOKEN: &str = r#"{"api_token":"xoxc-ticked-token"}"#;

    async fn harness(
        last_refreshed: DateTime<Utc>,
    ) -> (TempDir, CredentialStore, Arc<RefreshManager>, MockServer, MockServer) {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        store
            .save(&StoredCredentials {
                version: CREDENTIALS_VERSION,
                credentials: CredentialSet {
                    token: "xoxc-old".to_string(),
                    cookie: "xoxd-old".to_string(),
                    workspace: "acme".to_string(),
                },
                metadata: CredentialMetadata {
                    last_refreshed,
                    refresh_count: 0,
                    source: RefreshSource::Initial,
                },
            })
            .unwrap();

        let home = MockServer::start().await;
        let api = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE_WITH_TOKEN))
            .mount(&home)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth.test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&api)
            .await;

        let holder = Arc::new(SlackClientHolder::with_api_base(api.uri()));
        holder.bind(SlackAuth::user("xoxc-old", "xoxd-old"));

        let config = RefreshConfig {
            credentials_path: store.path().to_path_buf(),
            interval_days: 7,
            workspace: Some("acme".to_string()),
            enabled: true,
        };
        let manager = Arc::new(
            RefreshManager::new(
                store.clone(),
                holder,
                &config,
                ErrorLog::new(dir.path().join("error.log")),
                CancellationToken::new(),
            )
            .unwrap()
            .with_bases(home.uri(), api.uri())
            .with_retry_delays(Duration::from_millis(5), Duration::from_millis(20)),
        );
        (dir, store, manager, home, api)
    }

    #[tokio::test]
    async fn test_disabled_scheduler_does_not_start() {
        let (_dir, _store, manager, _home, _api) = harness(Utc::now()).await;
        let scheduler = Arc::new(RefreshScheduler::new(
            manager,
            RefreshSchedule::new(7, false),
        ));
        scheduler.start();
        assert!(scheduler.handle.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let (_dir, _store, manager, _home, _api) = harness(Utc::now()).await;
        let scheduler = Arc::new(RefreshScheduler::new(
            manager,
            RefreshSchedule::new(7, true).with_check_interval_ms(3_600_000),
        ));
        scheduler.start();
        scheduler.start();
        assert!(scheduler.handle.lock().unwrap().is_some());
        scheduler.stop();
    }

    #[tokio::test]
    async fn test_tick_refreshes_when_due() {
        let (_dir, store, manager, _home, _api) =
            harness(Utc::now() - chrono::Duration::days(8)).await;
        let scheduler = Arc::new(RefreshScheduler::new(
            manager,
            RefreshSchedule::new(7, true).with_check_interval_ms(50),
        ));
        scheduler.start();

        // Wait for at least one tick past the consumed immediate one.
        tokio::time::sleep(Duration::from_millis(400)).await;
        scheduler.stop();

        let stored = store.load().unwrap();
        assert_eq!(stored.credentials.token, "xoxc-ticked-token");
        assert_eq!(stored.metadata.source, RefreshSource::AutoRefresh);
        assert!(stored.metadata.refresh_count >= 1);
    }

    #[tokio::test]
    async fn test_tick_skips_when_not_due() {
        let (_dir, store, manager, _home, _api) = harness(Utc::now()).await;
        let scheduler = Arc::new(RefreshScheduler::new(
            manager,
            RefreshSchedule::new(7, true).with_check_interval_ms(50),
        ));
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(300)).await;
        scheduler.stop();

        let stored = store.load().unwrap();
        assert_eq!(stored.credentials.token, "xoxc-old");
        assert_eq!(stored.metadata.refresh_count, 0);
    }

    #[tokio::test]
    async fn test_manual_trigger_ignores_due_check() {
        let (_dir, store, manager, _home, _api) = harness(Utc::now()).await;
        let scheduler = Arc::new(RefreshScheduler::new(
            manager,
            RefreshSchedule::new(7, true),
        ));

        // Not due, but manual triggers anyway.
        let outcome = scheduler.trigger_manual().await.unwrap();
        assert_eq!(outcome.total_refreshes, 1);
        assert_eq!(
            store.load().unwrap().metadata.source,
            RefreshSource::ManualRefresh
        );
    }

    #[tokio::test]
    async fn test_next_check_advances() {
        let (_dir, _store, manager, _home, _api) = harness(Utc::now()).await;
        let scheduler = Arc::new(RefreshScheduler::new(
            manager,
            RefreshSchedule::new(7, true).with_check_interval_ms(50),
        ));
        assert!(scheduler.schedule().next_check_at.is_none());
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(scheduler.schedule().next_check_at.is_some());
        scheduler.stop();
    }
}
