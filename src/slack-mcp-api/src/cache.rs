//! Channel and user name caches.
//!
//! Both caches populate lazily from a single paginated Slack call and are
//! then immutable for the life of the process. Concurrent first callers
//! share one populate: the populate runs under the cache's async mutex, so
//! exactly one Slack call is issued no matter how many resolves race. A
//! failed populate seats an empty cache and resolves fall back to raw
//! inputs from then on.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use slack_mcp_common::{ErrorLog, ErrorLogEntry};

use crate::holder::SlackClientHolder;

/// Page size for populate pagination.
const POPULATE_PAGE_SIZE: u32 = 1000;

fn channel_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[CDG][A-Z0-9]+$").expect("static regex"))
}

/// A cached channel record, indexed under both its id and its lowercased
/// name.
#[derive(Debug, Clone)]
pub struct CachedChannel {
    /// Channel id (C…).
    pub id: String,
    /// Channel name without the leading `#`.
    pub name: String,
}

/// Name → id cache over public channels.
pub struct ChannelCache {
    holder: Arc<SlackClientHolder>,
    errorlog: ErrorLog,
    map: Mutex<Option<Arc<HashMap<String, CachedChannel>>>>,
}

impl ChannelCache {
    /// Create an unpopulated cache.
    pub fn new(holder: Arc<SlackClientHolder>, errorlog: ErrorLog) -> Self {
        Self {
            holder,
            errorlog,
            map: Mutex::new(None),
        }
    }

    /// Resolve a channel reference to an id.
    ///
    /// Inputs that already look like an id (`C…`/`D…`/`G…`) pass through
    /// without touching the cache. Anything else is treated as a name:
    /// leading `#` stripped, lowercased, looked up. Unknown names return
    /// the raw input so private channels and DMs the cache cannot see
    /// still reach Slack verbatim.
    pub async fn resolve_channel_id(&self, input: &str) -> String {
        if channel_id_regex().is_match(input) {
            return input.to_string();
        }
        let normalized = input.trim_start_matches('#').to_lowercase();
        let map = self.ensure_populated().await;
        match map.get(&normalized) {
            Some(channel) => channel.id.clone(),
            None => input.to_string(),
        }
    }

    async fn ensure_populated(&self) -> Arc<HashMap<String, CachedChannel>> {
        let mut guard = self.map.lock().await;
        if let Some(map) = &*guard {
            return map.clone();
        }
        // First caller populates while holding the lock; racers queue
        // behind it and find the map seated.
        let map = Arc::new(match self.populate().await {
            Ok(map) => {
                debug!(channels = map.len() / 2, "channel cache populated");
                map
            }
            Err(e) => {
                warn!(error = %e, "channel cache populate failed, seating empty cache");
                self.errorlog.log(
                    ErrorLogEntry::warn("channel-cache", e.code(), e.to_string())
                        .with_retryable(e.retryable()),
                );
                HashMap::new()
            }
        });
        *guard = Some(map.clone());
        map
    }

    async fn populate(&self) -> Result<HashMap<String, CachedChannel>, crate::SlackError> {
        let client = self.holder.get()?;
        let mut map = HashMap::new();
        let mut cursor: Option<String> = None;

        loop {
            let body = client
                .conversations_list(POPULATE_PAGE_SIZE, cursor.as_deref(), false)
                .await?;
            if let Some(channels) = body.get("channels").and_then(Value::as_array) {
                for channel in channels {
                    let (Some(id), Some(name)) = (
                        channel.get("id").and_then(Value::as_str),
                        channel.get("name").and_then(Value::as_str),
                    ) else {
                        continue;
                    };
                    let record = CachedChannel {
                        id: id.to_string(),
                        name: name.to_string(),
                    };
                    map.insert(id.to_string(), record.clone());
                    map.insert(name.to_lowercase(), record);
                }
            }

            cursor = body
                .get("response_metadata")
                .and_then(|m| m.get("next_cursor"))
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(str::to_string);
            if cursor.is_none() {
                break;
            }
        }
        Ok(map)
    }

    /// Drop the cached map (tests).
    pub async fn reset(&self) {
        *self.map.lock().await = None;
    }
}

/// Id → display-name cache over workspace users.
pub struct UserCache {
    holder: Arc<SlackClientHolder>,
    errorlog: ErrorLog,
    map: Mutex<Option<Arc<HashMap<String, String>>>>,
}

impl UserCache {
    /// Create an unpopulated cache.
    pub fn new(holder: Arc<SlackClientHolder>, errorlog: ErrorLog) -> Self {
        Self {
            holder,
            errorlog,
            map: Mutex::new(None),
        }
    }

    /// Resolve to `"display (Uxxxx)"`, or the raw id when unknown.
    pub async fn resolve(&self, id: &str) -> String {
        let map = self.ensure_populated().await;
        match map.get(id) {
            Some(display) => format!("{display} ({id})"),
            None => id.to_string(),
        }
    }

    /// The display name alone, or the raw id when unknown.
    pub async fn display_name(&self, id: &str) -> String {
        let map = self.ensure_populated().await;
        map.get(id).cloned().unwrap_or_else(|| id.to_string())
    }

    /// Resolve a set of ids at once, deduplicated.
    pub async fn resolve_many<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a str>,
    ) -> HashMap<String, String> {
        let map = self.ensure_populated().await;
        let mut resolved = HashMap::new();
        for id in ids {
            if resolved.contains_key(id) {
                continue;
            }
            let display = match map.get(id) {
                Some(display) => format!("{display} ({id})"),
                None => id.to_string(),
            };
            resolved.insert(id.to_string(), display);
        }
        resolved
    }

    async fn ensure_populated(&self) -> Arc<HashMap<String, String>> {
        let mut guard = self.map.lock().await;
        if let Some(map) = &*guard {
            return map.clone();
        }
        let map = Arc::new(match self.populate().await {
            Ok(map) => {
                debug!(users = map.len(), "user cache populated");
                map
            }
            Err(e) => {
                warn!(error = %e, "user cache populate failed, seating empty cache");
                self.errorlog.log(
                    ErrorLogEntry::warn("user-cache", e.code(), e.to_string())
                        .with_retryable(e.retryable()),
                );
                HashMap::new()
            }
        });
        *guard = Some(map.clone());
        map
    }

    async fn populate(&self) -> Result<HashMap<String, String>, crate::SlackError> {
        let client = self.holder.get()?;
        let mut map = HashMap::new();
        let mut cursor: Option<String> = None;

        loop {
            let body = client
                .users_list(POPULATE_PAGE_SIZE, cursor.as_deref())
                .await?;
            if let Some(members) = body.get("members").and_then(Value::as_array) {
                for member in members {
                    let Some(id) = member.get("id").and_then(Value::as_str) else {
                        continue;
                    };
                    map.insert(id.to_string(), derive_display_name(member, id));
                }
            }

            cursor = body
                .get("response_metadata")
                .and_then(|m| m.get("next_cursor"))
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(str::to_string);
            if cursor.is_none() {
                break;
            }
        }
        Ok(map)
    }

    /// Drop the cached map (tests).
    pub async fn reset(&self) {
        *self.map.lock().await = None;
    }
}

/// Display-name priority: `profile.display_name` (trimmed, non-empty) →
/// `real_name` → `name` → id.
fn derive_display_name(member: &Value, id: &str) -> String {
    member
        .get("profile")
        .and_then(|p| p.get("display_name"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| {
            member
                .get("real_name")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        })
        .or_else(|| {
            member
                .get("name")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        })
        .unwrap_or(id)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

    use crate::client::SlackAuth;

    fn test_deps(api_base: String) -> (TempDir, Arc<SlackClientHolder>, ErrorLog) {
        let dir = TempDir::new().unwrap();
        let errorlog = ErrorLog::new(dir.path().join("error.log"));
        let holder = Arc::new(SlackClientHolder::with_api_base(api_base));
        holder.bind(SlackAuth::bot("xoxb-test"));
        (dir, holder, errorlog)
    }

    #[test]
    fn test_display_name_priority() {
        let member = json!({
            "profile": {"display_name": "  "},
            "real_name": "Grace Hopper",
            "name": "ghopper"
        });
        assert_eq!(derive_display_name(&member, "U1"), "Grace Hopper");

        let member = json!({"profile": {"display_name": "grace"}, "name": "ghopper"});
        assert_eq!(derive_display_name(&member, "U1"), "grace");

        let member = json!({"name": "ghopper"});
        assert_eq!(derive_display_name(&member, "U1"), "ghopper");

        let member = json!({});
        assert_eq!(derive_display_name(&member, "U1"), "U1");
    }

    #[tokio::test]
    async fn test_id_shaped_input_bypasses_cache() {
        // No mock mounted: any HTTP call would fail the test via the
        // seated-empty-cache fallback changing the result.
        let (_dir, holder, errorlog) = test_deps("http://127.0.0.1:9".to_string());
        let cache = ChannelCache::new(holder, errorlog);

        assert_eq!(cache.resolve_channel_id("C0123ABC").await, "C0123ABC");
        assert_eq!(cache.resolve_channel_id("D9ZZZ").await, "D9ZZZ");
        assert_eq!(cache.resolve_channel_id("G77A1").await, "G77A1");
    }

    #[tokio::test]
    async fn test_name_resolution_and_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "channels": [{"id": "C111", "name": "general"}],
                "response_metadata": {"next_cursor": ""}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (_dir, holder, errorlog) = test_deps(server.uri());
        let cache = ChannelCache::new(holder, errorlog);

        assert_eq!(cache.resolve_channel_id("#General").await, "C111");
        assert_eq!(cache.resolve_channel_id("general").await, "C111");
        // Unknown names pass through verbatim, with one total populate.
        assert_eq!(cache.resolve_channel_id("private-room").await, "private-room");
    }

    #[tokio::test]
    async fn test_concurrent_resolves_populate_once() {
        struct CountedResponse(Arc<AtomicUsize>);
        impl Respond for CountedResponse {
            fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
                self.0.fetch_add(1, Ordering::SeqCst);
                ResponseTemplate::new(200).set_body_json(json!({
                    "ok": true,
                    "channels": [{"id": "C111", "name": "general"}],
                    "response_metadata": {"next_cursor": ""}
                }))
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversations.list"))
            .respond_with(CountedResponse(calls.clone()))
            .mount(&server)
            .await;

        let (_dir, holder, errorlog) = test_deps(server.uri());
        let cache = Arc::new(ChannelCache::new(holder, errorlog));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(
                async move { cache.resolve_channel_id("general").await },
            ));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), "C111");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_populate_failure_seats_empty_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users.list"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": false, "error": "invalid_auth"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (_dir, holder, errorlog) = test_deps(server.uri());
        let cache = UserCache::new(holder, errorlog.clone());

        // Fallback to raw ids, and no re-populate on later calls.
        assert_eq!(cache.resolve("U123").await, "U123");
        assert_eq!(cache.display_name("U123").await, "U123");

        let entries = errorlog.read(10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].component, "user-cache");
    }

    #[tokio::test]
    async fn test_user_cache_pagination_and_resolve_many() {
        let server = MockServer::start().await;
        let first_page = json!({
            "ok": true,
            "members": [{"id": "U1", "profile": {"display_name": "ada"}}],
            "response_metadata": {"next_cursor": "page2"}
        });
        let second_page = json!({
            "ok": true,
            "members": [{"id": "U2", "real_name": "Grace"}],
            "response_metadata": {"next_cursor": ""}
        });

        struct Paged {
            pages: Vec<Value>,
            call: AtomicUsize,
        }
        impl Respond for Paged {
            fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
                let i = self.call.fetch_add(1, Ordering::SeqCst).min(self.pages.len() - 1);
                ResponseTemplate::new(200).set_body_json(self.pages[i].clone())
            }
        }

        Mock::given(method("GET"))
            .and(path("/users.list"))
            .respond_with(Paged {
                pages: vec![first_page, second_page],
                call: AtomicUsize::new(0),
            })
            .expect(2)
            .mount(&server)
            .await;

        let (_dir, holder, errorlog) = test_deps(server.uri());
        let cache = UserCache::new(holder, errorlog);

        let resolved = cache.resolve_many(["U1", "U2", "U1", "U404"]).await;
        assert_eq!(resolved["U1"], "ada (U1)");
        assert_eq!(resolved["U2"], "Grace (U2)");
        assert_eq!(resolved["U404"], "U404");
    }
}
