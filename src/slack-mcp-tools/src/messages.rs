//! Raw Slack message → formatted record.

use chrono::{DateTime, Local};
use serde_json::{Value, json};

use slack_mcp_api::UserCache;
use slack_mcp_api::format::{clean_slack_markup, compact_reactions, format_relative_time};

/// Format one raw message the way every message-bearing tool emits them.
///
/// `id` keeps the raw Slack `ts` so callers can feed it back into the
/// thread tools; `time` is the humanized form. Empty fields are left in
/// place here - the caller strips them and then restores `text`.
pub async fn format_message(raw: &Value, users: &UserCache, now: DateTime<Local>) -> Value {
    let ts = raw.get("ts").and_then(Value::as_str).unwrap_or_default();
    let text = raw.get("text").and_then(Value::as_str).unwrap_or_default();

    let user = match raw.get("user").and_then(Value::as_str) {
        Some(id) => users.resolve(id).await,
        None => raw
            .get("bot_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    };

    let mut formatted = json!({
        "id": ts,
        "time": format_relative_time(ts, now),
        "user": user,
        "text": clean_slack_markup(text, users).await,
    });

    if let Some(thread_ts) = raw.get("thread_ts").and_then(Value::as_str) {
        formatted["threadId"] = Value::from(thread_ts);
    }
    if let Some(reply_count) = raw.get("reply_count").and_then(Value::as_u64) {
        formatted["replyCount"] = Value::from(reply_count);
    }
    if let Some(reactions) = raw.get("reactions") {
        if let Some(compact) = compact_reactions(reactions) {
            formatted["reactions"] = Value::Object(compact);
        }
    }

    formatted
}
