//! Pure response formatting.
//!
//! Everything here is deterministic given its inputs; the only I/O is the
//! user-cache read inside mention resolution.

use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use regex::Regex;
use serde_json::{Map, Value};

use crate::cache::UserCache;

/// Render a Slack `"sec.usec"` timestamp relative to `now`.
///
/// Non-numeric inputs are returned unchanged.
pub fn format_relative_time(ts: &str, now: DateTime<Local>) -> String {
    let Ok(seconds) = ts.parse::<f64>() else {
        return ts.to_string();
    };
    let Some(then) = Local.timestamp_opt(seconds as i64, 0).single() else {
        return ts.to_string();
    };

    let elapsed = (now - then).num_seconds();
    if elapsed < 60 {
        return "just now".to_string();
    }
    if elapsed < 3600 {
        return format!("{} min ago", elapsed / 60);
    }

    let clock = clock_time(then);
    let days_apart = (now.date_naive() - then.date_naive()).num_days();
    match days_apart {
        0 => format!("today at {clock}"),
        1 => format!("yesterday at {clock}"),
        2..=6 => format!("{} at {clock}", then.format("%A")),
        _ if then.year() == now.year() => {
            format!("{} {} at {clock}", then.format("%b"), then.day())
        }
        _ => format!(
            "{} {}, {} at {clock}",
            then.format("%b"),
            then.day(),
            then.year()
        ),
    }
}

/// 12-hour clock with zero-padded minutes; midnight and noon render as 12.
fn clock_time(dt: DateTime<Local>) -> String {
    let hour24 = dt.hour();
    let hour12 = match hour24 % 12 {
        0 => 12,
        h => h,
    };
    let meridiem = if hour24 < 12 { "AM" } else { "PM" };
    format!("{hour12}:{:02} {meridiem}", dt.minute())
}

/// Compact `[{name, count, users}]` into `{name: count}`.
///
/// Entries with empty names are dropped; an empty result is `None` so the
/// field disappears from the response entirely.
pub fn compact_reactions(reactions: &Value) -> Option<Map<String, Value>> {
    let entries = reactions.as_array()?;
    let mut compact = Map::new();
    for entry in entries {
        let name = entry.get("name").and_then(Value::as_str).unwrap_or("");
        if name.is_empty() {
            continue;
        }
        let count = entry.get("count").and_then(Value::as_u64).unwrap_or(0);
        compact.insert(name.to_string(), Value::from(count));
    }
    if compact.is_empty() { None } else { Some(compact) }
}

fn angle_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<([^<>]+)>").expect("static regex"))
}

fn mention_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<@(U[A-Z0-9]+)>").expect("static regex"))
}

/// Clean Slack markup out of message text.
///
/// Runs in a fixed order: angle-bracket tokens first (mentions excluded),
/// then mention resolution through the user cache, then HTML entities last
/// so entities inside link labels survive the link rewrite.
pub async fn clean_slack_markup(text: &str, users: &UserCache) -> String {
    if text.is_empty() {
        return String::new();
    }

    let converted = convert_angle_tokens(text);
    let mentioned = resolve_mentions(&converted, users).await;
    decode_entities(&mentioned)
}

/// `<#C|name>` → `#name`, `<#C>` → `#C`, `<url|label>` → `[label](url)`,
/// `<url>` → `url`. `<@U…>` mention tokens pass through untouched.
fn convert_angle_tokens(text: &str) -> String {
    angle_token_regex()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let inner = &caps[1];
            if mention_regex().is_match(&caps[0]) {
                return caps[0].to_string();
            }
            if let Some(channel) = inner.strip_prefix('#') {
                return match channel.split_once('|') {
                    Some((_, name)) => format!("#{name}"),
                    None => format!("#{channel}"),
                };
            }
            match inner.split_once('|') {
                Some((url, label)) => format!("[{label}]({url})"),
                None => inner.to_string(),
            }
        })
        .into_owned()
}

/// Replace `<@Uxxx>` with `@display`; unknown ids keep the raw id.
async fn resolve_mentions(text: &str, users: &UserCache) -> String {
    let ids: Vec<String> = mention_regex()
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect();
    if ids.is_empty() {
        return text.to_string();
    }

    let mut result = text.to_string();
    for id in ids {
        let display = users.display_name(&id).await;
        result = result.replace(&format!("<@{id}>"), &format!("@{display}"));
    }
    result
}

/// Decode the entities Slack escapes. `&amp;` goes last so already-decoded
/// text is never decoded twice.
fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Recursively remove empty-equivalent fields.
///
/// `null`, empty strings, empty arrays, and objects left empty after
/// stripping all disappear; `false` and `0` survive. Returns `None` when
/// the whole value strips away.
pub fn strip_empty(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::Array(items) => {
            let stripped: Vec<Value> = items.iter().filter_map(strip_empty).collect();
            if stripped.is_empty() {
                None
            } else {
                Some(Value::Array(stripped))
            }
        }
        Value::Object(fields) => {
            let mut stripped = Map::new();
            for (key, field) in fields {
                if let Some(kept) = strip_empty(field) {
                    stripped.insert(key.clone(), kept);
                }
            }
            if stripped.is_empty() {
                None
            } else {
                Some(Value::Object(stripped))
            }
        }
        other => Some(other.clone()),
    }
}

/// Strip a response object, keeping an empty object instead of vanishing
/// entirely.
pub fn strip_empty_object(value: &Value) -> Value {
    strip_empty(value).unwrap_or_else(|| Value::Object(Map::new()))
}

/// Reinstate `text: ""` on every record of a messages array.
///
/// Stripping removes empty strings, but a message record must always carry
/// `text` - file shares and bot messages may legitimately have none.
pub fn restore_message_text(messages: &mut Value) {
    if let Some(items) = messages.as_array_mut() {
        for item in items {
            if let Some(fields) = item.as_object_mut() {
                fields
                    .entry("text")
                    .or_insert_with(|| Value::String(String::new()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, s).single().unwrap()
    }

    fn ts_of(dt: DateTime<Local>) -> String {
        format!("{}.000100", dt.timestamp())
    }

    #[test]
    fn test_relative_time_buckets() {
        let now = at(2025, 6, 15, 14, 30, 0); // Sunday

        assert_eq!(format_relative_time(&ts_of(at(2025, 6, 15, 14, 29, 30)), now), "just now");
        assert_eq!(format_relative_time(&ts_of(at(2025, 6, 15, 14, 0, 0)), now), "30 min ago");
        assert_eq!(
            format_relative_time(&ts_of(at(2025, 6, 15, 9, 5, 0)), now),
            "today at 9:05 AM"
        );
        assert_eq!(
            format_relative_time(&ts_of(at(2025, 6, 14, 23, 59, 0)), now),
            "yesterday at 11:59 PM"
        );
        // Tuesday, five days back: weekday form.
        assert_eq!(
            format_relative_time(&ts_of(at(2025, 6, 10, 8, 15, 0)), now),
            "Tuesday at 8:15 AM"
        );
        // Beyond the six-day window but same year: month + day.
        assert_eq!(
            format_relative_time(&ts_of(at(2025, 3, 2, 12, 0, 0)), now),
            "Mar 2 at 12:00 PM"
        );
        // Previous year: full date.
        assert_eq!(
            format_relative_time(&ts_of(at(2024, 12, 31, 0, 0, 0)), now),
            "Dec 31, 2024 at 12:00 AM"
        );
    }

    #[test]
    fn test_relative_time_non_numeric_passthrough() {
        let now = at(2025, 6, 15, 14, 30, 0);
        assert_eq!(format_relative_time("not-a-ts", now), "not-a-ts");
        assert_eq!(format_relative_time("", now), "");
    }

    #[test]
    fn test_relative_time_deterministic() {
        let now = at(2025, 6, 15, 14, 30, 0);
        let ts = ts_of(at(2025, 6, 14, 10, 0, 0));
        assert_eq!(
            format_relative_time(&ts, now),
            format_relative_time(&ts, now)
        );
    }

    #[test]
    fn test_compact_reactions() {
        let reactions = json!([
            {"name": "thumbsup", "count": 3, "users": ["U1", "U2", "U3"]},
            {"name": "", "count": 9},
            {"name": "eyes", "count": 1}
        ]);
        let compact = compact_reactions(&reactions).unwrap();
        assert_eq!(compact.len(), 2);
        assert_eq!(compact["thumbsup"], 3);
        assert_eq!(compact["eyes"], 1);
    }

    #[test]
    fn test_compact_reactions_empty_is_none() {
        assert!(compact_reactions(&json!([])).is_none());
        assert!(compact_reactions(&json!([{"name": "", "count": 2}])).is_none());
        assert!(compact_reactions(&json!("nope")).is_none());
    }

    #[test]
    fn test_convert_angle_tokens() {
        assert_eq!(convert_angle_tokens("<#C123|general>"), "#general");
        assert_eq!(convert_angle_tokens("<#C123>"), "#C123");
        assert_eq!(
            convert_angle_tokens("<https://example.com|Example>"),
            "[Example](https://example.com)"
        );
        assert_eq!(convert_angle_tokens("<https://example.com>"), "https://example.com");
        // Mentions are left for the resolution step.
        assert_eq!(convert_angle_tokens("hi <@U123>"), "hi <@U123>");
    }

    #[test]
    fn test_entities_decode_after_links() {
        // The full ordering guarantee is exercised through
        // clean_slack_markup in the tools tests; here the pure pieces.
        let converted = convert_angle_tokens("<https://a|A &amp; B>");
        assert_eq!(converted, "[A &amp; B](https://a)");
        assert_eq!(decode_entities(&converted), "[A & B](https://a)");
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
    }

    #[tokio::test]
    async fn test_clean_slack_markup_full_order() {
        use crate::client::SlackAuth;
        use crate::holder::SlackClientHolder;
        use slack_mcp_common::ErrorLog;
        use std::sync::Arc;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users.list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "members": [{"id": "U123", "profile": {"display_name": "ada"}}],
                "response_metadata": {"next_cursor": ""}
            })))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let holder = Arc::new(SlackClientHolder::with_api_base(server.uri()));
        holder.bind(SlackAuth::bot("xoxb-test"));
        let users = UserCache::new(holder, ErrorLog::new(dir.path().join("error.log")));

        let cleaned = clean_slack_markup(
            "<@U123> shared <https://a|A &amp; B> in <#C9|general>, see <@U999>",
            &users,
        )
        .await;
        assert_eq!(cleaned, "@ada shared [A & B](https://a) in #general, see @U999");

        assert_eq!(clean_slack_markup("", &users).await, "");
    }

    #[test]
    fn test_strip_empty_removes_empties_preserves_falsy() {
        let value = json!({
            "text": "",
            "reactions": [],
            "count": 0,
            "pinned": false,
            "user": null,
            "nested": {"empty": "", "also": null},
            "kept": {"inner": "x"}
        });
        let stripped = strip_empty(&value).unwrap();
        assert_eq!(stripped, json!({"count": 0, "pinned": false, "kept": {"inner": "x"}}));
    }

    #[test]
    fn test_strip_empty_is_idempotent() {
        let values = [
            json!({"a": "", "b": [null, "", {"c": []}], "d": 1}),
            json!([]),
            json!(null),
            json!({"x": {"y": {}}}),
            json!(false),
        ];
        for value in values {
            let once = strip_empty(&value);
            let twice = once.as_ref().and_then(strip_empty);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_strip_empty_object_keeps_top_level() {
        assert_eq!(strip_empty_object(&json!({"a": null})), json!({}));
    }

    #[test]
    fn test_restore_message_text() {
        let mut messages = json!([
            {"id": "1.0"},
            {"id": "2.0", "text": "kept"}
        ]);
        restore_message_text(&mut messages);
        assert_eq!(messages[0]["text"], "");
        assert_eq!(messages[1]["text"], "kept");
    }
}
