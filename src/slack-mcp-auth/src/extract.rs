//! Extraction from the workspace boot page.
//!
//! The refresh path depends on Slack serving a home page that embeds an
//! `api_token` literal - an undocumented contract. Everything that parses
//! that page lives here so a format change means rewriting one module.

use std::sync::OnceLock;

use regex::Regex;

/// Final-URL fragments that mean we were bounced to a login page.
const SIGNIN_URL_MARKERS: &[&str] = &["/signin", "/sign_in", "?redir="];

/// Body fragments that mean the page is a login page.
const SIGNIN_BODY_MARKERS: &[&str] = &[
    r#"action="/signin""#,
    r#"action="/sign_in""#,
    "You need to sign in",
    "Sign in to Slack",
];

fn quoted_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""api_token"\s*:\s*"(xoxc-[^"]+)""#).expect("static regex"))
}

fn bare_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"api_token\s*:\s*['"]?(xoxc-[^'",}\s]+)"#).expect("static regex"))
}

fn cookie_boundary_regex() -> &'static Regex {
    // A comma splits two cookies only when what follows looks like the
    // start of a new `name=` pair; expiry dates also contain commas.
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\s*[A-Za-z0-9_.\-]+=").expect("static regex"))
}

/// Pull the `xoxc-` api token out of the page body.
///
/// Tries the strict JSON form first, then the looser inline form.
pub fn extract_api_token(body: &str) -> Option<String> {
    if let Some(caps) = quoted_token_regex().captures(body) {
        return Some(caps[1].to_string());
    }
    bare_token_regex()
        .captures(body)
        .map(|caps| caps[1].to_string())
}

/// Find a rotated `d` cookie in `Set-Cookie` header values.
///
/// Accepts only values with the `xoxd-` prefix; Slack's sliding session
/// does not always rotate the cookie, and absence is not an error.
pub fn extract_rotated_cookie(set_cookie_values: &[String]) -> Option<String> {
    for value in set_cookie_values {
        for cookie in split_combined_cookies(value) {
            let Some((name, rest)) = cookie.split_once('=') else {
                continue;
            };
            if name.trim() != "d" {
                continue;
            }
            let cookie_value = rest.split(';').next().unwrap_or("").trim();
            if cookie_value.starts_with("xoxd-") {
                return Some(cookie_value.to_string());
            }
        }
    }
    None
}

/// Split a header value that may hold several comma-joined cookies.
fn split_combined_cookies(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for boundary in cookie_boundary_regex().find_iter(value) {
        parts.push(&value[start..boundary.start()]);
        start = boundary.start() + 1;
    }
    parts.push(&value[start..]);
    parts
}

/// Whether the fetch landed on a sign-in page instead of the workspace.
pub fn looks_like_signin(final_url: &str, body: &str) -> bool {
    if SIGNIN_URL_MARKERS.iter().any(|m| final_url.contains(m)) {
        return true;
    }
    SIGNIN_BODY_MARKERS.iter().any(|m| body.contains(m))
}
