//! Centralized HTTP client factory.
//!
//! Two client profiles exist:
//! - `create_api_client()` - Slack Web API calls (JSON, 30s timeout)
//! - `create_scrape_client()` - the credential-refresh page fetch, which
//!   must present browser-like headers and follow redirects so Slack serves
//!   the workspace boot page instead of an API error

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};

/// User-Agent for Slack Web API requests.
pub const API_USER_AGENT: &str = concat!("slack-mcp-server/", env!("CARGO_PKG_VERSION"));

/// Browser-like User-Agent for the refresh page fetch.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Accept header the refresh fetch sends so Slack returns HTML.
pub const BROWSER_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,\
     image/avif,image/webp,image/apng,*/*;q=0.8";

/// Accept-Language header for the refresh fetch.
pub const BROWSER_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Default timeout for API requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection pool idle timeout, kept short so DNS changes are picked up.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Create the Slack Web API client.
pub fn create_api_client() -> Result<Client, String> {
    Client::builder()
        .user_agent(API_USER_AGENT)
        .timeout(DEFAULT_TIMEOUT)
        .tcp_nodelay(true)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .pool_max_idle_per_host(4)
        .build()
        .map_err(|e| format!("Failed to build HTTP client: {e}"))
}

/// Create the refresh-scrape client.
///
/// Redirects are followed (the workspace home page bounces through several
/// hops before settling); cookies are attached per request by the caller.
pub fn create_scrape_client() -> Result<Client, String> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE),
    );

    Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .default_headers(headers)
        .timeout(DEFAULT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| format!("Failed to build scrape client: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_api_client_succeeds() {
        assert!(create_api_client().is_ok());
    }

    #[test]
    fn test_create_scrape_client_succeeds() {
        assert!(create_scrape_client().is_ok());
    }

    #[test]
    fn test_user_agent_names_product() {
        assert!(API_USER_AGENT.starts_with("slack-mcp-server/"));
        assert!(BROWSER_USER_AGENT.contains("Chrome/"));
    }
}
