//! Process-wide current Slack client.
//!
//! Tool handlers resolve the client per call through [`SlackClientHolder`];
//! a credential refresh rebinds the holder and the very next resolution
//! sees the new client. Holding an `Arc<SlackClient>` across a rebind is a
//! bug in the caller.

use std::sync::{Arc, RwLock};

use crate::client::{DEFAULT_API_BASE, SlackAuth, SlackClient};
use crate::error::SlackError;

struct HolderInner {
    auth: Option<SlackAuth>,
    client: Option<Arc<SlackClient>>,
}

/// Holds at most one active client bound to the current credentials.
pub struct SlackClientHolder {
    inner: RwLock<HolderInner>,
    api_base: String,
}

impl SlackClientHolder {
    /// Create an unbound holder.
    pub fn new() -> Self {
        Self::with_api_base(DEFAULT_API_BASE)
    }

    /// Create an unbound holder against a custom API base (tests).
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(HolderInner {
                auth: None,
                client: None,
            }),
            api_base: api_base.into(),
        }
    }

    /// Bind credentials without constructing a client yet.
    pub fn bind(&self, auth: SlackAuth) {
        let mut inner = self.inner.write().expect("holder lock poisoned");
        inner.auth = Some(auth);
        inner.client = None;
    }

    /// Get the current client, constructing it lazily from the bound
    /// credentials.
    pub fn get(&self) -> Result<Arc<SlackClient>, SlackError> {
        {
            let inner = self.inner.read().expect("holder lock poisoned");
            if let Some(client) = &inner.client {
                return Ok(client.clone());
            }
        }

        let mut inner = self.inner.write().expect("holder lock poisoned");
        // Another caller may have built it between the locks.
        if let Some(client) = &inner.client {
            return Ok(client.clone());
        }
        let auth = inner.auth.clone().ok_or(SlackError::NotConfigured)?;
        let client = Arc::new(SlackClient::with_api_base(auth, self.api_base.clone())?);
        inner.client = Some(client.clone());
        Ok(client)
    }

    /// Atomically replace the client and the cached user-mode credentials.
    ///
    /// Called by the refresh engine after a successful rotation; the new
    /// client is constructed before the swap so callers never observe an
    /// unbound holder.
    pub fn update_credentials(&self, token: &str, cookie: &str) -> Result<(), SlackError> {
        let auth = SlackAuth::user(token, cookie);
        let client = Arc::new(SlackClient::with_api_base(
            auth.clone(),
            self.api_base.clone(),
        )?);
        let mut inner = self.inner.write().expect("holder lock poisoned");
        inner.auth = Some(auth);
        inner.client = Some(client);
        Ok(())
    }

    /// Drop the client and bound credentials (tests).
    pub fn reset(&self) {
        let mut inner = self.inner.write().expect("holder lock poisoned");
        inner.auth = None;
        inner.client = None;
    }
}

impl Default for SlackClientHolder {
    fn default() -> Self {
        Self::new()
    }
}
