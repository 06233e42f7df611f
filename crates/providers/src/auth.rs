//! Bearer token cache for cloud speech auth (§4.2): "use a static key if
//! present; otherwise obtain a short-lived bearer token from ambient cloud
//! credentials and refresh before expiry."
//!
//! This only caches and expiry-checks a token handed to it by the caller —
//! actually minting one from ambient credentials (IMDS, workload identity,
//! etc.) is environment-specific and happens at the call site.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Proactive refresh window: refresh when less than 5 minutes remain.
const REFRESH_WINDOW_SECS: i64 = 300;

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Caches a bearer token and reports when it needs refreshing, ahead of
/// actual expiry rather than on expiry.
#[derive(Default)]
pub struct BearerTokenCache {
    inner: RwLock<Option<CachedToken>>,
}

impl BearerTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached token, if present and not within the refresh window of
    /// expiring.
    pub fn get(&self, now: DateTime<Utc>) -> Option<String> {
        let guard = self.inner.read();
        let cached = guard.as_ref()?;
        if cached.expires_at - now <= chrono::Duration::seconds(REFRESH_WINDOW_SECS) {
            return None;
        }
        Some(cached.token.clone())
    }

    pub fn set(&self, token: String, expires_at: DateTime<Utc>) {
        *self.inner.write() = Some(CachedToken { token, expires_at });
    }

    pub fn clear(&self) {
        *self.inner.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_returned() {
        let cache = BearerTokenCache::new();
        let now = Utc::now();
        cache.set("tok-1".into(), now + chrono::Duration::hours(1));
        assert_eq!(cache.get(now), Some("tok-1".into()));
    }

    #[test]
    fn token_within_refresh_window_is_treated_as_absent() {
        let cache = BearerTokenCache::new();
        let now = Utc::now();
        cache.set("tok-2".into(), now + chrono::Duration::seconds(60));
        assert_eq!(cache.get(now), None);
    }

    #[test]
    fn empty_cache_returns_none() {
        let cache = BearerTokenCache::new();
        assert_eq!(cache.get(Utc::now()), None);
    }
}
