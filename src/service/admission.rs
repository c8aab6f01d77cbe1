//! Admission control for audience requests
//!
//! Keeps abusive requesters out of the public intake with two
//! independent in-memory windows per requester fingerprint.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::config::RateLimitConfig;
use crate::error::AppError;

/// Requester identity as seen by the public intake
///
/// Combines the client IP (first `X-Forwarded-For` value, else the
/// peer address) with the `audience_session` cookie value.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub client_ip: Option<String>,
    pub session_key: String,
}

impl Fingerprint {
    /// Window key scoped to one setlist
    fn window_key(&self, setlist_id: &str) -> String {
        format!(
            "{}:{}:{}",
            setlist_id,
            self.client_ip.as_deref().unwrap_or(""),
            self.session_key
        )
    }
}

/// Window entry
#[derive(Debug, Clone)]
struct WindowEntry {
    /// Number of requests in current window
    count: u32,
    /// Window start time
    window_start: Instant,
}

impl WindowEntry {
    /// Check if this entry's window has ended
    fn is_expired(&self, window: Duration) -> bool {
        self.window_start.elapsed() >= window
    }
}

/// One bounded in-memory window store
struct WindowStore {
    entries: RwLock<HashMap<String, WindowEntry>>,
    window: Duration,
    /// Maximum number of tracked keys in memory
    max_tracked_keys: usize,
}

impl WindowStore {
    fn new(window: Duration, max_tracked_keys: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            window,
            max_tracked_keys: max_tracked_keys.max(1),
        }
    }

    fn prune_expired_locked(
        entries: &mut HashMap<String, WindowEntry>,
        window: Duration,
    ) -> usize {
        let before = entries.len();
        entries.retain(|_, value| !value.is_expired(window));
        before - entries.len()
    }

    fn evict_oldest_locked(entries: &mut HashMap<String, WindowEntry>) -> bool {
        let Some(oldest_key) = entries
            .iter()
            .min_by_key(|(_, value)| value.window_start)
            .map(|(key, _)| key.clone())
        else {
            return false;
        };
        entries.remove(&oldest_key);
        true
    }

    fn make_room_locked(&self, entries: &mut HashMap<String, WindowEntry>, key: &str) {
        if !entries.contains_key(key) && entries.len() >= self.max_tracked_keys {
            Self::prune_expired_locked(entries, self.window);
            if entries.len() >= self.max_tracked_keys {
                let _ = Self::evict_oldest_locked(entries);
            }
        }
    }

    /// Check whether a live (non-expired) entry exists
    async fn is_live(&self, key: &str) -> bool {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .map(|entry| !entry.is_expired(self.window))
            .unwrap_or(false)
    }

    /// Record one hit and return the window count
    ///
    /// An absent or expired entry restarts at 1 with a fresh window.
    async fn increment(&self, key: &str) -> u32 {
        let mut entries = self.entries.write().await;
        self.make_room_locked(&mut entries, key);

        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| WindowEntry {
                count: 0,
                window_start: Instant::now(),
            });

        if entry.is_expired(self.window) {
            entry.count = 1;
            entry.window_start = Instant::now();
        } else {
            entry.count += 1;
        }

        entry.count
    }

    /// Overwrite the entry, restarting its window now
    async fn arm(&self, key: &str) {
        let mut entries = self.entries.write().await;
        self.make_room_locked(&mut entries, key);
        entries.insert(
            key.to_string(),
            WindowEntry {
                count: 1,
                window_start: Instant::now(),
            },
        );
    }

    async fn prune_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        Self::prune_expired_locked(&mut entries, self.window)
    }
}

/// Dual-window rate limiter for the public request intake
///
/// A short window enforces a cooldown between consecutive accepted
/// requests; a long window caps the total per fingerprint. The windows
/// share no state: a long-window rejection leaves the short window
/// unarmed, so a requester who waits out the long window owes no extra
/// cooldown.
pub struct AudienceRateLimiter {
    short: WindowStore,
    long: WindowStore,
    short_window_seconds: u64,
    long_max_requests: u32,
}

impl AudienceRateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            short: WindowStore::new(
                Duration::from_secs(config.short_window_seconds),
                config.max_tracked_keys,
            ),
            long: WindowStore::new(
                Duration::from_secs(config.long_window_seconds),
                config.max_tracked_keys,
            ),
            short_window_seconds: config.short_window_seconds,
            long_max_requests: config.long_max_requests,
        }
    }

    /// Admit one audience request or reject it
    ///
    /// Check order: short cooldown, then long cap. The short window is
    /// armed only after both checks pass, as the final admission step.
    ///
    /// # Returns
    /// Ok if admitted, `RateLimited` if the requester must wait
    pub async fn check_and_admit(
        &self,
        setlist_id: &str,
        fingerprint: &Fingerprint,
    ) -> Result<(), AppError> {
        let key = fingerprint.window_key(setlist_id);

        if self.short.is_live(&key).await {
            return Err(AppError::RateLimited(format!(
                "Wait {}s before sending another request.",
                self.short_window_seconds
            )));
        }

        let count = self.long.increment(&key).await;
        if count > self.long_max_requests {
            return Err(AppError::RateLimited(
                "Request limit exceeded. Try again later.".to_string(),
            ));
        }

        self.short.arm(&key).await;
        Ok(())
    }

    /// Drop expired entries from both windows
    ///
    /// Should be called periodically to bound memory between bursts.
    pub async fn prune_old(&self) {
        let removed = self.short.prune_expired().await + self.long.prune_expired().await;

        if removed > 0 {
            tracing::debug!("Pruned {} expired rate limit entries", removed);
        }
    }
}
