//! Queue change notifications
//!
//! Fans audience request events out to live queue subscribers over
//! per-setlist broadcast channels. Delivery is lossy: publishing to a
//! setlist nobody watches is a no-op.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};

/// Buffered events per setlist channel
const CHANNEL_CAPACITY: usize = 64;

/// Event emitted when an audience request lands in a queue
#[derive(Debug, Clone, Serialize)]
pub struct QueueEvent {
    pub setlist_id: String,
    pub request_id: String,
    pub created_at: DateTime<Utc>,
}

/// Per-setlist broadcast hub
pub struct QueueNotifier {
    channels: RwLock<HashMap<String, broadcast::Sender<QueueEvent>>>,
}

impl QueueNotifier {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to one setlist's queue events
    ///
    /// Creates the channel on first use.
    pub async fn subscribe(&self, setlist_id: &str) -> broadcast::Receiver<QueueEvent> {
        let mut channels = self.channels.write().await;
        channels
            .entry(setlist_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish an event, dropping it if nobody is listening
    ///
    /// A channel whose last subscriber has disconnected is removed so
    /// idle setlists do not accumulate senders.
    pub async fn publish(&self, event: QueueEvent) {
        let setlist_id = event.setlist_id.clone();

        let delivered = {
            let channels = self.channels.read().await;
            match channels.get(&setlist_id) {
                Some(tx) => tx.send(event).is_ok(),
                None => return,
            }
        };

        if !delivered {
            let mut channels = self.channels.write().await;
            // Re-check under the write lock; a new subscriber may have
            // arrived since the failed send
            let stale = channels
                .get(&setlist_id)
                .map(|tx| tx.receiver_count() == 0)
                .unwrap_or(false);
            if stale {
                channels.remove(&setlist_id);
                tracing::debug!(%setlist_id, "Removed queue channel with no subscribers");
            }
        }
    }

    #[cfg(test)]
    async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

impl Default for QueueNotifier {
    fn default() -> Self {
        Self::new()
    }
}
