use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{
    sync::{watch, RwLock},
    task::JoinHandle,
    time::{interval, Instant, MissedTickBehavior},
};
use tracing::debug;

use palisade_core::PermissionSet;

pub const DEFAULT_PERMISSION_CACHE_TTL_SECS: u64 = 30;
pub const DEFAULT_CACHE_SWEEP_INTERVAL_SECS: u64 = 300;

/// Cache tuning. The TTL bounds worst-case staleness for writes that do
/// not trigger explicit invalidation; the sweep interval only controls
/// how often expired entries are physically reclaimed.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_PERMISSION_CACHE_TTL_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_CACHE_SWEEP_INTERVAL_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    user_id: String,
    channel_id: String,
}

struct CacheEntry {
    value: PermissionSet,
    expires_at: Instant,
}

/// Memoizes resolved effective permissions per (user, channel) pair.
///
/// Reads never return an expired entry; expired entries stay in the map
/// until the sweeper reclaims them, keeping `get` on the read lock only.
/// Invalidation is coarse on purpose: an override row is shared by every
/// user holding the role, and no reverse role-to-user index is kept, so
/// a channel's whole footprint is dropped on any override write.
pub struct PermissionCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
    sweep_interval: Duration,
}

impl PermissionCache {
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: config.ttl,
            sweep_interval: config.sweep_interval,
        }
    }

    pub async fn get(&self, user_id: &str, channel_id: &str) -> Option<PermissionSet> {
        let key = CacheKey {
            user_id: user_id.to_owned(),
            channel_id: channel_id.to_owned(),
        };
        let entries = self.entries.read().await;
        let entry = entries.get(&key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.value)
    }

    pub async fn insert(&self, user_id: &str, channel_id: &str, value: PermissionSet) {
        let key = CacheKey {
            user_id: user_id.to_owned(),
            channel_id: channel_id.to_owned(),
        };
        self.entries.write().await.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Removes every entry whose `(user_id, channel_id)` key matches the
    /// predicate.
    pub async fn delete_where(&self, predicate: impl Fn(&str, &str) -> bool) {
        self.entries
            .write()
            .await
            .retain(|key, _| !predicate(&key.user_id, &key.channel_id));
    }

    /// Drops the channel's entire cache footprint, every user included.
    pub async fn invalidate_channel(&self, channel_id: &str) {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| key.channel_id != channel_id);
        debug!(
            channel_id,
            removed = before - entries.len(),
            "invalidated channel permission cache"
        );
    }

    /// Drops every cached resolution for one user, across all channels.
    pub async fn invalidate_user(&self, user_id: &str) {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| key.user_id != user_id);
        debug!(
            user_id,
            removed = before - entries.len(),
            "invalidated user permission cache"
        );
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Physical entry count, expired entries included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn sweep_expired(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "swept expired permission cache entries");
        }
    }

    /// Spawns the periodic reclamation task. The returned handle must be
    /// shut down when the process stops.
    #[must_use]
    pub fn start_sweeper(self: &Arc<Self>) -> CacheSweeper {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let cache = Arc::clone(self);
        let sweep_interval = self.sweep_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = interval(sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick resolves immediately; skip it
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => cache.sweep_expired().await,
                    _ = stop_rx.changed() => break,
                }
            }
        });
        CacheSweeper {
            stop: stop_tx,
            handle,
        }
    }
}

/// Lifecycle handle for the background sweep task.
pub struct CacheSweeper {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl CacheSweeper {
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.handle.await;
    }
}
