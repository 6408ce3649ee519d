use crate::domain::model::{AggregateKind, AggregateRow, FilterSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Entries younger than this are served without running the query.
    pub fresh_secs: u64,
    /// Entries not read for this long are dropped.
    pub idle_evict_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            fresh_secs: 5 * 60,
            idle_evict_secs: 10 * 60,
        }
    }
}

impl CacheSettings {
    pub fn fresh_for(&self) -> Duration {
        Duration::from_secs(self.fresh_secs)
    }

    pub fn evict_after(&self) -> Duration {
        Duration::from_secs(self.idle_evict_secs)
    }
}

type CacheKey = (AggregateKind, FilterSpec);

struct Entry {
    rows: Vec<AggregateRow>,
    fetched_at: Instant,
    last_access: Instant,
}

/// Aggregate results keyed by the aggregate and the exact filter combination
/// they were computed under.
pub struct ResultCache {
    settings: CacheSettings,
    entries: Mutex<HashMap<CacheKey, Entry>>,
}

impl ResultCache {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            settings,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached rows if they are still fresh.
    pub async fn get_fresh(&self, kind: AggregateKind, spec: &FilterSpec) -> Option<Vec<AggregateRow>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        self.evict_idle(&mut entries, now);

        let entry = entries.get_mut(&(kind, spec.clone()))?;
        entry.last_access = now;
        if now.duration_since(entry.fetched_at) < self.settings.fresh_for() {
            tracing::debug!("Cache hit for {} under {}", kind, spec);
            Some(entry.rows.clone())
        } else {
            tracing::debug!("Cached {} under {} is stale", kind, spec);
            None
        }
    }

    pub async fn insert(&self, kind: AggregateKind, spec: &FilterSpec, rows: Vec<AggregateRow>) {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        self.evict_idle(&mut entries, now);
        entries.insert(
            (kind, spec.clone()),
            Entry {
                rows,
                fetched_at: now,
                last_access: now,
            },
        );
    }

    pub async fn len(&self) -> usize {
        let mut entries = self.entries.lock().await;
        self.evict_idle(&mut entries, Instant::now());
        entries.len()
    }

    fn evict_idle(&self, entries: &mut HashMap<CacheKey, Entry>, now: Instant) {
        let limit = self.settings.evict_after();
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.last_access) < limit);
        let evicted = before - entries.len();
        if evicted > 0 {
            tracing::debug!("Evicted {} idle cache entr(ies)", evicted);
        }
    }
}
