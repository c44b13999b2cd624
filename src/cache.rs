// Caching mechanism for resolved calendars, keyed by calendar identifier.
//
// ⚠️ VERSION BUMP REQUIRED:
// Changes to ResolvedEvent or its nested types (Zoned, WeekdayRule) require
// incrementing CACHE_VERSION below to invalidate stale snapshots.
use crate::context::AppContext;
use crate::error::CalError;
use crate::model::ResolvedEvent;
use crate::storage::LocalStorage;
use crate::{LoadOptions, load_calendar};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex};

const CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    events: Vec<ResolvedEvent>,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[derive(Serialize, Deserialize)]
struct CacheSnapshot {
    // If this field is missing in the JSON (old snapshot), it defaults to 0.
    #[serde(default)]
    version: u32,
    entries: HashMap<String, CacheEntry>,
}

#[derive(Debug, Clone)]
pub struct CalendarCache {
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
}

pub type SharedCache = Arc<Mutex<CalendarCache>>;

impl CalendarCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn shared(ttl: Duration) -> SharedCache {
        Arc::new(Mutex::new(Self::new(ttl)))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Expired entries read as absent.
    pub fn get(&self, calendar_id: &str, now: DateTime<Utc>) -> Option<&[ResolvedEvent]> {
        self.entries
            .get(calendar_id)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.events.as_slice())
    }

    pub fn put(&mut self, calendar_id: &str, events: Vec<ResolvedEvent>, now: DateTime<Utc>) {
        self.entries.insert(
            calendar_id.to_string(),
            CacheEntry {
                events,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Returns the cached events, or fetches, parses and resolves them once on a miss.
    pub fn get_or_fetch<F>(
        &mut self,
        calendar_id: &str,
        now: DateTime<Utc>,
        options: &LoadOptions,
        fetch: F,
    ) -> Result<&[ResolvedEvent], CalError>
    where
        F: FnOnce() -> Result<Vec<u8>, CalError>,
    {
        let fresh = self
            .entries
            .get(calendar_id)
            .is_some_and(|entry| entry.is_fresh(now));

        if fresh {
            log::debug!("Cache hit for {}", calendar_id);
        } else {
            log::debug!("Cache miss for {}", calendar_id);
            let raw = fetch()?;
            let calendar = load_calendar(&raw, calendar_id, now, options)?;
            self.put(calendar_id, calendar.events, now);
        }

        Ok(self
            .entries
            .get(calendar_id)
            .map(|entry| entry.events.as_slice())
            .unwrap_or(&[]))
    }

    pub fn invalidate(&mut self, calendar_id: &str) -> bool {
        self.entries.remove(calendar_id).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drops expired entries and returns how many were removed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn save_snapshot(&self, ctx: &dyn AppContext) -> Result<()> {
        let path = ctx.get_cache_snapshot_path()?;
        LocalStorage::with_lock(&path, || {
            let data = CacheSnapshot {
                version: CACHE_VERSION,
                entries: self.entries.clone(),
            };
            let json = serde_json::to_string_pretty(&data)?;
            LocalStorage::atomic_write(&path, json)?;
            Ok(())
        })
    }

    /// Restores fresh entries from disk. A missing, outdated or unreadable
    /// snapshot yields an empty cache.
    pub fn load_snapshot(ctx: &dyn AppContext, ttl: Duration, now: DateTime<Utc>) -> Result<Self> {
        let mut cache = Self::new(ttl);
        let path = ctx.get_cache_snapshot_path()?;
        if !path.exists() {
            return Ok(cache);
        }

        let snapshot = LocalStorage::with_lock(&path, || {
            let json = fs::read_to_string(&path)?;
            Ok(serde_json::from_str::<CacheSnapshot>(&json).ok())
        })?;

        match snapshot {
            Some(data) if data.version == CACHE_VERSION => {
                cache.entries = data
                    .entries
                    .into_iter()
                    .filter(|(_, entry)| entry.is_fresh(now))
                    .collect();
                log::info!("Restored {} calendar(s) from cache snapshot", cache.len());
            }
            _ => log::info!("Ignoring outdated or unreadable cache snapshot"),
        }
        Ok(cache)
    }
}
