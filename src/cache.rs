//! Snapshot cache: fetch parameters -> (normalized snapshot, fetched_at).
//!
//! Entries older than the TTL are refetched. The core never looks at
//! freshness; it only consumes whatever `Arc<Dataset>` this hands out.

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::model::Dataset;

/// Parameters of one raw fetch; also the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FetchParams {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl FetchParams {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(date_from: NaiveDate, date_to: NaiveDate) -> Self {
        Self {
            date_from: Some(date_from),
            date_to: Some(date_to),
        }
    }

    /// Both bounds, if set.
    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        self.date_from.zip(self.date_to)
    }

    fn label(&self) -> String {
        let fmt = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "*".to_string());
        format!("{}..{}", fmt(self.date_from), fmt(self.date_to))
    }
}

#[derive(Debug, Clone)]
struct CachedSnapshot {
    data: Arc<Dataset>,
    fetched_at: Instant,
}

impl CachedSnapshot {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) < ttl
    }
}

pub struct SnapshotCache {
    ttl: Duration,
    entries: HashMap<FetchParams, CachedSnapshot>,
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_or_fetch<F>(&mut self, params: FetchParams, fetch: F) -> Result<Arc<Dataset>>
    where
        F: FnOnce(&FetchParams) -> Result<Dataset>,
    {
        self.get_or_fetch_at(params, Instant::now(), fetch)
    }

    /// Like [`get_or_fetch`](Self::get_or_fetch) with an explicit clock.
    /// A failed fetch leaves any stale entry in place and is not cached.
    pub fn get_or_fetch_at<F>(
        &mut self,
        params: FetchParams,
        now: Instant,
        fetch: F,
    ) -> Result<Arc<Dataset>>
    where
        F: FnOnce(&FetchParams) -> Result<Dataset>,
    {
        if let Some(entry) = self.entries.get(&params) {
            if entry.is_fresh(now, self.ttl) {
                log(
                    Level::Debug,
                    Domain::Cache,
                    "hit",
                    obj(&[("key", v_str(&params.label()))]),
                );
                return Ok(Arc::clone(&entry.data));
            }
        }

        let data = Arc::new(fetch(&params)?);
        log(
            Level::Debug,
            Domain::Cache,
            "miss",
            obj(&[
                ("key", v_str(&params.label())),
                ("rows", v_num(data.len() as f64)),
            ]),
        );
        self.entries.insert(
            params,
            CachedSnapshot {
                data: Arc::clone(&data),
                fetched_at: now,
            },
        );
        Ok(data)
    }

    pub fn invalidate(&mut self, params: &FetchParams) -> bool {
        self.entries.remove(params).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop stale entries; returns how many were removed.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, e| e.is_fresh(now, ttl));
        before - self.entries.len()
    }
}
