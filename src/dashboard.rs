//! One recomputation pass: filter -> KPI -> grouped tables.
//!
//! ```text
//! RawSource ──► SnapshotCache ──► Dataset ──► apply_filters ──► reduce_global
//!                                                  │
//!                                                  └──► aggregate(date | customer | sku)
//! ```

use anyhow::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;

use crate::aggregate::{aggregate, reduce_global, sort_by_key, sort_by_progress_desc, AggregateRow, Kpi};
use crate::cache::{FetchParams, SnapshotCache};
use crate::error::CoreResult;
use crate::filters::{apply_filters, FilterState, FilterSummary};
use crate::logging::{log_pass, ProfileScope};
use crate::model::{Column, Dataset, OrderLine};
use crate::storage::{load_dataset, RawSource};

/// Everything the presentation layer needs for one render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub filters: FilterSummary,
    pub kpi: Kpi,
    /// Ascending by date. `None` without a date column or without any dated row.
    pub by_date: Option<Vec<AggregateRow>>,
    /// Highest progress first. `None` without a customer column.
    pub by_customer: Option<Vec<AggregateRow>>,
    /// Highest progress first. `None` without a SKU column.
    pub by_sku: Option<Vec<AggregateRow>>,
    /// Filter choices, taken from the unfiltered snapshot.
    pub customer_options: Vec<String>,
    pub sku_options: Vec<String>,
    pub lines: Vec<OrderLine>,
}

impl DashboardView {
    /// SHA-256 over the canonical JSON form. Same snapshot + same filters
    /// gives the same fingerprint.
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

pub struct Dashboard;

impl Dashboard {
    pub fn compute(dataset: &Dataset, state: &FilterState) -> CoreResult<DashboardView> {
        let _scope = ProfileScope::new("dashboard.compute");
        let filtered = apply_filters(dataset, state);
        let kpi = reduce_global(&filtered);

        let by_date = if filtered.has_any_date() {
            let mut rows = aggregate(&filtered, &[Column::EventDate])?;
            sort_by_key(&mut rows);
            Some(rows)
        } else {
            None
        };
        let by_customer = Self::ranked(&filtered, Column::Customer)?;
        let by_sku = Self::ranked(&filtered, Column::Sku)?;

        log_pass(
            dataset.len(),
            filtered.len(),
            kpi.total_qty,
            kpi.picked_qty,
            kpi.progress_pct,
        );

        Ok(DashboardView {
            filters: state.describe(),
            kpi,
            by_date,
            by_customer,
            by_sku,
            customer_options: dataset.customers(),
            sku_options: dataset.skus(),
            lines: filtered.lines,
        })
    }

    fn ranked(filtered: &Dataset, column: Column) -> CoreResult<Option<Vec<AggregateRow>>> {
        if !filtered.schema.has(column) {
            return Ok(None);
        }
        let mut rows = aggregate(filtered, &[column])?;
        sort_by_progress_desc(&mut rows);
        Ok(Some(rows))
    }
}

/// A source plus its snapshot cache; each call to [`view`](Self::view) is
/// one full pass.
pub struct DashboardSession<S: RawSource> {
    source: S,
    cache: SnapshotCache,
}

impl<S: RawSource> DashboardSession<S> {
    pub fn new(source: S, cache: SnapshotCache) -> Self {
        Self { source, cache }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// The date filter, when active, is also pushed into the fetch so the
    /// cache is keyed by the requested window.
    pub fn fetch_params(state: &FilterState) -> FetchParams {
        match state.date.bounds() {
            Some((from, to)) => FetchParams::between(from, to),
            None => FetchParams::all(),
        }
    }

    /// Stale windows are dropped first so the cache only holds entries
    /// that could still be served.
    pub fn snapshot(&mut self, params: FetchParams) -> Result<Arc<Dataset>> {
        let now = Instant::now();
        self.cache.purge_expired(now);
        let source = &self.source;
        self.cache
            .get_or_fetch_at(params, now, |p| load_dataset(source, p))
    }

    pub fn view(&mut self, state: &FilterState) -> Result<DashboardView> {
        let snapshot = self.snapshot(Self::fetch_params(state))?;
        Ok(Dashboard::compute(&snapshot, state)?)
    }
}
