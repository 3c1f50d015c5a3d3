//! Picking progress reporting: normalize raw order lines, apply the user's
//! filters, and aggregate picked vs. total quantity per date, customer and SKU.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod filters;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod storage;

pub use aggregate::{aggregate, reduce_global, AggregateRow, KeyValue, Kpi};
pub use dashboard::{Dashboard, DashboardSession, DashboardView};
pub use error::CoreError;
pub use filters::{apply_filters, CombineMode, DateRangeFilter, FilterState, SetFilter};
pub use model::{Column, Dataset, OrderLine, PickedFlag, RawRecord, RawSnapshot, RawValue};
pub use normalize::{normalize, normalize_with_report};
