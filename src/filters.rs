//! Filter predicate combinator.
//!
//! Three independently toggled predicates (date range, customer set, SKU
//! set). A predicate is *active* only when it is enabled and fully specified:
//! a date filter needs both bounds, a set filter needs at least one value.
//! An enabled-but-empty filter never removes rows.
//!
//! Combination:
//! - customer and SKU both active: combined with `combine_mode` (AND / OR),
//!   then AND-ed with the date predicate if that is active;
//! - otherwise every active predicate is AND-ed and `combine_mode` is ignored.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::logging::{log, obj, v_bool, v_str, Domain, Level};
use crate::model::{Dataset, OrderLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineMode {
    #[default]
    And,
    Or,
}

impl CombineMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "and" => Some(CombineMode::And),
            "or" => Some(CombineMode::Or),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CombineMode::And => "and",
            CombineMode::Or => "or",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DateRangeFilter {
    pub enabled: bool,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRangeFilter {
    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            enabled: true,
            from: Some(from),
            to: Some(to),
        }
    }

    /// Both bounds, when enabled.
    pub fn bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.enabled, self.from, self.to) {
            (true, Some(from), Some(to)) => Some((from, to)),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.bounds().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SetFilter {
    pub enabled: bool,
    pub allowed: BTreeSet<String>,
}

impl SetFilter {
    pub fn of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            enabled: true,
            allowed: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.enabled && !self.allowed.is_empty()
    }

    pub fn matches(&self, value: &str) -> bool {
        self.allowed.contains(value)
    }
}

/// User-selected filters. Owned by the control surface, read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterState {
    pub date: DateRangeFilter,
    pub customer: SetFilter,
    pub sku: SetFilter,
    pub combine_mode: CombineMode,
}

/// Which predicates a [`FilterState`] actually applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilterSummary {
    pub date: bool,
    pub customer: bool,
    pub sku: bool,
    /// `Some` only when `combine_mode` took effect.
    pub combined_with: Option<CombineMode>,
}

impl FilterState {
    pub fn describe(&self) -> FilterSummary {
        let customer = self.customer.is_active();
        let sku = self.sku.is_active();
        FilterSummary {
            date: self.date.is_active(),
            customer,
            sku,
            combined_with: (customer && sku).then_some(self.combine_mode),
        }
    }

    /// Predicate for a single row. `use_date` is false when the dataset has
    /// no date column.
    fn keep(&self, line: &OrderLine, use_date: bool) -> bool {
        if use_date {
            if let Some((from, to)) = self.date.bounds() {
                match line.event_date {
                    Some(d) if from <= d && d <= to => {}
                    _ => return false,
                }
            }
        }

        let by_customer = self.customer.is_active().then(|| self.customer.matches(&line.customer));
        let by_sku = self.sku.is_active().then(|| self.sku.matches(&line.sku));
        match (by_customer, by_sku) {
            (Some(c), Some(s)) => match self.combine_mode {
                CombineMode::And => c && s,
                CombineMode::Or => c || s,
            },
            (Some(c), None) => c,
            (None, Some(s)) => s,
            (None, None) => true,
        }
    }
}

/// Filtered copy of `dataset`, original row order preserved.
pub fn apply_filters(dataset: &Dataset, state: &FilterState) -> Dataset {
    let summary = state.describe();
    let use_date = summary.date && dataset.schema.has_date_column();
    if summary.date && !use_date {
        log(
            Level::Warn,
            Domain::Filter,
            "date_filter_unavailable",
            obj(&[("msg", v_str("dataset has no date column; date filter skipped"))]),
        );
    }

    let lines: Vec<OrderLine> = dataset
        .lines
        .iter()
        .filter(|line| state.keep(line, use_date))
        .cloned()
        .collect();

    log(
        Level::Debug,
        Domain::Filter,
        "applied",
        obj(&[
            ("date", v_bool(use_date)),
            ("customer", v_bool(summary.customer)),
            ("sku", v_bool(summary.sku)),
            (
                "combine_mode",
                summary
                    .combined_with
                    .map(|m| v_str(m.as_str()))
                    .unwrap_or(serde_json::Value::Null),
            ),
            ("rows_in", serde_json::json!(dataset.len())),
            ("rows_out", serde_json::json!(lines.len())),
        ]),
    );

    dataset.with_lines(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Column, PickedFlag, RawValue, SchemaDescriptor};

    fn line(customer: &str, sku: &str, qty: f64, date: Option<(i32, u32, u32)>) -> OrderLine {
        OrderLine {
            order_number: RawValue::Null,
            customer: customer.to_string(),
            sku: sku.to_string(),
            quantity: qty,
            picked: PickedFlag::NotPicked,
            event_date: date.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn dataset() -> Dataset {
        Dataset::new(
            SchemaDescriptor::full(),
            vec![
                line("A", "X", 10.0, Some((2024, 1, 1))),
                line("B", "X", 5.0, Some((2024, 1, 2))),
                line("A", "Z", 3.0, Some((2024, 1, 3))),
                line("C", "Q", 1.0, None),
            ],
        )
    }

    fn quantities(ds: &Dataset) -> Vec<f64> {
        ds.lines.iter().map(|l| l.quantity).collect()
    }

    #[test]
    fn test_default_state_keeps_everything() {
        let ds = dataset();
        assert_eq!(apply_filters(&ds, &FilterState::default()), ds);
    }

    #[test]
    fn test_enabled_empty_set_is_noop() {
        let ds = dataset();
        let state = FilterState {
            customer: SetFilter {
                enabled: true,
                allowed: BTreeSet::new(),
            },
            ..Default::default()
        };
        assert_eq!(apply_filters(&ds, &state), ds);
    }

    #[test]
    fn test_disabled_filter_ignores_selection() {
        let ds = dataset();
        let mut customer = SetFilter::of(["A"]);
        customer.enabled = false;
        let state = FilterState {
            customer,
            ..Default::default()
        };
        assert_eq!(apply_filters(&ds, &state).len(), 4);
    }

    #[test]
    fn test_combine_and() {
        let state = FilterState {
            customer: SetFilter::of(["A"]),
            sku: SetFilter::of(["X"]),
            combine_mode: CombineMode::And,
            ..Default::default()
        };
        assert_eq!(quantities(&apply_filters(&dataset(), &state)), vec![10.0]);
    }

    #[test]
    fn test_combine_or() {
        let state = FilterState {
            customer: SetFilter::of(["A"]),
            sku: SetFilter::of(["X"]),
            combine_mode: CombineMode::Or,
            ..Default::default()
        };
        assert_eq!(quantities(&apply_filters(&dataset(), &state)), vec![10.0, 5.0, 3.0]);
    }

    #[test]
    fn test_single_set_filter_ignores_mode() {
        let state = FilterState {
            customer: SetFilter::of(["A"]),
            sku: SetFilter {
                enabled: true,
                allowed: BTreeSet::new(),
            },
            combine_mode: CombineMode::Or,
            ..Default::default()
        };
        assert_eq!(quantities(&apply_filters(&dataset(), &state)), vec![10.0, 3.0]);
        assert_eq!(state.describe().combined_with, None);
    }

    #[test]
    fn test_date_range_inclusive_and_excludes_missing() {
        let state = FilterState {
            date: DateRangeFilter::between(day(1), day(2)),
            ..Default::default()
        };
        assert_eq!(quantities(&apply_filters(&dataset(), &state)), vec![10.0, 5.0]);
    }

    #[test]
    fn test_date_is_and_on_top_of_or() {
        let state = FilterState {
            date: DateRangeFilter::between(day(2), day(3)),
            customer: SetFilter::of(["A"]),
            sku: SetFilter::of(["X"]),
            combine_mode: CombineMode::Or,
        };
        assert_eq!(quantities(&apply_filters(&dataset(), &state)), vec![5.0, 3.0]);
    }

    #[test]
    fn test_partial_date_range_is_disabled() {
        let state = FilterState {
            date: DateRangeFilter {
                enabled: true,
                from: Some(day(2)),
                to: None,
            },
            ..Default::default()
        };
        assert!(!state.describe().date);
        assert_eq!(apply_filters(&dataset(), &state).len(), 4);
    }

    #[test]
    fn test_inverted_range_matches_nothing() {
        let state = FilterState {
            date: DateRangeFilter::between(day(3), day(1)),
            ..Default::default()
        };
        assert!(apply_filters(&dataset(), &state).is_empty());
    }

    #[test]
    fn test_date_filter_skipped_without_date_column() {
        let mut ds = dataset();
        ds.schema = SchemaDescriptor::new([Column::Customer, Column::Sku, Column::Quantity]);
        let state = FilterState {
            date: DateRangeFilter::between(day(1), day(1)),
            ..Default::default()
        };
        assert_eq!(apply_filters(&ds, &state).len(), 4);
    }

    #[test]
    fn test_state_from_partial_json() {
        let state: FilterState = serde_json::from_str(
            r#"{"customer": {"enabled": true, "allowed": ["A"]}, "combine_mode": "or"}"#,
        )
        .unwrap();
        assert!(state.customer.is_active());
        assert!(!state.date.enabled);
        assert_eq!(state.combine_mode, CombineMode::Or);
    }
}
