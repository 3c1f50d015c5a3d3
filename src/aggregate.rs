//! Progress aggregation: total / picked quantity and percent complete,
//! per group or over the whole dataset.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CoreError, CoreResult};
use crate::logging::{log, obj, v_num, v_str, Domain, Level};
use crate::model::{Column, Dataset, OrderLine, RawValue};

/// One component of a group key. Missing values form their own group and
/// sort after every present value. Output only: a date-like text key and a
/// date key serialize to the same string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum KeyValue {
    Date(NaiveDate),
    Text(String),
    Missing,
}

impl KeyValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            KeyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            KeyValue::Date(d) => Some(*d),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub key: Vec<KeyValue>,
    pub total_qty: f64,
    pub picked_qty: f64,
    pub progress_pct: f64,
}

/// Whole-dataset totals for the summary tiles.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Kpi {
    pub total_qty: f64,
    pub picked_qty: f64,
    pub progress_pct: f64,
}

/// 0 when `total_qty` is not positive.
pub fn progress_pct(picked_qty: f64, total_qty: f64) -> f64 {
    if total_qty > 0.0 {
        picked_qty / total_qty * 100.0
    } else {
        0.0
    }
}

fn is_groupable(column: Column) -> bool {
    !matches!(column, Column::Quantity)
}

fn key_value(line: &OrderLine, column: Column) -> KeyValue {
    match column {
        Column::Customer => KeyValue::Text(line.customer.clone()),
        Column::Sku => KeyValue::Text(line.sku.clone()),
        Column::PickedFlag => KeyValue::Text(line.picked.token().to_string()),
        Column::EventDate => line.event_date.map(KeyValue::Date).unwrap_or(KeyValue::Missing),
        Column::OrderNumber => match &line.order_number {
            RawValue::Null => KeyValue::Missing,
            RawValue::Int(i) => KeyValue::Text(i.to_string()),
            RawValue::Float(f) => KeyValue::Text(f.to_string()),
            RawValue::Text(s) => KeyValue::Text(s.clone()),
        },
        // rejected by validate_key
        Column::Quantity => KeyValue::Missing,
    }
}

fn validate_key(dataset: &Dataset, group_key: &[Column]) -> CoreResult<()> {
    for &column in group_key {
        if !is_groupable(column) || !dataset.schema.has(column) {
            log(
                Level::Error,
                Domain::Aggregate,
                "invalid_group_key",
                obj(&[("group_by", v_str(column.raw_name()))]),
            );
            return Err(CoreError::InvalidGroupKey(column));
        }
    }
    Ok(())
}

/// Group rows by `group_key` and compute progress per group.
///
/// An empty key yields a single group over every row. Output comes back in
/// ascending key order; callers that need a particular order sort it
/// themselves (see [`sort_by_key`], [`sort_by_progress_desc`]).
pub fn aggregate(dataset: &Dataset, group_key: &[Column]) -> CoreResult<Vec<AggregateRow>> {
    validate_key(dataset, group_key)?;

    let mut groups: BTreeMap<Vec<KeyValue>, (f64, f64)> = BTreeMap::new();
    for line in &dataset.lines {
        let key: Vec<KeyValue> = group_key.iter().map(|&c| key_value(line, c)).collect();
        let entry = groups.entry(key).or_insert((0.0, 0.0));
        entry.0 += line.quantity;
        entry.1 += line.picked_qty();
    }

    let rows: Vec<AggregateRow> = groups
        .into_iter()
        .map(|(key, (total_qty, picked_qty))| AggregateRow {
            key,
            total_qty,
            picked_qty,
            progress_pct: progress_pct(picked_qty, total_qty),
        })
        .collect();

    log(
        Level::Debug,
        Domain::Aggregate,
        "grouped",
        obj(&[
            (
                "group_by",
                v_str(
                    &group_key
                        .iter()
                        .map(|c| c.raw_name())
                        .collect::<Vec<_>>()
                        .join(","),
                ),
            ),
            ("groups", v_num(rows.len() as f64)),
        ]),
    );
    Ok(rows)
}

/// Totals over every row; same formula as a single-group [`aggregate`].
pub fn reduce_global(dataset: &Dataset) -> Kpi {
    let (total_qty, picked_qty) = dataset
        .lines
        .iter()
        .fold((0.0, 0.0), |(t, p), l| (t + l.quantity, p + l.picked_qty()));
    Kpi {
        total_qty,
        picked_qty,
        progress_pct: progress_pct(picked_qty, total_qty),
    }
}

pub fn sort_by_key(rows: &mut [AggregateRow]) {
    rows.sort_by(|a, b| a.key.cmp(&b.key));
}

/// Highest progress first; ties broken by ascending key.
pub fn sort_by_progress_desc(rows: &mut [AggregateRow]) {
    rows.sort_by(|a, b| {
        b.progress_pct
            .total_cmp(&a.progress_pct)
            .then_with(|| a.key.cmp(&b.key))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PickedFlag, SchemaDescriptor};

    fn line(customer: &str, qty: f64, picked: bool, date: Option<u32>) -> OrderLine {
        OrderLine {
            order_number: RawValue::Null,
            customer: customer.to_string(),
            sku: "S".to_string(),
            quantity: qty,
            picked: if picked {
                PickedFlag::Picked
            } else {
                PickedFlag::NotPicked
            },
            event_date: date.and_then(|d| NaiveDate::from_ymd_opt(2024, 1, d)),
        }
    }

    fn ds(lines: Vec<OrderLine>) -> Dataset {
        Dataset::new(SchemaDescriptor::full(), lines)
    }

    #[test]
    fn test_group_by_date() {
        let data = ds(vec![
            line("A", 10.0, true, Some(1)),
            line("A", 10.0, false, Some(1)),
            line("B", 20.0, false, Some(2)),
            line("B", 20.0, false, Some(2)),
        ]);
        let rows = aggregate(&data, &[Column::EventDate]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, vec![KeyValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())]);
        assert_eq!((rows[0].total_qty, rows[0].picked_qty, rows[0].progress_pct), (20.0, 10.0, 50.0));
        assert_eq!((rows[1].total_qty, rows[1].picked_qty, rows[1].progress_pct), (40.0, 0.0, 0.0));
    }

    #[test]
    fn test_missing_keys_are_kept() {
        let data = ds(vec![line("A", 4.0, true, None), line("A", 6.0, false, Some(3))]);
        let rows = aggregate(&data, &[Column::EventDate]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].key, vec![KeyValue::Missing]);
        assert_eq!(rows[1].total_qty, 4.0);
    }

    #[test]
    fn test_zero_total_is_zero_pct() {
        let data = ds(vec![line("A", 0.0, true, None), line("A", 0.0, false, None)]);
        let rows = aggregate(&data, &[Column::Customer]).unwrap();
        assert_eq!(rows[0].progress_pct, 0.0);
        assert!(!rows[0].progress_pct.is_nan());
        assert_eq!(reduce_global(&data).progress_pct, 0.0);
    }

    #[test]
    fn test_multi_column_key() {
        let data = ds(vec![
            line("A", 1.0, true, Some(1)),
            line("A", 2.0, false, Some(2)),
            line("A", 3.0, true, Some(1)),
        ]);
        let rows = aggregate(&data, &[Column::Customer, Column::EventDate]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].total_qty, 4.0);
        assert_eq!(rows[0].progress_pct, 100.0);
    }

    #[test]
    fn test_empty_key_matches_global() {
        let data = ds(vec![line("A", 3.0, true, None), line("B", 1.0, false, None)]);
        let rows = aggregate(&data, &[]).unwrap();
        let kpi = reduce_global(&data);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].key.is_empty());
        assert_eq!(rows[0].total_qty, kpi.total_qty);
        assert_eq!(rows[0].picked_qty, kpi.picked_qty);
        assert_eq!(kpi.progress_pct, 75.0);
    }

    #[test]
    fn test_invalid_group_key() {
        let mut data = ds(vec![line("A", 1.0, false, None)]);
        data.schema = SchemaDescriptor::new([Column::Customer, Column::Quantity]);
        assert_eq!(
            aggregate(&data, &[Column::EventDate]),
            Err(CoreError::InvalidGroupKey(Column::EventDate))
        );
        assert_eq!(
            aggregate(&data, &[Column::Quantity]),
            Err(CoreError::InvalidGroupKey(Column::Quantity))
        );
    }

    #[test]
    fn test_negative_quantities_pass_through() {
        let data = ds(vec![line("A", 5.0, true, None), line("A", -5.0, false, None)]);
        let kpi = reduce_global(&data);
        assert_eq!(kpi.total_qty, 0.0);
        assert_eq!(kpi.progress_pct, 0.0);
    }

    #[test]
    fn test_key_serialization() {
        let key = vec![
            KeyValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            KeyValue::Text("2024-01-01".to_string()),
            KeyValue::Missing,
        ];
        assert_eq!(
            serde_json::to_value(&key).unwrap(),
            serde_json::json!(["2024-01-01", "2024-01-01", null])
        );
        // same JSON, still distinct groups
        assert_ne!(key[0], key[1]);
    }

    #[test]
    fn test_sort_by_progress_desc() {
        let data = ds(vec![
            line("A", 10.0, false, None),
            line("B", 10.0, true, None),
            line("C", 10.0, false, None),
        ]);
        let mut rows = aggregate(&data, &[Column::Customer]).unwrap();
        sort_by_progress_desc(&mut rows);
        let order: Vec<&str> = rows.iter().filter_map(|r| r.key[0].as_text()).collect();
        assert_eq!(order, vec!["B", "A", "C"]);
        sort_by_key(&mut rows);
        let order: Vec<&str> = rows.iter().filter_map(|r| r.key[0].as_text()).collect();
        assert_eq!(order, vec!["A", "B", "C"]);
    }
}
