//! Raw records -> canonical order lines.
//!
//! Normalization never fails: anything unreadable degrades to its default
//! (quantity 0, NOT_PICKED, missing date, empty identifier). It is a pure,
//! order-preserving, row-by-row map.
//!
//! The picked flag is a strict allow-list: after trim + upper-case only the
//! exact token `Y` counts as picked. `YES`, `1`, `TRUE` and typos are all
//! NOT_PICKED. Negative quantities pass through untouched.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::logging::{log, obj, v_num, Domain, Level};
use crate::model::{
    raw_field, Column, Dataset, OrderLine, PickedFlag, RawRecord, RawSnapshot, RawValue,
    SchemaDescriptor, NOT_PICKED_TOKEN, PICKED_TOKEN,
};

/// Counters for values that were coerced to a default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationReport {
    pub rows: u64,
    pub bad_quantity: u64,
    pub negative_quantity: u64,
    pub unknown_flag: u64,
    pub bad_date: u64,
    pub null_customer: u64,
    pub null_sku: u64,
}

impl NormalizationReport {
    pub fn is_clean(&self) -> bool {
        self.bad_quantity == 0
            && self.negative_quantity == 0
            && self.unknown_flag == 0
            && self.bad_date == 0
            && self.null_customer == 0
            && self.null_sku == 0
    }
}

pub fn normalize(snapshot: &RawSnapshot) -> Dataset {
    normalize_with_report(snapshot).0
}

pub fn normalize_with_report(snapshot: &RawSnapshot) -> (Dataset, NormalizationReport) {
    let schema = SchemaDescriptor::from_raw_columns(&snapshot.columns);
    let mut report = NormalizationReport::default();
    let lines = snapshot
        .records
        .iter()
        .map(|rec| normalize_record(rec, &schema, &mut report))
        .collect();

    let fields = obj(&[
        ("rows", v_num(report.rows as f64)),
        ("bad_quantity", v_num(report.bad_quantity as f64)),
        ("negative_quantity", v_num(report.negative_quantity as f64)),
        ("unknown_flag", v_num(report.unknown_flag as f64)),
        ("bad_date", v_num(report.bad_date as f64)),
        ("null_customer", v_num(report.null_customer as f64)),
        ("null_sku", v_num(report.null_sku as f64)),
    ]);
    if report.is_clean() {
        log(Level::Debug, Domain::Normalize, "normalized", fields);
    } else {
        log(Level::Warn, Domain::Normalize, "normalized_with_defaults", fields);
    }

    (Dataset::new(schema, lines), report)
}

fn field<'a>(rec: &'a RawRecord, column: Column) -> &'a RawValue {
    raw_field(rec, column.raw_name())
}

fn normalize_record(
    rec: &RawRecord,
    schema: &SchemaDescriptor,
    report: &mut NormalizationReport,
) -> OrderLine {
    report.rows += 1;

    let quantity = if schema.has(Column::Quantity) {
        match parse_quantity(field(rec, Column::Quantity)) {
            Some(q) => {
                if q < 0.0 {
                    report.negative_quantity += 1;
                }
                q
            }
            None => {
                report.bad_quantity += 1;
                0.0
            }
        }
    } else {
        0.0
    };

    let picked = if schema.has(Column::PickedFlag) {
        let token = flag_token(field(rec, Column::PickedFlag));
        if token != PICKED_TOKEN && token != NOT_PICKED_TOKEN {
            report.unknown_flag += 1;
        }
        picked_from_token(&token)
    } else {
        PickedFlag::NotPicked
    };

    let customer = if schema.has(Column::Customer) {
        canonical_customer(field(rec, Column::Customer)).unwrap_or_else(|| {
            report.null_customer += 1;
            String::new()
        })
    } else {
        String::new()
    };

    let sku = if schema.has(Column::Sku) {
        identifier_string(field(rec, Column::Sku)).unwrap_or_else(|| {
            report.null_sku += 1;
            String::new()
        })
    } else {
        String::new()
    };

    let event_date = if schema.has_date_column() {
        let raw = field(rec, Column::EventDate);
        let parsed = parse_event_date(raw);
        if parsed.is_none() && !raw.is_null() {
            report.bad_date += 1;
        }
        parsed
    } else {
        None
    };

    let order_number = if schema.has(Column::OrderNumber) {
        field(rec, Column::OrderNumber).clone()
    } else {
        RawValue::Null
    };

    OrderLine {
        order_number,
        customer,
        sku,
        quantity,
        picked,
        event_date,
    }
}

/// Trimmed, upper-cased flag token; null and blank read as `N`.
pub fn flag_token(value: &RawValue) -> String {
    let token = match value {
        RawValue::Null => String::new(),
        RawValue::Text(s) => s.trim().to_uppercase(),
        RawValue::Int(i) => i.to_string(),
        RawValue::Float(f) => f.to_string(),
    };
    if token.is_empty() {
        NOT_PICKED_TOKEN.to_string()
    } else {
        token
    }
}

pub fn picked_from_token(token: &str) -> PickedFlag {
    if token == PICKED_TOKEN {
        PickedFlag::Picked
    } else {
        PickedFlag::NotPicked
    }
}

/// `None` when the value is null, does not parse as a number, or is not
/// finite (`inf`, `1e400`).
pub fn parse_quantity(value: &RawValue) -> Option<f64> {
    let q = match value {
        RawValue::Null => return None,
        RawValue::Int(i) => *i as f64,
        RawValue::Float(f) => *f,
        RawValue::Text(s) => s.trim().parse::<f64>().ok()?,
    };
    if !q.is_finite() {
        None
    } else {
        Some(q)
    }
}

/// Integral numbers render without a trailing `.0`; everything else keeps
/// its natural string form.
pub fn canonical_customer(value: &RawValue) -> Option<String> {
    match value {
        RawValue::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(integral_string(*f)),
        other => identifier_string(other),
    }
}

fn integral_string(f: f64) -> String {
    if f.abs() < 9.0e18 {
        (f as i64).to_string()
    } else {
        format!("{:.0}", f)
    }
}

fn identifier_string(value: &RawValue) -> Option<String> {
    match value {
        RawValue::Null => None,
        RawValue::Int(i) => Some(i.to_string()),
        RawValue::Float(f) if f.is_nan() => None,
        RawValue::Float(f) => Some(f.to_string()),
        RawValue::Text(s) => Some(s.clone()),
    }
}

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Calendar day of the value; time-of-day is dropped.
pub fn parse_event_date(value: &RawValue) -> Option<NaiveDate> {
    match value {
        RawValue::Text(s) => parse_date_text(s.trim()),
        RawValue::Int(i) if (10_000_101..=99_991_231).contains(i) => {
            let (y, md) = (*i / 10_000, *i % 10_000);
            NaiveDate::from_ymd_opt(y as i32, (md / 100) as u32, (md % 100) as u32)
        }
        _ => None,
    }
}

fn parse_date_text(s: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive())
}
