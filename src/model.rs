//! Canonical data model shared by the normalizer, filters and aggregator.
//!
//! Raw input arrives as loosely typed records (`RawSnapshot`); everything
//! downstream of [`crate::normalize`] works on [`Dataset`], whose rows are
//! guaranteed canonical.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// =============================================================================
// Columns
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    OrderNumber,
    Customer,
    Sku,
    Quantity,
    PickedFlag,
    EventDate,
}

impl Column {
    pub const ALL: [Column; 6] = [
        Column::OrderNumber,
        Column::Customer,
        Column::Sku,
        Column::Quantity,
        Column::PickedFlag,
        Column::EventDate,
    ];

    /// Field name used in raw records.
    pub fn raw_name(&self) -> &'static str {
        match self {
            Column::OrderNumber => "order_number",
            Column::Customer => "customer_id",
            Column::Sku => "sku",
            Column::Quantity => "quantity",
            Column::PickedFlag => "picking_flag",
            Column::EventDate => "event_date",
        }
    }

    pub fn from_raw_name(name: &str) -> Option<Self> {
        Column::ALL.iter().copied().find(|c| c.raw_name() == name)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.raw_name())
    }
}

// =============================================================================
// Raw input
// =============================================================================

/// A single untyped cell as handed over by a data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawValue {
    pub fn text(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }
}

impl Default for RawValue {
    fn default() -> Self {
        RawValue::Null
    }
}

/// Raw field name -> value. A missing key reads as null.
pub type RawRecord = BTreeMap<String, RawValue>;

pub static NULL_VALUE: RawValue = RawValue::Null;

/// Field lookup where an absent key reads as null.
pub fn raw_field<'a>(rec: &'a RawRecord, name: &str) -> &'a RawValue {
    rec.get(name).unwrap_or(&NULL_VALUE)
}

/// Immutable result of one fetch: the source schema plus its rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSnapshot {
    pub columns: Vec<String>,
    pub records: Vec<RawRecord>,
}

impl RawSnapshot {
    pub fn new(columns: Vec<String>, records: Vec<RawRecord>) -> Self {
        Self { columns, records }
    }

    /// Infer the column list as the union of keys across all records.
    pub fn from_records(records: Vec<RawRecord>) -> Self {
        let columns: BTreeSet<String> = records
            .iter()
            .flat_map(|r| r.keys().cloned())
            .collect();
        Self {
            columns: columns.into_iter().collect(),
            records,
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

// =============================================================================
// Canonical rows
// =============================================================================

pub const PICKED_TOKEN: &str = "Y";
pub const NOT_PICKED_TOKEN: &str = "N";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PickedFlag {
    Picked,
    NotPicked,
}

impl PickedFlag {
    pub fn token(&self) -> &'static str {
        match self {
            PickedFlag::Picked => PICKED_TOKEN,
            PickedFlag::NotPicked => NOT_PICKED_TOKEN,
        }
    }

    pub fn is_picked(&self) -> bool {
        matches!(self, PickedFlag::Picked)
    }
}

impl Default for PickedFlag {
    fn default() -> Self {
        PickedFlag::NotPicked
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Opaque; carried through but never aggregated.
    pub order_number: RawValue,
    pub customer: String,
    pub sku: String,
    pub quantity: f64,
    pub picked: PickedFlag,
    pub event_date: Option<NaiveDate>,
}

impl OrderLine {
    pub fn picked_qty(&self) -> f64 {
        if self.picked.is_picked() {
            self.quantity
        } else {
            0.0
        }
    }
}

/// Which canonical columns the source schema exposes. Built once per snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    columns: BTreeSet<Column>,
}

impl SchemaDescriptor {
    pub fn new<I: IntoIterator<Item = Column>>(columns: I) -> Self {
        Self {
            columns: columns.into_iter().collect(),
        }
    }

    pub fn full() -> Self {
        Self::new(Column::ALL)
    }

    /// Unknown raw names are ignored.
    pub fn from_raw_columns(names: &[String]) -> Self {
        Self::new(names.iter().filter_map(|n| Column::from_raw_name(n)))
    }

    pub fn has(&self, column: Column) -> bool {
        self.columns.contains(&column)
    }

    pub fn has_date_column(&self) -> bool {
        self.has(Column::EventDate)
    }

    pub fn columns(&self) -> impl Iterator<Item = Column> + '_ {
        self.columns.iter().copied()
    }
}

/// Normalized rows plus the schema they were read with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub schema: SchemaDescriptor,
    pub lines: Vec<OrderLine>,
}

impl Dataset {
    pub fn new(schema: SchemaDescriptor, lines: Vec<OrderLine>) -> Self {
        Self { schema, lines }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Same schema, different rows.
    pub fn with_lines(&self, lines: Vec<OrderLine>) -> Self {
        Self {
            schema: self.schema.clone(),
            lines,
        }
    }

    pub fn has_any_date(&self) -> bool {
        self.schema.has_date_column() && self.lines.iter().any(|l| l.event_date.is_some())
    }

    /// Distinct customers, sorted. Empty when the column is absent.
    pub fn customers(&self) -> Vec<String> {
        self.distinct(Column::Customer, |l| &l.customer)
    }

    /// Distinct SKUs, sorted. Empty when the column is absent.
    pub fn skus(&self) -> Vec<String> {
        self.distinct(Column::Sku, |l| &l.sku)
    }

    fn distinct<'a, F>(&'a self, column: Column, pick: F) -> Vec<String>
    where
        F: Fn(&'a OrderLine) -> &'a String,
    {
        if !self.schema.has(column) {
            return Vec::new();
        }
        let set: BTreeSet<&String> = self.lines.iter().map(pick).collect();
        set.into_iter().cloned().collect()
    }

    /// Re-encode as raw input. Normalizing the result yields `self` again.
    pub fn to_raw(&self) -> RawSnapshot {
        let columns: Vec<String> = self
            .schema
            .columns()
            .map(|c| c.raw_name().to_string())
            .collect();
        let records = self
            .lines
            .iter()
            .map(|line| {
                let mut rec = RawRecord::new();
                for col in self.schema.columns() {
                    let value = match col {
                        Column::OrderNumber => line.order_number.clone(),
                        Column::Customer => RawValue::Text(line.customer.clone()),
                        Column::Sku => RawValue::Text(line.sku.clone()),
                        Column::Quantity => RawValue::Float(line.quantity),
                        Column::PickedFlag => RawValue::text(line.picked.token()),
                        Column::EventDate => line
                            .event_date
                            .map(|d| RawValue::Text(d.format("%Y-%m-%d").to_string()))
                            .unwrap_or(RawValue::Null),
                    };
                    rec.insert(col.raw_name().to_string(), value);
                }
                rec
            })
            .collect();
        RawSnapshot::new(columns, records)
    }
}
