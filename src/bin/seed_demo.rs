//! Create a demo table for trying out `pickdash`.
//!
//! Usage: seed_demo [rows]   (table and path come from the usual env vars)

use chrono::{Duration, Local};
use pickdash::config::Config;
use pickdash::model::{Column, RawRecord, RawValue};
use pickdash::storage::SqliteSource;

const CUSTOMERS: [f64; 4] = [1001.0, 1002.0, 2040.0, 3100.5];
const SKUS: [&str; 5] = ["SKU-A1", "SKU-B7", "SKU-C3", "SKU-D9", "SKU-E2"];
// includes tokens the normalizer treats as not picked
const FLAGS: [&str; 6] = ["Y", "N", " y ", "", "Yes", "N"];

fn demo_record(i: usize, today: chrono::NaiveDate) -> RawRecord {
    let mut rec = RawRecord::new();
    let date = today - Duration::days((i % 10) as i64);
    let quantity = match i % 17 {
        0 => RawValue::text("n/a"),
        3 => RawValue::Null,
        _ => RawValue::Int(((i * 7) % 25 + 1) as i64),
    };
    let event_date = if i % 23 == 0 {
        RawValue::text("not a date")
    } else {
        RawValue::Text(format!("{} 0{}:15:00", date.format("%Y-%m-%d"), i % 10))
    };
    rec.insert(Column::OrderNumber.raw_name().into(), RawValue::Text(format!("PO-{:05}", 1000 + i / 3)));
    rec.insert(Column::Customer.raw_name().into(), RawValue::Float(CUSTOMERS[i % CUSTOMERS.len()]));
    rec.insert(Column::Sku.raw_name().into(), RawValue::text(SKUS[(i / 2) % SKUS.len()]));
    rec.insert(Column::Quantity.raw_name().into(), quantity);
    rec.insert(Column::PickedFlag.raw_name().into(), RawValue::text(FLAGS[i % FLAGS.len()]));
    rec.insert(Column::EventDate.raw_name().into(), event_date);
    rec
}

fn main() {
    let rows: usize = std::env::args()
        .nth(1)
        .and_then(|v| v.parse().ok())
        .unwrap_or(200);
    let cfg = Config::from_env();

    let mut source = match SqliteSource::from_config(&cfg) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("failed to open {}: {}", cfg.sqlite_path, err);
            std::process::exit(1);
        }
    };
    if let Err(err) = source.init(true) {
        eprintln!("failed to create table {}: {}", cfg.table, err);
        std::process::exit(1);
    }

    let today = Local::now().date_naive();
    let records: Vec<RawRecord> = (0..rows).map(|i| demo_record(i, today)).collect();
    match source.insert_records(&records) {
        Ok(n) => println!("inserted {} rows into {} ({})", n, cfg.table, cfg.sqlite_path),
        Err(err) => {
            eprintln!("insert failed: {}", err);
            std::process::exit(1);
        }
    }
}
