use chrono::NaiveDate;
use std::time::Duration;
use tempfile::TempDir;

use pickdash::cache::{FetchParams, SnapshotCache};
use pickdash::config::ColumnMap;
use pickdash::dashboard::DashboardSession;
use pickdash::filters::{apply_filters, DateRangeFilter, FilterState, SetFilter};
use pickdash::model::{Column, RawRecord, RawValue};
use pickdash::storage::{load_dataset, RawSource, SqliteSource};

fn rec(customer: RawValue, sku: &str, qty: RawValue, flag: RawValue, date: &str) -> RawRecord {
    let mut r = RawRecord::new();
    r.insert("order_number".into(), RawValue::text("PO-1"));
    r.insert("customer_id".into(), customer);
    r.insert("sku".into(), RawValue::text(sku));
    r.insert("quantity".into(), qty);
    r.insert("picking_flag".into(), flag);
    r.insert("event_date".into(), RawValue::text(date));
    r
}

fn seeded(dir: &TempDir, with_date: bool) -> SqliteSource {
    let path = dir.path().join("picking.sqlite");
    let mut src = SqliteSource::new(path.to_str().unwrap(), "sap", ColumnMap::default()).unwrap();
    src.init(with_date).unwrap();
    src.insert_records(&[
        rec(RawValue::Float(101.0), "X", RawValue::Int(10), RawValue::text("Y"), "2024-01-01 08:00:00"),
        rec(RawValue::Float(101.0), "Z", RawValue::text("5"), RawValue::Null, "2024-01-01"),
        rec(RawValue::text("B7"), "X", RawValue::text("oops"), RawValue::text(" y "), "2024-01-02"),
        rec(RawValue::Int(202), "Z", RawValue::Float(2.5), RawValue::text("yes"), "2024-01-05"),
    ])
    .unwrap();
    src
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

#[test]
fn reads_and_normalizes_mixed_values() {
    let dir = TempDir::new().unwrap();
    let src = seeded(&dir, true);
    let ds = load_dataset(&src, &FetchParams::all()).unwrap();

    assert_eq!(ds.len(), 4);
    assert!(ds.schema.has_date_column());
    assert_eq!(ds.lines[0].customer, "101");
    assert_eq!(ds.lines[1].quantity, 5.0);
    assert_eq!(ds.lines[2].quantity, 0.0);
    assert!(ds.lines[2].picked.is_picked());
    assert!(!ds.lines[3].picked.is_picked());
    assert_eq!(ds.lines[0].event_date, Some(day(1)));
    assert_eq!(ds.customers(), vec!["101", "202", "B7"]);
}

#[test]
fn date_window_is_pushed_down() {
    let dir = TempDir::new().unwrap();
    let src = seeded(&dir, true);
    let snap = src.fetch(&FetchParams::between(day(1), day(2))).unwrap();
    assert_eq!(snap.records.len(), 3);
    // one bound only: no pushdown
    let snap = src
        .fetch(&FetchParams {
            date_from: Some(day(2)),
            date_to: None,
        })
        .unwrap();
    assert_eq!(snap.records.len(), 4);
}

#[test]
fn pushdown_agrees_with_core_date_filter() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dates.sqlite");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE sap (order_number TEXT, quantity, picking_flag TEXT, event_date);
         INSERT INTO sap VALUES ('1', 1, 'Y', 20240102);
         INSERT INTO sap VALUES ('2', 2, 'Y', '2024-01-02T01:00:00+02:00');
         INSERT INTO sap VALUES ('3', 4, 'N', '2024-01-02');
         INSERT INTO sap VALUES ('4', 8, 'Y', '2024-01-01T23:30:00-05:00');
         INSERT INTO sap VALUES ('5', 16, 'Y', '2024-01-03 00:00:01');
         INSERT INTO sap VALUES ('6', 32, 'N', NULL);",
    )
    .unwrap();
    drop(conn);

    let src = SqliteSource::new(path.to_str().unwrap(), "sap", ColumnMap::default()).unwrap();
    let state = FilterState {
        date: DateRangeFilter::between(day(2), day(2)),
        ..Default::default()
    };
    let pushed = load_dataset(&src, &FetchParams::between(day(2), day(2))).unwrap();
    let full = load_dataset(&src, &FetchParams::all()).unwrap();
    let from_pushed = apply_filters(&pushed, &state);
    let from_full = apply_filters(&full, &state);

    assert_eq!(from_full.len(), 3);
    assert_eq!(from_pushed.lines, from_full.lines);
}

#[test]
fn table_without_date_column() {
    let dir = TempDir::new().unwrap();
    let src = seeded(&dir, false);
    assert!(!src.schema().unwrap().contains(&"event_date".to_string()));

    let snap = src.fetch(&FetchParams::between(day(1), day(1))).unwrap();
    assert_eq!(snap.records.len(), 4);
    assert!(!snap.has_column(Column::EventDate.raw_name()));

    let mut session = DashboardSession::new(src, SnapshotCache::new(Duration::from_secs(60)));
    let view = session
        .view(&FilterState {
            date: DateRangeFilter::between(day(1), day(1)),
            ..Default::default()
        })
        .unwrap();
    assert!(view.by_date.is_none());
    assert_eq!(view.lines.len(), 4);
}

#[test]
fn custom_physical_column_names() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("legacy.sqlite");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE sap (NUMERO TEXT, CLIENTE, CODIGO TEXT, CANTIDAD, PICKING TEXT);
         INSERT INTO sap VALUES ('1', 55.0, 'X', 4, 'Y');
         INSERT INTO sap VALUES ('2', 55.0, 'X', 6, NULL);",
    )
    .unwrap();
    drop(conn);

    let columns = ColumnMap {
        order_number: "NUMERO".into(),
        customer: "CLIENTE".into(),
        sku: "CODIGO".into(),
        quantity: "CANTIDAD".into(),
        picking_flag: "PICKING".into(),
        event_date: "FECHA".into(),
    };
    let src = SqliteSource::new(path.to_str().unwrap(), "sap", columns).unwrap();
    let mut session = DashboardSession::new(src, SnapshotCache::new(Duration::from_secs(60)));
    let view = session.view(&FilterState::default()).unwrap();
    assert_eq!(view.kpi.total_qty, 10.0);
    assert_eq!(view.kpi.picked_qty, 4.0);
    assert_eq!(view.kpi.progress_pct, 40.0);
    assert_eq!(view.customer_options, vec!["55"]);
}

#[test]
fn session_reuses_cached_snapshot() {
    let dir = TempDir::new().unwrap();
    let src = seeded(&dir, true);
    let mut session = DashboardSession::new(src, SnapshotCache::new(Duration::from_secs(60)));

    let state = FilterState {
        customer: SetFilter::of(["101"]),
        ..Default::default()
    };
    let first = session.view(&state).unwrap();
    assert_eq!(first.lines.len(), 2);

    // rows added after the first fetch stay invisible until the entry expires
    let path = dir.path().join("picking.sqlite");
    let mut writer = SqliteSource::new(path.to_str().unwrap(), "sap", ColumnMap::default()).unwrap();
    writer
        .insert_records(&[rec(RawValue::Float(101.0), "X", RawValue::Int(1), RawValue::Null, "2024-01-03")])
        .unwrap();
    let second = session.view(&state).unwrap();
    assert_eq!(second.fingerprint().unwrap(), first.fingerprint().unwrap());
    assert_eq!(session.source().fetch(&FetchParams::all()).unwrap().records.len(), 5);
}
