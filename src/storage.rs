use anyhow::{bail, Result};
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, Connection};

use crate::cache::FetchParams;
use crate::config::{ColumnMap, Config};
use crate::logging::{log, obj, v_bool, v_num, v_str, Domain, Level};
use crate::model::{raw_field, Column, Dataset, RawRecord, RawSnapshot, RawValue};
use crate::normalize::normalize_with_report;

/// Anything that can hand over a complete raw snapshot.
pub trait RawSource {
    /// Canonical raw names of the columns this source exposes.
    fn schema(&self) -> Result<Vec<String>>;
    fn fetch(&self, params: &FetchParams) -> Result<RawSnapshot>;
}

/// Fetch and normalize in one step.
pub fn load_dataset(source: &dyn RawSource, params: &FetchParams) -> Result<Dataset> {
    let snapshot = source.fetch(params)?;
    let (dataset, report) = normalize_with_report(&snapshot);
    log(
        Level::Info,
        Domain::Source,
        "loaded",
        obj(&[
            ("rows", v_num(report.rows as f64)),
            ("has_date", v_bool(dataset.schema.has_date_column())),
            ("clean", v_bool(report.is_clean())),
        ]),
    );
    Ok(dataset)
}

impl ToSql for RawValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            RawValue::Null => ToSqlOutput::Owned(Value::Null),
            RawValue::Int(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            RawValue::Float(f) => ToSqlOutput::Owned(Value::Real(*f)),
            RawValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

fn raw_value(v: ValueRef<'_>) -> RawValue {
    match v {
        ValueRef::Null | ValueRef::Blob(_) => RawValue::Null,
        ValueRef::Integer(i) => RawValue::Int(i),
        ValueRef::Real(f) => RawValue::Float(f),
        ValueRef::Text(t) => RawValue::Text(String::from_utf8_lossy(t).into_owned()),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Coarse `WHERE` clause for a date window bound to `?1..?2`.
///
/// SQLite's `date()` disagrees with `parse_event_date` on some inputs: it
/// shifts offset timestamps to UTC and reads numbers as Julian days. So the
/// clause may only let extra rows through, never drop one the normalizer
/// would date inside the window. Non-text and unparseable values always pass,
/// and the window is widened by a day on each side to cover any UTC offset.
/// `apply_filters` makes the exact cut.
fn date_prefilter(col: &str) -> String {
    format!(
        " WHERE typeof({c}) <> 'text' OR date({c}) IS NULL \
         OR date({c}) BETWEEN date(?1, '-1 day') AND date(?2, '+1 day')",
        c = col
    )
}

pub struct SqliteSource {
    conn: Connection,
    table: String,
    columns: ColumnMap,
}

impl SqliteSource {
    pub fn new(path: &str, table: &str, columns: ColumnMap) -> Result<Self> {
        Ok(Self {
            conn: Connection::open(path)?,
            table: table.to_string(),
            columns,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(&cfg.sqlite_path, &cfg.table, cfg.columns.clone())
    }

    pub fn open_in_memory(table: &str, columns: ColumnMap) -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            table: table.to_string(),
            columns,
        })
    }

    fn physical(&self, column: Column) -> &str {
        match column {
            Column::OrderNumber => &self.columns.order_number,
            Column::Customer => &self.columns.customer,
            Column::Sku => &self.columns.sku,
            Column::Quantity => &self.columns.quantity,
            Column::PickedFlag => &self.columns.picking_flag,
            Column::EventDate => &self.columns.event_date,
        }
    }

    /// Create the table if missing. Customer, quantity and date columns carry
    /// no declared type so mixed source values are stored as given.
    pub fn init(&mut self, with_date: bool) -> Result<()> {
        let mut cols = vec![
            format!("{} TEXT", quote_ident(&self.columns.order_number)),
            quote_ident(&self.columns.customer),
            format!("{} TEXT", quote_ident(&self.columns.sku)),
            quote_ident(&self.columns.quantity),
            format!("{} TEXT", quote_ident(&self.columns.picking_flag)),
        ];
        if with_date {
            cols.push(quote_ident(&self.columns.event_date));
        }
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({});",
            quote_ident(&self.table),
            cols.join(", ")
        ))?;
        Ok(())
    }

    /// Insert raw records keyed by canonical names; columns missing from the
    /// table are skipped.
    pub fn insert_records(&mut self, records: &[RawRecord]) -> Result<usize> {
        let present = self.present_columns()?;
        if present.is_empty() {
            bail!("table {} not found or has no known columns", self.table);
        }
        let names: Vec<String> = present.iter().map(|c| quote_ident(self.physical(*c))).collect();
        let marks: Vec<String> = (1..=present.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&self.table),
            names.join(", "),
            marks.join(", ")
        );

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for rec in records {
                let values: Vec<&RawValue> = present
                    .iter()
                    .map(|c| raw_field(rec, c.raw_name()))
                    .collect();
                stmt.execute(params_from_iter(values))?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    fn physical_columns(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(&self.table)))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    fn present_columns(&self) -> Result<Vec<Column>> {
        let physical = self.physical_columns()?;
        Ok(Column::ALL
            .iter()
            .copied()
            .filter(|c| {
                let name = self.physical(*c);
                physical.iter().any(|p| p.eq_ignore_ascii_case(name))
            })
            .collect())
    }
}

impl RawSource for SqliteSource {
    fn schema(&self) -> Result<Vec<String>> {
        Ok(self
            .present_columns()?
            .iter()
            .map(|c| c.raw_name().to_string())
            .collect())
    }

    fn fetch(&self, params: &FetchParams) -> Result<RawSnapshot> {
        let present = self.present_columns()?;
        if present.is_empty() {
            bail!("table {} not found or has no known columns", self.table);
        }

        let select: Vec<String> = present
            .iter()
            .map(|c| format!("{} AS {}", quote_ident(self.physical(*c)), quote_ident(c.raw_name())))
            .collect();
        let mut sql = format!("SELECT {} FROM {}", select.join(", "), quote_ident(&self.table));
        let mut bind: Vec<String> = Vec::new();
        let has_date = present.contains(&Column::EventDate);
        if let (true, Some((from, to))) = (has_date, params.date_bounds()) {
            sql.push_str(&date_prefilter(&quote_ident(&self.columns.event_date)));
            bind.push(from.format("%Y-%m-%d").to_string());
            bind.push(to.format("%Y-%m-%d").to_string());
        }

        let names: Vec<String> = present.iter().map(|c| c.raw_name().to_string()).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(bind.iter()), |row| {
                let mut rec = RawRecord::new();
                for (i, name) in names.iter().enumerate() {
                    rec.insert(name.clone(), raw_value(row.get_ref(i)?));
                }
                Ok(rec)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        log(
            Level::Debug,
            Domain::Source,
            "fetched",
            obj(&[
                ("table", v_str(&self.table)),
                ("rows", v_num(records.len() as f64)),
                ("date_pushdown", v_bool(!bind.is_empty())),
            ]),
        );
        Ok(RawSnapshot::new(names, records))
    }
}
