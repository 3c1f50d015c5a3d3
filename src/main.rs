//! Picking progress report.
//!
//! Usage:
//!   pickdash [options]
//!
//! Options:
//!   --from=YYYY-MM-DD      Start of the date window (default: today - LOOKBACK_DAYS)
//!   --to=YYYY-MM-DD        End of the date window (default: today)
//!   --no-date              Disable the date filter
//!   --customer=<a,b,...>   Only these customers
//!   --sku=<x,y,...>        Only these SKUs
//!   --mode=<and|or>        How customer and SKU filters combine when both are set
//!   --filters=<file.json>  Load a saved filter state (flags above override it)
//!   --json                 Output the full view as JSON

use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDate};
use serde_json::json;
use std::collections::BTreeSet;

use pickdash::aggregate::{AggregateRow, KeyValue};
use pickdash::cache::SnapshotCache;
use pickdash::config::Config;
use pickdash::dashboard::{DashboardSession, DashboardView};
use pickdash::filters::{CombineMode, FilterState};
use pickdash::logging::{log, obj, v_num, v_str, Domain, Level};
use pickdash::storage::SqliteSource;

#[derive(Debug, Default)]
struct CliOptions {
    state: FilterState,
    as_json: bool,
}

fn parse_list(v: &str) -> BTreeSet<String> {
    v.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_date(flag: &str, v: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d").map_err(|e| format!("{}: bad date {:?}: {}", flag, v, e))
}

fn parse_args(args: &[String], today: NaiveDate, lookback_days: i64) -> Result<CliOptions, String> {
    let mut opts = CliOptions::default();
    if let Some(path) = args.iter().find_map(|a| a.strip_prefix("--filters=")) {
        let raw = std::fs::read_to_string(path).map_err(|e| format!("--filters: {}: {}", path, e))?;
        opts.state = serde_json::from_str(&raw).map_err(|e| format!("--filters: {}: {}", path, e))?;
    } else {
        opts.state.date.enabled = true;
        opts.state.date.from = Some(today - Duration::days(lookback_days));
        opts.state.date.to = Some(today);
    }

    for arg in args {
        if let Some(v) = arg.strip_prefix("--from=") {
            opts.state.date.enabled = true;
            opts.state.date.from = Some(parse_date("--from", v)?);
        } else if let Some(v) = arg.strip_prefix("--to=") {
            opts.state.date.enabled = true;
            opts.state.date.to = Some(parse_date("--to", v)?);
        } else if arg == "--no-date" {
            opts.state.date.enabled = false;
        } else if let Some(v) = arg.strip_prefix("--customer=") {
            opts.state.customer.enabled = true;
            opts.state.customer.allowed = parse_list(v);
        } else if let Some(v) = arg.strip_prefix("--sku=") {
            opts.state.sku.enabled = true;
            opts.state.sku.allowed = parse_list(v);
        } else if let Some(v) = arg.strip_prefix("--mode=") {
            opts.state.combine_mode =
                CombineMode::parse(v).ok_or_else(|| format!("--mode: expected and|or, got {:?}", v))?;
        } else if arg == "--json" {
            opts.as_json = true;
        } else if arg.starts_with("--filters=") {
            continue;
        } else {
            return Err(format!("unknown argument: {}", arg));
        }
    }
    Ok(opts)
}

fn print_usage() {
    eprintln!("usage: pickdash [--from=YYYY-MM-DD] [--to=YYYY-MM-DD] [--no-date]");
    eprintln!("                [--customer=a,b] [--sku=x,y] [--mode=and|or]");
    eprintln!("                [--filters=state.json] [--json]");
}

fn fmt_qty(q: f64) -> String {
    if q.fract() == 0.0 {
        format!("{:.0}", q)
    } else {
        format!("{:.2}", q)
    }
}

fn fmt_key(key: &[KeyValue]) -> String {
    key.iter()
        .map(|k| match k {
            KeyValue::Date(d) => d.to_string(),
            KeyValue::Text(s) if s.is_empty() => "(blank)".to_string(),
            KeyValue::Text(s) => s.clone(),
            KeyValue::Missing => "(none)".to_string(),
        })
        .collect::<Vec<_>>()
        .join(" / ")
}

fn print_table(title: &str, label: &str, rows: Option<&Vec<AggregateRow>>) {
    println!("\n--- {} ---", title);
    let Some(rows) = rows else {
        println!("(no {} column)", label);
        return;
    };
    if rows.is_empty() {
        println!("(no rows)");
        return;
    }
    println!("{:<24} {:>12} {:>12} {:>9}", label, "Total", "Picked", "Progress");
    for r in rows {
        println!(
            "{:<24} {:>12} {:>12} {:>8.1}%",
            fmt_key(&r.key),
            fmt_qty(r.total_qty),
            fmt_qty(r.picked_qty),
            r.progress_pct
        );
    }
}

fn print_text(view: &DashboardView) {
    println!("=== Picking progress ===\n");
    println!("Rows:            {}", view.lines.len());
    println!("Total quantity:  {}", fmt_qty(view.kpi.total_qty));
    println!("Picked quantity: {}", fmt_qty(view.kpi.picked_qty));
    println!("Progress:        {:.1}%", view.kpi.progress_pct);
    let f = &view.filters;
    println!(
        "Filters:         date={} customer={} sku={}{}",
        f.date,
        f.customer,
        f.sku,
        f.combined_with
            .map(|m| format!(" ({})", m.as_str()))
            .unwrap_or_default()
    );

    if view.by_date.is_some() {
        print_table("By date", "Date", view.by_date.as_ref());
    } else {
        println!("\n--- By date ---\n(no date column or no dated rows in range)");
    }
    print_table("By customer", "Customer", view.by_customer.as_ref());
    print_table("By SKU", "SKU", view.by_sku.as_ref());
}

fn run(cfg: &Config, opts: &CliOptions) -> Result<()> {
    let source = SqliteSource::from_config(cfg)
        .with_context(|| format!("opening {}", cfg.sqlite_path))?;
    let mut session = DashboardSession::new(source, SnapshotCache::new(cfg.cache_ttl()));
    let view = session.view(&opts.state)?;

    if opts.as_json {
        let payload = json!({
            "view": view,
            "fingerprint": view.fingerprint()?,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_text(&view);
    }
    Ok(())
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    let cfg = Config::from_env();
    let today = Local::now().date_naive();
    let opts = match parse_args(&args, today, cfg.lookback_days) {
        Ok(o) => o,
        Err(err) => {
            eprintln!("{}", err);
            print_usage();
            std::process::exit(2);
        }
    };

    log(
        Level::Info,
        Domain::System,
        "start",
        obj(&[
            ("table", v_str(&cfg.table)),
            ("sqlite_path", v_str(&cfg.sqlite_path)),
            ("cache_ttl_secs", v_num(cfg.cache_ttl_secs as f64)),
        ]),
    );

    if let Err(err) = run(&cfg, &opts) {
        log(
            Level::Error,
            Domain::System,
            "failed",
            obj(&[("msg", v_str(&format!("{:#}", err)))]),
        );
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}
