/// Physical column names in the source table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub order_number: String,
    pub customer: String,
    pub sku: String,
    pub quantity: String,
    pub picking_flag: String,
    pub event_date: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            order_number: "order_number".to_string(),
            customer: "customer_id".to_string(),
            sku: "sku".to_string(),
            quantity: "quantity".to_string(),
            picking_flag: "picking_flag".to_string(),
            event_date: "event_date".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub sqlite_path: String,
    pub table: String,
    pub columns: ColumnMap,
    /// Seconds a fetched snapshot stays reusable.
    pub cache_ttl_secs: u64,
    /// Default date window when the caller gives none.
    pub lookback_days: i64,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Self {
        let d = ColumnMap::default();
        Self {
            sqlite_path: env_or("SQLITE_PATH", "./picking.sqlite"),
            table: env_or("PICKING_TABLE", "sap"),
            columns: ColumnMap {
                order_number: env_or("COL_ORDER", &d.order_number),
                customer: env_or("COL_CUSTOMER", &d.customer),
                sku: env_or("COL_SKU", &d.sku),
                quantity: env_or("COL_QUANTITY", &d.quantity),
                picking_flag: env_or("COL_PICKING", &d.picking_flag),
                event_date: env_or("DATE_COL", &d.event_date),
            },
            cache_ttl_secs: std::env::var("CACHE_TTL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(60),
            lookback_days: std::env::var("LOOKBACK_DAYS").ok().and_then(|v| v.parse().ok()).unwrap_or(30),
        }
    }

    pub fn cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cache_ttl_secs)
    }
}
