// src/db/postgres/models/snapshot_record.rs
use chrono::NaiveDate;
use serde::Serialize;

/// One ranked row of a historical snapshot.
///
/// Identity is `(snapshot_date, rank, symbol)`. Every nullable quantity is either a
/// parsed value or `None`; a record is never built from a half-parsed row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotRecord {
    pub snapshot_date: NaiveDate,
    /// Seconds since the Unix epoch at midnight UTC of `snapshot_date`.
    pub unix_time: i64,
    pub rank: i32,
    pub name: String,
    pub symbol: String,
    pub market_cap: Option<f64>,
    pub price: Option<f64>,
    pub circulating_supply: Option<i64>,
    pub volume_24h: Option<f64>,
    pub percent_change_1h: Option<f64>,
    pub percent_change_24h: Option<f64>,
    pub percent_change_7d: Option<f64>,
}

impl SnapshotRecord {
    pub fn key(&self) -> (NaiveDate, i32, &str) {
        (self.snapshot_date, self.rank, self.symbol.as_str())
    }
}

/// Outcome of looking up where the stored series ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatestSnapshot {
    TableMissing,
    Empty,
    Latest(NaiveDate),
}

pub fn epoch_seconds(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc().timestamp())
        .unwrap_or_default()
}
