// File: src/testing/memory_repository.rs
use crate::db::postgres::models::snapshot_record::{LatestSnapshot, SnapshotRecord};
use crate::db::postgres::repository::snapshot_repository::TraitSnapshotRepository;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::Error as SqlxError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

type Key = (NaiveDate, i32, String);

#[derive(Default)]
struct MemoryState {
    table_exists: bool,
    rows: BTreeMap<Key, SnapshotRecord>,
    fail_next_insert: bool,
    exports: Vec<PathBuf>,
}

/// Snapshot table kept in memory, keyed like the Postgres primary key.
#[derive(Default)]
pub struct MemorySnapshotRepository {
    state: Mutex<MemoryState>,
}

impl MemorySnapshotRepository {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap()
    }

    pub fn table_exists(&self) -> bool {
        self.lock().table_exists
    }

    pub fn total_rows(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn rows_for(&self, date: NaiveDate) -> usize {
        self.records_for(date).len()
    }

    /// Rows of one date in rank order.
    pub fn records_for(&self, date: NaiveDate) -> Vec<SnapshotRecord> {
        self.lock()
            .rows
            .values()
            .filter(|record| record.snapshot_date == date)
            .cloned()
            .collect()
    }

    /// The next `insert_batch` fails as a whole, like a rolled back transaction.
    pub fn fail_next_insert(&self) {
        self.lock().fail_next_insert = true;
    }

    pub fn exports(&self) -> Vec<PathBuf> {
        self.lock().exports.clone()
    }
}

#[async_trait]
impl TraitSnapshotRepository for MemorySnapshotRepository {
    async fn latest_snapshot_date(&self) -> Result<LatestSnapshot, SqlxError> {
        let state = self.lock();
        if !state.table_exists {
            return Ok(LatestSnapshot::TableMissing);
        }
        Ok(state
            .rows
            .keys()
            .map(|(date, _, _)| *date)
            .max()
            .map_or(LatestSnapshot::Empty, LatestSnapshot::Latest))
    }

    async fn ensure_table(&self) -> Result<(), SqlxError> {
        self.lock().table_exists = true;
        Ok(())
    }

    async fn insert_batch(&self, records: &[SnapshotRecord]) -> Result<u64, SqlxError> {
        let mut state = self.lock();
        if std::mem::take(&mut state.fail_next_insert) {
            return Err(SqlxError::PoolTimedOut);
        }
        if !state.table_exists {
            return Err(SqlxError::Protocol("relation does not exist".to_string()));
        }

        let mut inserted = 0;
        for record in records {
            let key = (record.snapshot_date, record.rank, record.symbol.clone());
            if !state.rows.contains_key(&key) {
                state.rows.insert(key, record.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn export_csv(&self, path: &Path) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
        self.lock().exports.push(path.to_path_buf());
        Ok(0)
    }
}
