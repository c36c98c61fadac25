// File: src/services/snapshots/export.rs
use crate::db::postgres::repository::snapshot_repository::TraitSnapshotRepository;
use crate::env_config::models::app_config::ExportConfig;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::info;

/// `<directory>/<table>_<YYYY-MM-DD>.csv`
pub fn export_path(directory: &str, table_name: &str, today: NaiveDate) -> PathBuf {
    Path::new(directory).join(format!("{}_{}.csv", table_name, today.format("%Y-%m-%d")))
}

/// Dumps the whole snapshot table once the series is caught up.
pub async fn export_table(
    repository: &(dyn TraitSnapshotRepository + Send + Sync),
    config: &ExportConfig,
    table_name: &str,
    today: NaiveDate,
) -> Result<Option<PathBuf>, Box<dyn std::error::Error + Send + Sync>> {
    if !config.enabled {
        info!("CSV export disabled");
        return Ok(None);
    }

    let path = export_path(&config.directory, table_name, today);
    repository.export_csv(&path).await?;
    Ok(Some(path))
}
