// src/db/postgres/repository/snapshot_repository.rs
use crate::db::postgres::connection::PostgresConnection;
use crate::db::postgres::models::snapshot_record::{LatestSnapshot, SnapshotRecord};
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::TryStreamExt;
use sqlx::postgres::PgPoolCopyExt;
use sqlx::{Error as SqlxError, Postgres, QueryBuilder};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

/// Postgres SQLSTATE for `undefined_table`.
const UNDEFINED_TABLE: &str = "42P01";

/// Twelve binds per row keeps each statement far below the 65535 parameter limit.
const INSERT_CHUNK: usize = 1000;

const COLUMNS: &str = "snapshot_date, unix_time, rank, name, symbol, market_cap, price, \
     circulating_supply, volume_24h, percent_change_1h, percent_change_24h, percent_change_7d";

#[async_trait]
pub trait TraitSnapshotRepository {
    /// Where the stored series ends; a missing table is reported, not raised.
    async fn latest_snapshot_date(&self) -> Result<LatestSnapshot, SqlxError>;

    /// Creates the snapshot table when it does not exist yet.
    async fn ensure_table(&self) -> Result<(), SqlxError>;

    /// Writes one snapshot's rows in a single transaction. Rows whose
    /// `(snapshot_date, rank, symbol)` already exist are left untouched.
    /// Returns the number of rows actually inserted.
    async fn insert_batch(&self, records: &[SnapshotRecord]) -> Result<u64, SqlxError>;

    /// Streams the whole table as CSV with a header line into `path`. Returns bytes written.
    async fn export_csv(&self, path: &Path) -> Result<u64, Box<dyn std::error::Error + Send + Sync>>;
}

pub struct StructSnapshotRepository {
    connection: Arc<PostgresConnection>,
    table_name: String,
}

impl StructSnapshotRepository {
    /// `table_name` must already be validated as a plain identifier.
    pub fn new(connection: Arc<PostgresConnection>, table_name: &str) -> Self {
        Self {
            connection,
            table_name: table_name.to_string(),
        }
    }
}

#[async_trait]
impl TraitSnapshotRepository for StructSnapshotRepository {
    async fn latest_snapshot_date(&self) -> Result<LatestSnapshot, SqlxError> {
        let pool = self.connection.get_pool();
        let sql = format!("SELECT MAX(snapshot_date) FROM {}", self.table_name);

        let result = sqlx::query_scalar::<_, Option<NaiveDate>>(&sql)
            .fetch_one(pool)
            .await;

        match result {
            Ok(Some(date)) => {
                debug!("Latest stored snapshot in {} is {}", self.table_name, date);
                Ok(LatestSnapshot::Latest(date))
            }
            Ok(None) => Ok(LatestSnapshot::Empty),
            Err(SqlxError::Database(db_err)) if db_err.code().as_deref() == Some(UNDEFINED_TABLE) => {
                info!("Table {} does not exist yet", self.table_name);
                Ok(LatestSnapshot::TableMissing)
            }
            Err(e) => {
                error!("Error querying latest snapshot date from {}: {}", self.table_name, e);
                Err(e)
            }
        }
    }

    async fn ensure_table(&self) -> Result<(), SqlxError> {
        let pool = self.connection.get_pool();

        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                snapshot_date DATE NOT NULL,
                unix_time BIGINT NOT NULL,
                rank INTEGER NOT NULL,
                name VARCHAR(255) NOT NULL,
                symbol VARCHAR(30) NOT NULL,
                market_cap DECIMAL,
                price DECIMAL,
                circulating_supply BIGINT,
                volume_24h DECIMAL,
                percent_change_1h DECIMAL(7, 2),
                percent_change_24h DECIMAL(7, 2),
                percent_change_7d DECIMAL(7, 2),
                PRIMARY KEY (snapshot_date, rank, symbol)
            )",
            self.table_name
        );

        sqlx::query(&sql).execute(pool).await?;
        info!("Table {} is ready", self.table_name);

        Ok(())
    }

    async fn insert_batch(&self, records: &[SnapshotRecord]) -> Result<u64, SqlxError> {
        if records.is_empty() {
            debug!("No snapshot rows to insert");
            return Ok(0);
        }

        let pool = self.connection.get_pool();
        let mut tx = pool.begin().await?;
        let mut inserted = 0;

        for chunk in records.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO {} ({}) ", self.table_name, COLUMNS));

            builder.push_values(chunk, |mut row, record| {
                row.push_bind(record.snapshot_date)
                    .push_bind(record.unix_time)
                    .push_bind(record.rank)
                    .push_bind(record.name.as_str())
                    .push_bind(record.symbol.as_str())
                    .push_bind(record.market_cap)
                    .push_bind(record.price)
                    .push_bind(record.circulating_supply)
                    .push_bind(record.volume_24h)
                    .push_bind(record.percent_change_1h)
                    .push_bind(record.percent_change_24h)
                    .push_bind(record.percent_change_7d);
            });
            builder.push(" ON CONFLICT (snapshot_date, rank, symbol) DO NOTHING");

            let result = builder.build().execute(&mut *tx).await?;
            inserted += result.rows_affected();
            debug!(
                "Queued chunk of {} rows into {}, {} new",
                chunk.len(),
                self.table_name,
                result.rows_affected()
            );
        }

        // Dropping the transaction before this point rolls every chunk back.
        tx.commit().await?;

        info!(
            "Committed {} of {} rows into {}",
            inserted,
            records.len(),
            self.table_name
        );

        Ok(inserted)
    }

    async fn export_csv(&self, path: &Path) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
        let pool = self.connection.get_pool();
        let statement = format!(
            "COPY (SELECT {} FROM {} ORDER BY snapshot_date, rank) TO STDOUT WITH (FORMAT csv, HEADER true)",
            COLUMNS, self.table_name
        );

        let mut stream = pool.copy_out_raw(&statement).await?;
        let mut file = tokio::fs::File::create(path).await?;
        let mut written = 0u64;

        while let Some(chunk) = stream.try_next().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        info!("Exported {} to {} ({} bytes)", self.table_name, path.display(), written);

        Ok(written)
    }
}
