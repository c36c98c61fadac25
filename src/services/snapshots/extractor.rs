// File: src/services/snapshots/extractor.rs
use super::columns::ColumnIndex;
use super::materializer::{CELL_SELECTOR, RenderedTable};
use super::normalizer::{self, NormalizeError};
use super::outcome::{RetryReason, ScrapeError, SkipReason, Step};
use crate::browser::session::{BrowserSession, ElementRef};
use crate::db::postgres::models::snapshot_record::{SnapshotRecord, epoch_seconds};
use crate::env_config::models::app_config::ScraperConfig;
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ExtractionPolicy {
    pub skip_no_market_cap: bool,
    pub row_cap: Option<usize>,
    pub row_ceiling: usize,
}

impl From<&ScraperConfig> for ExtractionPolicy {
    fn from(config: &ScraperConfig) -> Self {
        Self {
            skip_no_market_cap: config.skip_no_market_cap,
            row_cap: config.row_cap(),
            row_ceiling: config.row_ceiling,
        }
    }
}

/// Every record of one date, ready for a single write.
#[derive(Debug, Clone)]
pub struct SnapshotBatch {
    pub date: NaiveDate,
    pub records: Vec<SnapshotRecord>,
    pub skipped: usize,
}

/// Reads body rows in document order, which is the snapshot's rank order.
pub async fn extract_snapshot(
    session: &dyn BrowserSession,
    table: &RenderedTable,
    columns: &ColumnIndex,
    date: NaiveDate,
    policy: &ExtractionPolicy,
) -> Result<Step<SnapshotBatch>, ScrapeError> {
    let mut records = Vec::with_capacity(table.rows.len());
    let mut skipped = 0;

    for (position, row) in table.rows.iter().enumerate() {
        if policy.row_cap.is_some_and(|cap| records.len() >= cap) {
            info!(
                "Row cap of {} reached, leaving {} rows uncaptured",
                records.len(),
                table.rows.len() - position
            );
            break;
        }

        let row_no = position + 1;
        let cells = session.find_child_elements(row, CELL_SELECTOR).await?;
        if cells.len() < columns.width {
            return Ok(Step::RetrySnapshot(RetryReason::RenderRace {
                row: row_no,
                cells: cells.len(),
                expected: columns.width,
            }));
        }

        let reader = RowReader {
            session,
            cells: &cells,
            date,
            row: row_no,
        };
        match reader.read(columns, policy.skip_no_market_cap).await? {
            Step::Continue(record) => records.push(record),
            Step::SkipRow(reason) => {
                debug!("Row {} skipped: {:?}", row_no, reason);
                skipped += 1;
            }
            Step::RetrySnapshot(reason) => return Ok(Step::RetrySnapshot(reason)),
            Step::RestartSession(reason) => return Ok(Step::RestartSession(reason)),
        }
    }

    if records.len() >= policy.row_ceiling {
        return Err(ScrapeError::RowCeiling {
            date,
            rows: records.len(),
            ceiling: policy.row_ceiling,
        });
    }

    if records.is_empty() {
        warn!("Snapshot {} produced no records", date);
    }

    Ok(Step::Continue(SnapshotBatch {
        date,
        records,
        skipped,
    }))
}

/// Two records of one date sharing rank and symbol means extraction is broken.
pub fn ensure_unique_keys(batch: &SnapshotBatch) -> Result<(), ScrapeError> {
    let mut seen = HashSet::with_capacity(batch.records.len());
    for record in &batch.records {
        if !seen.insert(record.key()) {
            return Err(ScrapeError::DuplicateKey {
                date: batch.date,
                rank: record.rank,
                symbol: record.symbol.clone(),
            });
        }
    }
    Ok(())
}

struct RowReader<'a> {
    session: &'a dyn BrowserSession,
    cells: &'a [ElementRef],
    date: NaiveDate,
    row: usize,
}

impl RowReader<'_> {
    async fn read(&self, columns: &ColumnIndex, skip_no_market_cap: bool) -> Result<Step<SnapshotRecord>, ScrapeError> {
        // Decorated placeholders such as "$--" normalize to None as well
        let market_cap_text = self.text(columns.market_cap).await?;
        let market_cap = self.parse("market_cap", &market_cap_text, normalizer::money)?;
        if market_cap.is_none() && skip_no_market_cap {
            return Ok(Step::SkipRow(SkipReason::NoMarketCap));
        }

        let rank_text = self.text(columns.rank).await?;
        let Some(rank) = normalizer::rank(&rank_text) else {
            return Ok(Step::RetrySnapshot(RetryReason::RankUnreadable {
                row: self.row,
                text: rank_text,
            }));
        };

        let name = self.text(columns.name).await?.trim().to_string();
        let symbol = self.text(columns.symbol).await?.trim().to_string();

        let price_text = self.text(columns.price).await?;
        let price = self.parse("price", &price_text, normalizer::money)?;

        let supply_text = self.text(columns.circulating_supply).await?;
        let circulating_supply = self.parse("circulating_supply", &supply_text, normalizer::supply)?;

        let volume_24h = match columns.volume_24h {
            Some(index) => {
                let text = self.text(index).await?;
                self.parse("volume_24h", &text, normalizer::money)?
            }
            None => None,
        };

        let [hour, day, week] = columns.changes;
        let hour_text = self.text(hour).await?;
        let day_text = self.text(day).await?;
        let week_text = self.text(week).await?;

        Ok(Step::Continue(SnapshotRecord {
            snapshot_date: self.date,
            unix_time: epoch_seconds(self.date),
            rank,
            name,
            symbol,
            market_cap,
            price,
            circulating_supply,
            volume_24h,
            percent_change_1h: self.parse("percent_change_1h", &hour_text, normalizer::percent_change)?,
            percent_change_24h: self.parse("percent_change_24h", &day_text, normalizer::percent_change)?,
            percent_change_7d: self.parse("percent_change_7d", &week_text, normalizer::percent_change)?,
        }))
    }

    async fn text(&self, column: usize) -> Result<String, ScrapeError> {
        Ok(self.session.text(&self.cells[column]).await?)
    }

    fn parse<T>(
        &self,
        field: &'static str,
        text: &str,
        normalize: fn(&str) -> Result<Option<T>, NormalizeError>,
    ) -> Result<Option<T>, ScrapeError> {
        normalize(text).map_err(|source| ScrapeError::Normalize {
            date: self.date,
            row: self.row,
            field,
            source,
        })
    }
}
