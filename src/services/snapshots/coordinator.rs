// File: src/services/snapshots/coordinator.rs
use super::columns::ColumnIndex;
use super::cursor::SeriesCursor;
use super::extractor::{self, ExtractionPolicy, SnapshotBatch};
use super::materializer::PageMaterializer;
use super::outcome::{RetryReason, ScrapeError, Step, restart_on_browser_error};
use super::pacing::ScrollPacing;
use crate::app_state::models::AppState;
use crate::browser::session::{BrowserSession, SessionFactory};
use crate::db::postgres::models::snapshot_record::LatestSnapshot;
use crate::db::postgres::repository::snapshot_repository::TraitSnapshotRepository;
use crate::env_config::models::app_config::ScraperConfig;
use chrono::NaiveDate;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{self, Instant};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

/// Итоги одного запуска
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub snapshots: usize,
    pub rows_inserted: u64,
    pub rows_skipped: usize,
    pub retries: usize,
    pub session_restarts: usize,
    pub watchdog_restarts: usize,
    pub interrupted: bool,
}

enum DateOutcome {
    Committed { inserted: u64, skipped: usize },
    RestartSession(String),
}

/// Ведёт временной ряд снимков от последней сохранённой даты до сегодняшней.
///
/// Per date: materialize -> resolve columns -> extract -> persist -> advance.
/// Every recoverable failure re-enters at materialization for the same date.
pub struct SnapshotCoordinator {
    config: ScraperConfig,
    repository: Arc<dyn TraitSnapshotRepository + Send + Sync>,
    sessions: Arc<dyn SessionFactory>,
    pacing: ScrollPacing,
    summary: RunSummary,
}

impl SnapshotCoordinator {
    pub fn new(
        config: ScraperConfig,
        repository: Arc<dyn TraitSnapshotRepository + Send + Sync>,
        sessions: Arc<dyn SessionFactory>,
    ) -> Self {
        let pacing = ScrollPacing::new(config.scroll_delay(), config.scroll_delay_step());
        Self {
            config,
            repository,
            sessions,
            pacing,
            summary: RunSummary::default(),
        }
    }

    pub fn from_app_state(app_state: &AppState, sessions: Arc<dyn SessionFactory>) -> Self {
        Self::new(
            app_state.settings.app_config.scraper.clone(),
            app_state.postgres_service.repository_snapshot.clone(),
            sessions,
        )
    }

    pub fn pacing(&self) -> &ScrollPacing {
        &self.pacing
    }

    /// Runs until the series reaches the date `today` returns, a fatal error, or
    /// `shutdown` resolves. `today` is read again before every date, so a run that
    /// spans midnight keeps going. The browser session is closed on every exit path.
    pub async fn run<C, S>(&mut self, today: C, shutdown: S) -> Result<RunSummary, ScrapeError>
    where
        C: Fn() -> NaiveDate,
        S: Future<Output = ()>,
    {
        let span = info_span!("ingest", run_id = %Uuid::new_v4());
        self.run_inner(today, shutdown).instrument(span).await
    }

    async fn run_inner<C, S>(&mut self, today: C, shutdown: S) -> Result<RunSummary, ScrapeError>
    where
        C: Fn() -> NaiveDate,
        S: Future<Output = ()>,
    {
        self.summary = RunSummary::default();
        let mut cursor = self.open_cursor().await?;

        let start_day = today();
        if cursor.is_caught_up(start_day) {
            info!("Series already caught up, next snapshot {} is not before {}", cursor.next(), start_day);
            return Ok(self.summary.clone());
        }

        info!("Starting from snapshot {}", cursor.next());
        let mut session = self.sessions.connect().await.map_err(ScrapeError::Connect)?;

        let result = tokio::select! {
            result = self.run_series(&mut session, &mut cursor, &today) => result.map(|_| false),
            _ = shutdown => Ok(true),
        };

        if let Err(e) = session.close().await {
            warn!("Failed to close browser session: {}", e);
        }

        if result? {
            warn!("Shutdown requested, stopped before snapshot {}", cursor.next());
            self.summary.interrupted = true;
        }
        Ok(self.summary.clone())
    }

    async fn open_cursor(&self) -> Result<SeriesCursor, ScrapeError> {
        let latest = self
            .repository
            .latest_snapshot_date()
            .await
            .map_err(ScrapeError::Cursor)?;

        match latest {
            LatestSnapshot::TableMissing => {
                info!("Snapshot table missing, creating it and starting from {}", self.config.epoch_start);
                self.repository.ensure_table().await.map_err(ScrapeError::Cursor)?;
            }
            LatestSnapshot::Empty => info!("Snapshot table empty, starting from {}", self.config.epoch_start),
            LatestSnapshot::Latest(date) => info!("Most recent stored snapshot is {}", date),
        }

        Ok(SeriesCursor::from_latest(
            latest,
            self.config.epoch_start,
            self.config.period_days,
        ))
    }

    async fn run_series<C>(
        &mut self,
        session: &mut Box<dyn BrowserSession>,
        cursor: &mut SeriesCursor,
        today: &C,
    ) -> Result<(), ScrapeError>
    where
        C: Fn() -> NaiveDate,
    {
        let window = self.config.watchdog_window();
        let mut deadline = Instant::now() + window;

        while !cursor.is_caught_up(today()) {
            let date = cursor.next();
            let attempt = self
                .capture_date(&**session, date)
                .instrument(info_span!("snapshot", %date));

            match time::timeout_at(deadline, attempt).await {
                Ok(Ok(DateOutcome::Committed { inserted, skipped })) => {
                    self.summary.snapshots += 1;
                    self.summary.rows_inserted += inserted;
                    self.summary.rows_skipped += skipped;

                    let next = cursor.advance();
                    deadline = Instant::now() + window;
                    info!("Snapshot {} done, next is {}", date, next);
                }
                Ok(Ok(DateOutcome::RestartSession(reason))) => {
                    warn!("Restarting browser session during {}: {}", date, reason);
                    self.restart_session(session).await?;
                    self.summary.session_restarts += 1;
                }
                Ok(Err(e)) => {
                    error!("Stopping at snapshot {}: {}", date, e);
                    return Err(e);
                }
                Err(_) => {
                    // Браузер, скорее всего, исчерпал ресурсы: пересоздаём сессию целиком
                    warn!(
                        "No snapshot completed within {:?}, recreating browser session and retrying {}",
                        window, date
                    );
                    self.restart_session(session).await?;
                    self.summary.watchdog_restarts += 1;
                    deadline = Instant::now() + window;
                }
            }
        }

        info!("Series caught up with {}", today());
        Ok(())
    }

    async fn restart_session(&self, session: &mut Box<dyn BrowserSession>) -> Result<(), ScrapeError> {
        if let Err(e) = session.close().await {
            warn!("Old browser session did not close cleanly: {}", e);
        }
        *session = self.sessions.connect().await.map_err(ScrapeError::Connect)?;
        Ok(())
    }

    async fn capture_date(
        &mut self,
        session: &dyn BrowserSession,
        date: NaiveDate,
    ) -> Result<DateOutcome, ScrapeError> {
        loop {
            let step = restart_on_browser_error(self.capture_once(session, date).await)?;

            let reason = match step {
                Step::Continue(batch) => return self.persist(batch).await,
                Step::RestartSession(reason) => return Ok(DateOutcome::RestartSession(reason)),
                Step::RetrySnapshot(reason) => reason,
                Step::SkipRow(reason) => RetryReason::SnapshotSkipped(reason),
            };

            self.summary.retries += 1;
            warn!("Retrying snapshot {}: {}", date, reason);
            self.recover(session, &reason).await;
        }
    }

    async fn capture_once(
        &self,
        session: &dyn BrowserSession,
        date: NaiveDate,
    ) -> Result<Step<SnapshotBatch>, ScrapeError> {
        let materializer = PageMaterializer::new(session, &self.config);
        let table = match materializer.materialize(date, self.pacing.current()).await?.proceed() {
            Ok(table) => table,
            Err(step) => return Ok(step),
        };

        let columns = ColumnIndex::resolve(&table.headers, self.config.change_offsets_from_end)
            .map_err(|source| ScrapeError::Columns { date, source })?;

        let policy = ExtractionPolicy::from(&self.config);
        extractor::extract_snapshot(session, &table, &columns, date, &policy).await
    }

    async fn persist(&self, batch: SnapshotBatch) -> Result<DateOutcome, ScrapeError> {
        extractor::ensure_unique_keys(&batch)?;

        info!("Batch inserting {} rows for {}", batch.records.len(), batch.date);
        let inserted = self
            .repository
            .insert_batch(&batch.records)
            .await
            .map_err(|source| ScrapeError::Persistence {
                date: batch.date,
                source,
            })?;

        info!(
            "Snapshot {} committed: {} new rows, {} skipped",
            batch.date, inserted, batch.skipped
        );
        Ok(DateOutcome::Committed {
            inserted,
            skipped: batch.skipped,
        })
    }

    async fn recover(&mut self, session: &dyn BrowserSession, reason: &RetryReason) {
        match reason {
            RetryReason::HeaderMissing { .. } => {
                // Так выглядит ограничение частоты запросов: чистим cookies и ждём
                if let Err(e) = session.delete_all_cookies().await {
                    warn!("Failed to clear cookies: {}", e);
                }
                let cooldown = self.config.rate_limit_cooldown();
                info!("Cooling down for {:?} before retrying", cooldown);
                time::sleep(cooldown).await;
            }
            RetryReason::RenderRace { .. } => {
                self.pacing.slow_down();
            }
            RetryReason::PageNotLoaded(_)
            | RetryReason::TableBodyMissing
            | RetryReason::RankUnreadable { .. }
            | RetryReason::SnapshotSkipped(_) => {
                time::sleep(self.config.retry_delay()).await;
            }
        }
    }
}
