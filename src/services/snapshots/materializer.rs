// File: src/services/snapshots/materializer.rs
use super::outcome::{RetryReason, ScrapeError, Step};
use crate::browser::session::{BrowserError, BrowserSession, ElementRef};
use crate::env_config::models::app_config::ScraperConfig;
use chrono::NaiveDate;
use std::time::Duration;
use tokio::time;
use tracing::{debug, info, warn};

pub const CONSENT_SELECTOR: &str = "#onetrust-reject-all-handler";
pub const LOAD_MORE_SELECTOR: &str = "div.cmc-table-listing__loadmore > button[type='button']";
pub const HEADER_SELECTOR: &str = "thead";
pub const HEADER_CELL_SELECTOR: &str = "th";
pub const BODY_SELECTOR: &str = "tbody";
pub const ROW_SELECTOR: &str = "tr";
pub const CELL_SELECTOR: &str = "td";

/// A fully loaded ranking table: header labels plus body row handles in rank order.
#[derive(Debug, Clone)]
pub struct RenderedTable {
    pub headers: Vec<String>,
    pub rows: Vec<ElementRef>,
}

pub fn snapshot_url(base_url: &str, date: NaiveDate) -> String {
    format!(
        "{}/historical/{}/",
        base_url.trim_end_matches('/'),
        date.format("%Y%m%d")
    )
}

/// Drives one browser session until a date's whole table is in the document.
pub struct PageMaterializer<'a> {
    session: &'a dyn BrowserSession,
    config: &'a ScraperConfig,
}

impl<'a> PageMaterializer<'a> {
    pub fn new(session: &'a dyn BrowserSession, config: &'a ScraperConfig) -> Self {
        Self { session, config }
    }

    pub async fn materialize(
        &self,
        date: NaiveDate,
        scroll_delay: Duration,
    ) -> Result<Step<RenderedTable>, ScrapeError> {
        let url = snapshot_url(&self.config.base_url, date);
        info!("Loading snapshot {} from {}", date, url);
        self.session.navigate(&url).await?;

        match self
            .session
            .wait_for_element(&self.config.landmark_selector, self.config.page_load_timeout())
            .await
        {
            Ok(_) => debug!("Page shell rendered"),
            Err(e @ BrowserError::Timeout { .. }) => {
                return Ok(Step::RetrySnapshot(RetryReason::PageNotLoaded(e.to_string())));
            }
            Err(e) => return Err(e.into()),
        }

        self.dismiss_consent().await?;
        let clicks = self.load_all_rows().await?;
        debug!("\"Load More\" activated {} times", clicks);

        self.scroll_page(scroll_delay).await?;

        Ok(self.read_table().await?)
    }

    /// Best effort: a missing or unclickable consent button is not an error.
    async fn dismiss_consent(&self) -> Result<(), BrowserError> {
        match self.session.find_element(CONSENT_SELECTOR).await {
            Ok(button) => match self.session.click(&button).await {
                Ok(()) => info!("Consent overlay dismissed"),
                Err(e) => warn!("Failed to click consent button: {}", e),
            },
            Err(e) if e.is_no_such_element() => debug!("No consent overlay present"),
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Activates the progressive-loading control until it disappears or the
    /// activation budget is spent. Returns the number of successful activations.
    async fn load_all_rows(&self) -> Result<usize, BrowserError> {
        let budget = self.config.load_more_budget();
        let mut clicks = 0;

        while clicks < budget {
            let button = match self.session.find_element(LOAD_MORE_SELECTOR).await {
                Ok(button) => button,
                Err(e) if e.is_no_such_element() => {
                    info!("\"Load More\" button gone after {} clicks, all rows loaded", clicks);
                    return Ok(clicks);
                }
                Err(e) => return Err(e),
            };

            match self.session.click(&button).await {
                Ok(()) => {}
                Err(BrowserError::ClickIntercepted(detail)) => {
                    warn!("\"Load More\" click intercepted ({}), dismissing overlay", detail);
                    self.dismiss_consent().await?;
                    continue;
                }
                Err(e) => return Err(e),
            }

            clicks += 1;
            debug!("\"Load More\" clicked ({}/{})", clicks, budget);
            time::sleep(self.config.load_more_delay()).await;
        }

        // Some dates keep the control alive forever; the budget is the normal stop there.
        info!("Stopped \"Load More\" after {} clicks", clicks);
        Ok(clicks)
    }

    /// Top-to-bottom pass in viewport-sized steps so lazily rendered rows fill in.
    async fn scroll_page(&self, delay: Duration) -> Result<(), BrowserError> {
        self.session.scroll_to_top().await?;

        let viewport = self.session.viewport_height().await?;
        let document = self.session.document_height().await?;
        let increment = ((viewport * self.config.viewport_scroll_mult) as i64).max(1);

        let mut position = 0i64;
        while (position as f64) < document {
            self.session.scroll_by(increment).await?;
            time::sleep(delay).await;
            position += increment;
        }

        debug!(
            "End of page reached ({} px in {} px steps, {:?} pause)",
            document, increment, delay
        );
        Ok(())
    }

    async fn read_table(&self) -> Result<Step<RenderedTable>, BrowserError> {
        let index = self.config.header_table_index;
        let theads = self.session.find_elements(HEADER_SELECTOR).await?;
        let Some(thead) = theads.get(index) else {
            return Ok(Step::RetrySnapshot(RetryReason::HeaderMissing {
                found: theads.len(),
            }));
        };

        let mut headers = Vec::new();
        for cell in self
            .session
            .find_child_elements(thead, HEADER_CELL_SELECTOR)
            .await?
        {
            headers.push(self.session.text(&cell).await?);
        }
        debug!("Header row: {:?}", headers);

        let body = match self.session.find_element(BODY_SELECTOR).await {
            Ok(body) => body,
            Err(e) if e.is_no_such_element() => {
                return Ok(Step::RetrySnapshot(RetryReason::TableBodyMissing));
            }
            Err(e) => return Err(e),
        };
        let rows = self.session.find_child_elements(&body, ROW_SELECTOR).await?;
        info!("Table rendered with {} rows", rows.len());

        Ok(Step::Continue(RenderedTable { headers, rows }))
    }
}
