use chrono::NaiveDate;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub log: LogConfig,
    pub postgres: PostgresConfig,
    pub webdriver: WebDriverConfig,
    pub scraper: ScraperConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    pub timeout: u64,
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_lifetime: u64,
    pub idle_timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebDriverConfig {
    pub browser_name: String,
    #[serde(default)]
    pub browser_args: Vec<String>,
    pub request_timeout_secs: u64,
}

/// Tunables of the snapshot acquisition pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct ScraperConfig {
    /// Site root; snapshots live under `<base_url>/historical/YYYYMMDD/`.
    pub base_url: String,
    /// Element that proves the page shell has rendered.
    pub landmark_selector: String,
    pub page_load_timeout_secs: u64,
    /// Initial pause after each scroll increment. Raised at runtime on render races.
    pub scroll_delay_ms: u64,
    pub scroll_delay_step_ms: u64,
    /// Multiple of viewport height scrolled per increment.
    pub viewport_scroll_mult: f64,
    pub load_more_delay_ms: u64,
    /// Rows appended by one activation of the "Load More" control.
    pub rows_per_load_more: usize,
    /// Hard bound on "Load More" activations per snapshot.
    pub max_load_more_clicks: usize,
    pub rate_limit_cooldown_secs: u64,
    pub retry_delay_secs: u64,
    /// Position of the ranking table's `thead` among all `thead` elements on the page.
    pub header_table_index: usize,
    pub skip_no_market_cap: bool,
    /// Watchdog window: the browser session is recreated when no date completes within it.
    pub timeout_minutes: u64,
    /// Rows captured per snapshot. Zero means unlimited.
    pub max_rows: usize,
    /// A batch this large halts the run; the cap needs reconfiguring.
    pub row_ceiling: usize,
    /// 1h, 24h and 7d change columns, counted back from the end of the header row.
    pub change_offsets_from_end: [usize; 3],
    pub epoch_start: NaiveDate,
    pub period_days: u32,
    pub table_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    pub enabled: bool,
    pub directory: String,
}

impl ScraperConfig {
    pub fn scroll_delay(&self) -> Duration {
        Duration::from_millis(self.scroll_delay_ms)
    }

    pub fn scroll_delay_step(&self) -> Duration {
        Duration::from_millis(self.scroll_delay_step_ms)
    }

    pub fn load_more_delay(&self) -> Duration {
        Duration::from_millis(self.load_more_delay_ms)
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn watchdog_window(&self) -> Duration {
        Duration::from_secs(self.timeout_minutes * 60)
    }

    pub fn row_cap(&self) -> Option<usize> {
        (self.max_rows > 0).then_some(self.max_rows)
    }

    /// Number of "Load More" activations needed to reach the row cap, assuming the
    /// first page is already rendered. Never exceeds the hard bound.
    pub fn load_more_budget(&self) -> usize {
        match self.row_cap() {
            Some(cap) => cap
                .div_ceil(self.rows_per_load_more.max(1))
                .saturating_sub(1)
                .min(self.max_load_more_clicks),
            None => self.max_load_more_clicks,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        let scraper = &self.scraper;

        if !is_plain_identifier(&scraper.table_name) {
            return Err(format!(
                "scraper.table_name '{}' must be a plain SQL identifier",
                scraper.table_name
            ));
        }
        if scraper.period_days == 0 {
            return Err("scraper.period_days must be positive".to_string());
        }
        if scraper.viewport_scroll_mult <= 0.0 {
            return Err("scraper.viewport_scroll_mult must be positive".to_string());
        }
        if scraper.rows_per_load_more == 0 {
            return Err("scraper.rows_per_load_more must be positive".to_string());
        }
        if scraper.change_offsets_from_end.contains(&0) {
            return Err("scraper.change_offsets_from_end entries start at 1".to_string());
        }
        Ok(())
    }
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
