// File: src/testing/fake_browser.rs
//! Scripted rendering endpoint. Pages are keyed by snapshot URL and behave like the
//! real listing: a first block of rows, a "Load More" control, lazy row rendering,
//! an optional consent overlay and a configurable number of misbehaving visits.
use crate::browser::session::{BrowserError, BrowserSession, ElementRef, SessionFactory};
use crate::env_config::models::app_config::ScraperConfig;
use crate::services::snapshots::materializer::{
    BODY_SELECTOR, CELL_SELECTOR, CONSENT_SELECTOR, HEADER_CELL_SELECTOR, HEADER_SELECTOR,
    LOAD_MORE_SELECTOR, ROW_SELECTOR, snapshot_url,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

const VIEWPORT_HEIGHT: f64 = 1000.0;
const PAGE_CHROME_HEIGHT: f64 = 2000.0;
const ROW_HEIGHT: f64 = 60.0;
/// Cells a half-rendered row shows on a racy visit.
const RACY_ROW_CELLS: usize = 2;

const STANDARD_HEADERS: [&str; 10] = [
    "Rank",
    "Name",
    "Symbol",
    "Market Cap",
    "Price",
    "Circulating Supply",
    "volume (24h)",
    "% 1h",
    "% 24h",
    "% 7d",
];

#[derive(Debug, Clone)]
pub struct FakePage {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    consent: bool,
    intercepts: usize,
    endless_load_more: bool,
    rate_limited_visits: usize,
    racy_visits: usize,
    hung_sessions: usize,
}

impl FakePage {
    /// `rows` well-formed coins under the full modern header.
    pub fn standard(rows: usize) -> Self {
        let rows = (1..=rows)
            .map(|rank| {
                vec![
                    rank.to_string(),
                    format!("Coin {}", rank),
                    format!("C{}", rank),
                    format!("${}", 10_000_000 - rank),
                    "$1.50".to_string(),
                    format!("{} C{}", rank * 1000, rank),
                    "$10".to_string(),
                    "0.1%".to_string(),
                    "-0.2%".to_string(),
                    "1.5%".to_string(),
                ]
            })
            .collect();

        Self::build(STANDARD_HEADERS.iter().map(|h| h.to_string()).collect(), rows)
    }

    pub fn with_rows(headers: &[&str], rows: Vec<Vec<&str>>) -> Self {
        Self::build(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.into_iter()
                .map(|row| row.into_iter().map(str::to_string).collect())
                .collect(),
        )
    }

    fn build(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            headers,
            rows,
            consent: false,
            intercepts: 0,
            endless_load_more: false,
            rate_limited_visits: 0,
            racy_visits: 0,
            hung_sessions: 0,
        }
    }

    /// Consent overlay shown on every visit until dismissed.
    pub fn with_consent(mut self) -> Self {
        self.consent = true;
        self
    }

    /// The overlay pops back up `count` times, each time swallowing a "Load More" click.
    pub fn with_intercepts(mut self, count: usize) -> Self {
        self.intercepts = count;
        self
    }

    /// "Load More" never disappears.
    pub fn with_endless_load_more(mut self) -> Self {
        self.endless_load_more = true;
        self
    }

    /// The first `visits` loads render no table header at all.
    pub fn rate_limited(mut self, visits: usize) -> Self {
        self.rate_limited_visits = visits;
        self
    }

    /// The first `visits` loads leave the last row half rendered.
    pub fn with_racy_renders(mut self, visits: usize) -> Self {
        self.racy_visits = visits;
        self
    }

    /// Navigation never returns in the first `sessions` sessions opened.
    pub fn hang_first_sessions(mut self, sessions: usize) -> Self {
        self.hung_sessions = sessions;
        self
    }

    fn has_more(&self, rendered: usize) -> bool {
        self.endless_load_more || rendered < self.rows.len()
    }
}

struct WorldState {
    base_url: String,
    landmark: String,
    header_index: usize,
    rows_per_load_more: usize,
    pages: HashMap<String, FakePage>,
    navigations: HashMap<String, usize>,
    load_more_clicks: usize,
    consent_dismissals: usize,
    scroll_steps: usize,
    last_scroll_at: Option<Instant>,
    last_scroll_pause: Option<Duration>,
    cookie_clears: usize,
    sessions_opened: usize,
    sessions_closed: usize,
}

/// What one session currently has loaded.
struct Document {
    url: String,
    rendered: usize,
    consent_visible: bool,
    rate_limited: bool,
    racy: bool,
}

#[derive(Default)]
struct SessionState {
    document: Option<Document>,
    closed: bool,
}

#[derive(Clone)]
pub struct FakeWorld {
    state: Arc<Mutex<WorldState>>,
}

impl FakeWorld {
    pub fn new(config: &ScraperConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(WorldState {
                base_url: config.base_url.clone(),
                landmark: config.landmark_selector.clone(),
                header_index: config.header_table_index,
                rows_per_load_more: config.rows_per_load_more,
                pages: HashMap::new(),
                navigations: HashMap::new(),
                load_more_clicks: 0,
                consent_dismissals: 0,
                scroll_steps: 0,
                last_scroll_at: None,
                last_scroll_pause: None,
                cookie_clears: 0,
                sessions_opened: 0,
                sessions_closed: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WorldState> {
        self.state.lock().unwrap()
    }

    pub fn add_page(&self, date: NaiveDate, page: FakePage) {
        let mut world = self.lock();
        let url = snapshot_url(&world.base_url, date);
        world.pages.insert(url, page);
    }

    pub fn open_session(&self) -> FakeSession {
        let mut world = self.lock();
        world.sessions_opened += 1;
        FakeSession {
            id: world.sessions_opened,
            world: self.clone(),
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn factory(&self) -> FakeSessionFactory {
        FakeSessionFactory {
            world: self.clone(),
        }
    }

    pub fn navigations(&self, date: NaiveDate) -> usize {
        let world = self.lock();
        let url = snapshot_url(&world.base_url, date);
        world.navigations.get(&url).copied().unwrap_or_default()
    }

    /// Successful activations only; intercepted clicks are not counted.
    pub fn load_more_clicks(&self) -> usize {
        self.lock().load_more_clicks
    }

    pub fn consent_dismissals(&self) -> usize {
        self.lock().consent_dismissals
    }

    pub fn scroll_steps(&self) -> usize {
        self.lock().scroll_steps
    }

    /// Time between the two most recent scroll increments of one pass.
    pub fn last_scroll_pause(&self) -> Option<Duration> {
        self.lock().last_scroll_pause
    }

    pub fn cookie_clears(&self) -> usize {
        self.lock().cookie_clears
    }

    pub fn sessions_opened(&self) -> usize {
        self.lock().sessions_opened
    }

    pub fn sessions_closed(&self) -> usize {
        self.lock().sessions_closed
    }
}

pub struct FakeSessionFactory {
    world: FakeWorld,
}

#[async_trait]
impl SessionFactory for FakeSessionFactory {
    async fn connect(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        Ok(Box::new(self.world.open_session()))
    }
}

pub struct FakeSession {
    id: usize,
    world: FakeWorld,
    state: Mutex<SessionState>,
}

impl FakeSession {
    fn with<R>(
        &self,
        f: impl FnOnce(&mut WorldState, &mut SessionState) -> Result<R, BrowserError>,
    ) -> Result<R, BrowserError> {
        let mut world = self.world.lock();
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(BrowserError::SessionGone(format!("session {} closed", self.id)));
        }
        f(&mut *world, &mut *state)
    }
}

fn loaded<'a>(world: &'a WorldState, state: &'a SessionState) -> Option<(&'a FakePage, &'a Document)> {
    let document = state.document.as_ref()?;
    world.pages.get(&document.url).map(|page| (page, document))
}

fn no_such(selector: &str) -> BrowserError {
    BrowserError::NoSuchElement(format!("no element matches '{}'", selector))
}

fn stale(element: &ElementRef) -> BrowserError {
    BrowserError::StaleElement(element.0.clone())
}

fn indexed(element: &ElementRef, prefix: &str) -> Option<usize> {
    element.0.strip_prefix(prefix)?.parse().ok()
}

fn cell_position(element: &ElementRef) -> Option<(usize, usize)> {
    let (row, column) = element.0.strip_prefix("cell-")?.split_once('-')?;
    Some((row.parse().ok()?, column.parse().ok()?))
}

fn refs(prefix: &str, count: usize) -> Vec<ElementRef> {
    (0..count).map(|i| ElementRef(format!("{}{}", prefix, i))).collect()
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let hang = self.with(|world, state| {
            let visit = {
                let count = world.navigations.entry(url.to_string()).or_default();
                *count += 1;
                *count
            };
            let Some(page) = world.pages.get(url) else {
                state.document = None;
                return Ok(false);
            };

            state.document = Some(Document {
                url: url.to_string(),
                rendered: page.rows.len().min(world.rows_per_load_more),
                consent_visible: page.consent,
                rate_limited: visit <= page.rate_limited_visits,
                racy: visit <= page.racy_visits,
            });
            Ok(self.id <= page.hung_sessions)
        })?;

        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn find_element(&self, selector: &str) -> Result<ElementRef, BrowserError> {
        self.with(|world, state| {
            let (page, document) = loaded(world, state).ok_or_else(|| no_such(selector))?;

            let found = if selector == world.landmark {
                Some("landmark")
            } else {
                match selector {
                    CONSENT_SELECTOR if document.consent_visible => Some("consent"),
                    LOAD_MORE_SELECTOR if page.has_more(document.rendered) => Some("load-more"),
                    BODY_SELECTOR => Some("tbody"),
                    _ => None,
                }
            };
            found
                .map(|id| ElementRef(id.to_string()))
                .ok_or_else(|| no_such(selector))
        })
    }

    async fn find_elements(&self, selector: &str) -> Result<Vec<ElementRef>, BrowserError> {
        if selector == HEADER_SELECTOR {
            return self.with(|world, state| {
                Ok(match loaded(world, state) {
                    Some((_, document)) if !document.rate_limited => {
                        refs("thead-", world.header_index + 1)
                    }
                    _ => Vec::new(),
                })
            });
        }

        match self.find_element(selector).await {
            Ok(element) => Ok(vec![element]),
            Err(e) if e.is_no_such_element() => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn find_child_elements(
        &self,
        parent: &ElementRef,
        selector: &str,
    ) -> Result<Vec<ElementRef>, BrowserError> {
        self.with(|world, state| {
            let (page, document) = loaded(world, state).ok_or_else(|| stale(parent))?;

            if let Some(index) = indexed(parent, "thead-") {
                let ranking = index == world.header_index && selector == HEADER_CELL_SELECTOR;
                return Ok(if ranking { refs("th-", page.headers.len()) } else { Vec::new() });
            }
            if parent.0 == "tbody" && selector == ROW_SELECTOR {
                return Ok(refs("row-", document.rendered));
            }
            if let Some(row) = indexed(parent, "row-") {
                let cells = page.rows.get(row).ok_or_else(|| stale(parent))?.len();
                let cells = if document.racy && row + 1 == document.rendered {
                    cells.min(RACY_ROW_CELLS)
                } else {
                    cells
                };
                if selector != CELL_SELECTOR {
                    return Ok(Vec::new());
                }
                return Ok(refs(&format!("cell-{}-", row), cells));
            }
            Ok(Vec::new())
        })
    }

    async fn click(&self, element: &ElementRef) -> Result<(), BrowserError> {
        self.with(|world, state| {
            let document = state.document.as_mut().ok_or_else(|| stale(element))?;

            match element.0.as_str() {
                "consent" if document.consent_visible => {
                    document.consent_visible = false;
                    world.consent_dismissals += 1;
                    Ok(())
                }
                "load-more" => {
                    let page = world.pages.get_mut(&document.url).ok_or_else(|| stale(element))?;
                    if page.intercepts > 0 {
                        page.intercepts -= 1;
                        document.consent_visible = true;
                        return Err(BrowserError::ClickIntercepted(
                            "other element would receive the click: consent overlay".to_string(),
                        ));
                    }
                    if !page.has_more(document.rendered) {
                        return Err(stale(element));
                    }
                    document.rendered = (document.rendered + world.rows_per_load_more).min(page.rows.len());
                    world.load_more_clicks += 1;
                    Ok(())
                }
                _ => Err(stale(element)),
            }
        })
    }

    async fn text(&self, element: &ElementRef) -> Result<String, BrowserError> {
        self.with(|world, state| {
            let (page, _) = loaded(world, state).ok_or_else(|| stale(element))?;

            let text = if let Some(column) = indexed(element, "th-") {
                page.headers.get(column)
            } else {
                cell_position(element).and_then(|(row, column)| page.rows.get(row)?.get(column))
            };
            text.cloned().ok_or_else(|| stale(element))
        })
    }

    async fn execute_script(&self, script: &str, _args: Vec<Value>) -> Result<Value, BrowserError> {
        self.with(|world, state| {
            if script.contains("innerHeight") {
                return Ok(Value::from(VIEWPORT_HEIGHT));
            }
            if script.contains("scrollHeight") {
                let rendered = loaded(world, state).map_or(0, |(_, document)| document.rendered);
                return Ok(Value::from(PAGE_CHROME_HEIGHT + ROW_HEIGHT * rendered as f64));
            }
            if script.contains("scrollTo(") {
                world.last_scroll_at = None;
                return Ok(Value::Null);
            }
            if script.contains("scrollBy(") {
                let now = Instant::now();
                if let Some(previous) = world.last_scroll_at {
                    world.last_scroll_pause = Some(now - previous);
                }
                world.last_scroll_at = Some(now);
                world.scroll_steps += 1;
                return Ok(Value::Null);
            }
            Err(BrowserError::Protocol {
                error: "javascript error".to_string(),
                message: format!("unsupported script: {}", script),
            })
        })
    }

    async fn delete_all_cookies(&self) -> Result<(), BrowserError> {
        self.with(|world, _| {
            world.cookie_clears += 1;
            Ok(())
        })
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let mut world = self.world.lock();
        let mut state = self.state.lock().unwrap();
        if !state.closed {
            state.closed = true;
            state.document = None;
            world.sessions_closed += 1;
        }
        Ok(())
    }
}
