use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{self, Instant};
use tracing::debug;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Opaque handle to an element of the current document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("no such element: {0}")]
    NoSuchElement(String),

    #[error("element click intercepted: {0}")]
    ClickIntercepted(String),

    #[error("stale element reference: {0}")]
    StaleElement(String),

    #[error("timed out after {waited:?} waiting for '{selector}'")]
    Timeout { selector: String, waited: Duration },

    #[error("browser session is gone: {0}")]
    SessionGone(String),

    #[error("webdriver error '{error}': {message}")]
    Protocol { error: String, message: String },

    #[error("webdriver transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected webdriver payload: {0}")]
    Decode(String),
}

impl BrowserError {
    pub fn is_no_such_element(&self) -> bool {
        matches!(self, BrowserError::NoSuchElement(_))
    }
}

/// The operations the pipeline needs from a remote rendering session.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    async fn find_element(&self, selector: &str) -> Result<ElementRef, BrowserError>;

    async fn find_elements(&self, selector: &str) -> Result<Vec<ElementRef>, BrowserError>;

    async fn find_child_elements(
        &self,
        parent: &ElementRef,
        selector: &str,
    ) -> Result<Vec<ElementRef>, BrowserError>;

    /// Fails with [`BrowserError::ClickIntercepted`] when another element would receive the click.
    async fn click(&self, element: &ElementRef) -> Result<(), BrowserError>;

    async fn text(&self, element: &ElementRef) -> Result<String, BrowserError>;

    async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value, BrowserError>;

    async fn delete_all_cookies(&self) -> Result<(), BrowserError>;

    async fn close(&self) -> Result<(), BrowserError>;

    /// Polls for `selector` until it appears or `timeout` elapses.
    async fn wait_for_element(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementRef, BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.find_element(selector).await {
                Ok(element) => return Ok(element),
                Err(e) if e.is_no_such_element() => {
                    if Instant::now() >= deadline {
                        return Err(BrowserError::Timeout {
                            selector: selector.to_string(),
                            waited: timeout,
                        });
                    }
                    debug!("'{}' not rendered yet, polling again", selector);
                    time::sleep(WAIT_POLL_INTERVAL).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn viewport_height(&self) -> Result<f64, BrowserError> {
        let value = self
            .execute_script("return window.innerHeight;", Vec::new())
            .await?;
        as_f64(value, "window.innerHeight")
    }

    async fn document_height(&self) -> Result<f64, BrowserError> {
        let value = self
            .execute_script("return document.body.scrollHeight;", Vec::new())
            .await?;
        as_f64(value, "document.body.scrollHeight")
    }

    async fn scroll_to_top(&self) -> Result<(), BrowserError> {
        self.execute_script("window.scrollTo(0, 0);", Vec::new())
            .await
            .map(|_| ())
    }

    async fn scroll_by(&self, pixels: i64) -> Result<(), BrowserError> {
        self.execute_script(
            "window.scrollBy(0, arguments[0]);",
            vec![Value::from(pixels)],
        )
        .await
        .map(|_| ())
    }
}

/// Opens fresh sessions; the coordinator calls it again whenever a session must be recreated.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

fn as_f64(value: Value, what: &str) -> Result<f64, BrowserError> {
    value
        .as_f64()
        .ok_or_else(|| BrowserError::Decode(format!("{} returned {}", what, value)))
}
