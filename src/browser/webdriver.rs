//! W3C WebDriver client for a remote automation endpoint (chromedriver, selenium, ...).

use super::session::{BrowserError, BrowserSession, ElementRef, SessionFactory};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Key under which W3C drivers return element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

#[derive(Debug, Deserialize)]
struct WireResponse {
    value: Value,
}

#[derive(Debug, Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

pub struct WebDriverFactory {
    client: Client,
    endpoint: String,
    capabilities: Value,
}

impl WebDriverFactory {
    pub fn new(
        endpoint: &str,
        browser_name: &str,
        browser_args: &[String],
        request_timeout: Duration,
    ) -> Result<Self, BrowserError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            capabilities: json!({
                "capabilities": {
                    "alwaysMatch": {
                        "browserName": browser_name,
                        "goog:chromeOptions": { "args": browser_args },
                    }
                }
            }),
        })
    }
}

#[async_trait]
impl SessionFactory for WebDriverFactory {
    async fn connect(&self) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let url = format!("{}/session", self.endpoint);
        let value = send(&self.client, Method::POST, &url, Some(&self.capabilities)).await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Decode(format!("new session returned {}", value)))?
            .to_string();

        info!("WebDriver session {} opened at {}", session_id, self.endpoint);

        Ok(Box::new(WebDriverSession {
            client: self.client.clone(),
            base: format!("{}/session/{}", self.endpoint, session_id),
            session_id,
        }))
    }
}

pub struct WebDriverSession {
    client: Client,
    base: String,
    session_id: String,
}

impl WebDriverSession {
    async fn command(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, BrowserError> {
        let url = format!("{}{}", self.base, path);
        send(&self.client, method, &url, body).await
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        debug!("Navigating to {}", url);
        self.command(Method::POST, "/url", Some(&json!({ "url": url })))
            .await
            .map(|_| ())
    }

    async fn find_element(&self, selector: &str) -> Result<ElementRef, BrowserError> {
        let value = self
            .command(Method::POST, "/element", Some(&css(selector)))
            .await?;
        element_ref(&value)
    }

    async fn find_elements(&self, selector: &str) -> Result<Vec<ElementRef>, BrowserError> {
        let value = self
            .command(Method::POST, "/elements", Some(&css(selector)))
            .await?;
        element_refs(value)
    }

    async fn find_child_elements(
        &self,
        parent: &ElementRef,
        selector: &str,
    ) -> Result<Vec<ElementRef>, BrowserError> {
        let path = format!("/element/{}/elements", parent.0);
        let value = self.command(Method::POST, &path, Some(&css(selector))).await?;
        element_refs(value)
    }

    async fn click(&self, element: &ElementRef) -> Result<(), BrowserError> {
        let path = format!("/element/{}/click", element.0);
        self.command(Method::POST, &path, Some(&json!({})))
            .await
            .map(|_| ())
    }

    async fn text(&self, element: &ElementRef) -> Result<String, BrowserError> {
        let path = format!("/element/{}/text", element.0);
        match self.command(Method::GET, &path, None).await? {
            Value::String(text) => Ok(text),
            other => Err(BrowserError::Decode(format!("element text returned {}", other))),
        }
    }

    async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value, BrowserError> {
        self.command(
            Method::POST,
            "/execute/sync",
            Some(&json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn delete_all_cookies(&self) -> Result<(), BrowserError> {
        self.command(Method::DELETE, "/cookie", None).await.map(|_| ())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        info!("Closing WebDriver session {}", self.session_id);
        self.command(Method::DELETE, "", None).await.map(|_| ())
    }
}

async fn send(
    client: &Client,
    method: Method,
    url: &str,
    body: Option<&Value>,
) -> Result<Value, BrowserError> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(body);
    }

    let response = request.send().await?;
    let status = response.status();
    let payload: WireResponse = response.json().await?;

    if status.is_success() {
        return Ok(payload.value);
    }

    let wire: WireError = serde_json::from_value(payload.value.clone())
        .map_err(|_| BrowserError::Decode(format!("HTTP {}: {}", status, payload.value)))?;
    Err(classify(status, wire))
}

fn classify(status: StatusCode, wire: WireError) -> BrowserError {
    match wire.error.as_str() {
        "no such element" => BrowserError::NoSuchElement(wire.message),
        "element click intercepted" => BrowserError::ClickIntercepted(wire.message),
        "stale element reference" => BrowserError::StaleElement(wire.message),
        "invalid session id" => BrowserError::SessionGone(wire.message),
        _ => {
            warn!("WebDriver returned HTTP {}: {}", status, wire.error);
            BrowserError::Protocol {
                error: wire.error,
                message: wire.message,
            }
        }
    }
}

fn css(selector: &str) -> Value {
    json!({ "using": "css selector", "value": selector })
}

fn element_ref(value: &Value) -> Result<ElementRef, BrowserError> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(|id| ElementRef(id.to_string()))
        .ok_or_else(|| BrowserError::Decode(format!("expected element reference, got {}", value)))
}

fn element_refs(value: Value) -> Result<Vec<ElementRef>, BrowserError> {
    match value {
        Value::Array(items) => items.iter().map(element_ref).collect(),
        other => Err(BrowserError::Decode(format!("expected element list, got {}", other))),
    }
}
