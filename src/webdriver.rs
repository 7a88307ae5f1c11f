//! Minimal W3C WebDriver client for reading a rendered profile page.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, info};

use crate::config::Config;

/// Key under which WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

pub const SUMMARY_LABEL_CSS: &str = ".summary-label";
pub const SUMMARY_COUNT_CSS: &str = ".summary-count";

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}

#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Text of the count displayed next to the summary label containing
    /// `label`. Errors while the label is not rendered yet.
    async fn labeled_count(&mut self, label: &str) -> Result<String>;

    async fn close(&mut self) -> Result<()>;
}

#[derive(Clone)]
pub struct WebDriverLauncher {
    http: Client,
    base_url: Url,
    headless: bool,
}

impl fmt::Debug for WebDriverLauncher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebDriverLauncher")
            .field("base_url", &self.base_url)
            .field("headless", &self.headless)
            .finish_non_exhaustive()
    }
}

impl WebDriverLauncher {
    pub fn new(http: Client, mut base_url: Url, headless: bool) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            http,
            base_url,
            headless,
        }
    }

    pub fn from_config(http: Client, cfg: &Config) -> Result<Self> {
        let base_url = Url::parse(&cfg.web_of_science.webdriver_url)
            .context("invalid web_of_science.webdriver_url")?;
        Ok(Self::new(http, base_url, cfg.web_of_science.headless))
    }
}

pub fn new_session_body(headless: bool) -> Value {
    let mut args = vec!["--no-sandbox", "--disable-dev-shm-usage"];
    if headless {
        args.insert(0, "--headless");
    }
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "goog:chromeOptions": { "args": args }
            }
        }
    })
}

pub fn element_id(value: &Value) -> Option<String> {
    value.get(ELEMENT_KEY)?.as_str().map(str::to_string)
}

async fn send_command(
    http: &Client,
    base_url: &Url,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> Result<Value> {
    let url = base_url
        .join(path)
        .with_context(|| format!("invalid WebDriver path: {}", path))?;
    let mut req = http.request(method, url);
    if let Some(body) = body {
        req = req.json(&body);
    }
    let res = req.send().await.context("failed to reach WebDriver")?;
    let status = res.status();
    let payload: Value = res
        .json()
        .await
        .context("invalid WebDriver response JSON")?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);
    if !status.is_success() {
        let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
        let message = value.get("message").and_then(Value::as_str).unwrap_or_default();
        return Err(anyhow!("webdriver error {} ({}): {}", status, error, message));
    }
    Ok(value)
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let value = send_command(
            &self.http,
            &self.base_url,
            Method::POST,
            "session",
            Some(new_session_body(self.headless)),
        )
        .await
        .context("failed to start browser session")?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("WebDriver response missing sessionId"))?
            .to_string();
        info!(%session_id, "browser session started");
        Ok(Box::new(WebDriverSession {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            session_id: Some(session_id),
        }))
    }
}

pub struct WebDriverSession {
    http: Client,
    base_url: Url,
    session_id: Option<String>,
}

impl WebDriverSession {
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let session_id = self
            .session_id
            .as_deref()
            .ok_or_else(|| anyhow!("browser session already closed"))?;
        let path = format!("session/{}/{}", session_id, path);
        send_command(&self.http, &self.base_url, method, &path, body).await
    }

    async fn find_all(&self, css: &str) -> Result<Vec<String>> {
        let value = self
            .command(
                Method::POST,
                "elements",
                Some(json!({ "using": "css selector", "value": css })),
            )
            .await?;
        Ok(value
            .as_array()
            .map(|items| items.iter().filter_map(element_id).collect())
            .unwrap_or_default())
    }

    async fn find_from(&self, element: &str, using: &str, selector: &str) -> Result<String> {
        let value = self
            .command(
                Method::POST,
                &format!("element/{}/element", element),
                Some(json!({ "using": using, "value": selector })),
            )
            .await?;
        element_id(&value).ok_or_else(|| anyhow!("no element for '{}'", selector))
    }

    async fn text(&self, element: &str) -> Result<String> {
        let value = self
            .command(Method::GET, &format!("element/{}/text", element), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        debug!(url, "navigating");
        self.command(Method::POST, "url", Some(json!({ "url": url })))
            .await
            .with_context(|| format!("failed to navigate to {}", url))?;
        Ok(())
    }

    async fn labeled_count(&mut self, label: &str) -> Result<String> {
        for element in self.find_all(SUMMARY_LABEL_CSS).await? {
            if self.text(&element).await?.contains(label) {
                let parent = self.find_from(&element, "xpath", "..").await?;
                let count = self
                    .find_from(&parent, "css selector", SUMMARY_COUNT_CSS)
                    .await?;
                return Ok(self.text(&count).await?.trim().to_string());
            }
        }
        Err(anyhow!("label '{}' not rendered yet", label))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(session_id) = self.session_id.take() {
            send_command(
                &self.http,
                &self.base_url,
                Method::DELETE,
                &format!("session/{}", session_id),
                None,
            )
            .await
            .context("failed to close browser session")?;
            info!(%session_id, "browser session closed");
        }
        Ok(())
    }
}
