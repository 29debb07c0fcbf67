//! Chrome DevTools rendering backend.
//!
//! Each session is one page. By default every session launches its own
//! browser with a throwaway profile; with `debugging_url` set, sessions open
//! tabs in a browser that is already running and leave it running.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as LaunchConfig};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{RenderSession, SessionFactory};
use crate::config::BrowserConfig;
use crate::watch::ListingEntry;
use crate::{FeedwatchError, Result};

/// Delay between two presence checks.
const PRESENCE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Placeholder in [`COLLECT_ENTRIES_EXPRESSION`] for the quoted selector.
const SELECTOR_PLACEHOLDER: &str = "__SELECTOR__";

/// Collects `{children, href}` for every element matching the selector.
///
/// `children` counts all descendant elements; `href` is the resolved link of
/// the enclosing anchor. Each field is read on its own and becomes `null`
/// when the read throws, so one reflowed entry never spoils the snapshot.
const COLLECT_ENTRIES_EXPRESSION: &str = r#"(() => {
    const nodes = Array.from(document.querySelectorAll(__SELECTOR__));
    return nodes.map(function (el) {
        var children = null;
        var href = null;
        try { children = el.querySelectorAll('*').length; } catch (e) {}
        try {
            var parent = el.parentElement;
            if (parent && parent.href) { href = String(parent.href); }
        } catch (e) {}
        return { children: children, href: href };
    });
})()"#;

/// Protocol messages Chrome sends when a node or context went away under us.
const STALE_MARKERS: [&str; 3] = [
    "Cannot find context with specified id",
    "does not belong to the document",
    "Could not find node with given id",
];

/// Translate a DevTools error into a feedwatch error.
fn map_cdp_error(err: CdpError) -> FeedwatchError {
    match err {
        CdpError::Timeout => FeedwatchError::RenderTimeout("DevTools request timed out".to_string()),
        other => {
            let message = other.to_string();
            if STALE_MARKERS.iter().any(|marker| message.contains(marker)) {
                FeedwatchError::StaleReference(message)
            } else {
                FeedwatchError::Render(message)
            }
        }
    }
}

/// Quote `selector` as a JavaScript string literal.
fn selector_literal(selector: &str) -> String {
    json!(selector).to_string()
}

fn count_expression(selector: &str) -> String {
    format!(
        "document.querySelectorAll({}).length",
        selector_literal(selector)
    )
}

fn collect_expression(selector: &str) -> String {
    COLLECT_ENTRIES_EXPRESSION.replace(SELECTOR_PLACEHOLDER, &selector_literal(selector))
}

/// Convert one collected row into a listing entry.
fn entry_from_value(value: &Value) -> ListingEntry {
    ListingEntry {
        child_count: value
            .get("children")
            .and_then(Value::as_u64)
            .map(|n| n as usize),
        link: value
            .get("href")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// Build the launch settings for one session's private browser.
fn launch_config(config: &BrowserConfig, profile_dir: &Path) -> Result<LaunchConfig> {
    let mut builder = LaunchConfig::builder()
        .user_data_dir(profile_dir)
        .launch_timeout(config.launch_timeout())
        .request_timeout(config.request_timeout());
    if !config.executable.is_empty() {
        builder = builder.chrome_executable(&config.executable);
    }
    if !config.headless {
        builder = builder.with_head();
    }
    if config.no_sandbox {
        builder = builder.no_sandbox();
    }
    builder
        .build()
        .map_err(|e| FeedwatchError::SessionAcquisition(format!("invalid browser settings: {e}")))
}

/// Opens Chrome sessions.
pub struct ChromeFactory {
    config: BrowserConfig,
}

impl ChromeFactory {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    /// Launch a private browser with a fresh profile directory.
    async fn launch(&self) -> Result<(Browser, chromiumoxide::Handler, Option<PathBuf>)> {
        let profile_dir = std::env::temp_dir().join(format!("feedwatch-{}", Uuid::new_v4()));
        let launch = launch_config(&self.config, &profile_dir)?;
        match Browser::launch(launch).await {
            Ok((browser, handler)) => Ok((browser, handler, Some(profile_dir))),
            Err(e) => {
                remove_profile(&profile_dir).await;
                Err(FeedwatchError::SessionAcquisition(e.to_string()))
            }
        }
    }

    async fn connect(&self) -> Result<(Browser, chromiumoxide::Handler, Option<PathBuf>)> {
        let (browser, handler) = Browser::connect(self.config.debugging_url.clone())
            .await
            .map_err(|e| FeedwatchError::SessionAcquisition(e.to_string()))?;
        Ok((browser, handler, None))
    }
}

#[async_trait]
impl SessionFactory for ChromeFactory {
    async fn open(&self) -> Result<Box<dyn RenderSession>> {
        let (browser, mut handler, profile_dir) = if self.config.debugging_url.is_empty() {
            self.launch().await?
        } else {
            self.connect().await?
        };

        // The browser only makes progress while its event stream is drained.
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser event stream ended: {}", e);
                    break;
                }
            }
        });

        let mut parts = BrowserParts {
            browser,
            events,
            profile_dir,
        };
        let page = match parts.browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                parts.shut_down().await;
                return Err(FeedwatchError::SessionAcquisition(e.to_string()));
            }
        };

        info!(
            "Opened browser session ({})",
            if parts.profile_dir.is_some() {
                "launched"
            } else {
                "attached"
            }
        );
        Ok(Box::new(ChromeSession { page, parts }))
    }
}

async fn remove_profile(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove browser profile {}: {}", dir.display(), e);
        }
    }
}

/// The browser behind a session and the task draining its events.
struct BrowserParts {
    browser: Browser,
    events: JoinHandle<()>,
    /// Set when the browser was launched for this session.
    profile_dir: Option<PathBuf>,
}

impl BrowserParts {
    /// Close a launched browser, or just detach from an attached one.
    async fn shut_down(mut self) {
        if let Some(dir) = self.profile_dir.take() {
            if let Err(e) = self.browser.close().await {
                warn!("Failed to close browser: {}", e);
            }
            if let Err(e) = self.browser.wait().await {
                warn!("Failed to wait for browser exit: {}", e);
            }
            remove_profile(&dir).await;
        }
        self.events.abort();
    }
}

/// One browser page driven over the DevTools protocol.
pub struct ChromeSession {
    page: Page,
    parts: BrowserParts,
}

impl ChromeSession {
    async fn evaluate(&self, expression: String) -> Result<Value> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .return_by_value(true)
            .await_promise(true)
            .build()
            .map_err(FeedwatchError::Render)?;
        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(map_cdp_error)?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl RenderSession for ChromeSession {
    async fn navigate(&mut self, address: &str) -> Result<()> {
        debug!("Navigating to {}", address);
        self.page.goto(address).await.map_err(map_cdp_error)?;
        Ok(())
    }

    async fn execute_script(&mut self, script: &str) -> Result<Value> {
        self.evaluate(script.to_string()).await
    }

    async fn wait_for_presence(&mut self, selector: &str, timeout: Duration) -> Result<usize> {
        let deadline = tokio::time::Instant::now() + timeout;
        let expression = count_expression(selector);
        loop {
            let found = self
                .evaluate(expression.clone())
                .await?
                .as_u64()
                .unwrap_or(0) as usize;
            if found > 0 {
                return Ok(found);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(FeedwatchError::RenderTimeout(format!(
                    "no element matched {selector} within {}s",
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(PRESENCE_POLL_INTERVAL).await;
        }
    }

    async fn collect_entries(&mut self, selector: &str) -> Result<Vec<ListingEntry>> {
        let value = self.evaluate(collect_expression(selector)).await?;
        let rows = value.as_array().ok_or_else(|| {
            FeedwatchError::Render("entry script did not return an array".to_string())
        })?;
        Ok(rows.iter().map(entry_from_value).collect())
    }

    async fn refresh(&mut self) -> Result<()> {
        self.page.reload().await.map_err(map_cdp_error)?;
        Ok(())
    }

    async fn capture_diagnostic(&mut self, path: &Path) -> Result<()> {
        let image = self
            .page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
            .map_err(map_cdp_error)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, image).await?;
        Ok(())
    }

    async fn release(self: Box<Self>) -> Result<()> {
        let ChromeSession { page, parts } = *self;
        let closed = page.close().await.map_err(map_cdp_error);
        if let Err(e) = &closed {
            warn!("Failed to close browser page: {}", e);
        }
        parts.shut_down().await;
        info!("Closed browser session");
        closed
    }
}
