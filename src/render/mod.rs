//! Page rendering capability.
//!
//! The monitor never talks to a browser directly; it drives a
//! [`RenderSession`] obtained from a [`SessionFactory`]. The production
//! backend drives Chrome over the DevTools protocol ([`chrome`]).

pub mod chrome;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::watch::ListingEntry;
use crate::Result;

pub use chrome::{ChromeFactory, ChromeSession};

/// Expression that reports whether the page finished loading.
pub const READY_STATE_SCRIPT: &str = "document.readyState === 'complete'";

/// A live page-rendering session.
///
/// Sessions are not safe for concurrent use; the owning monitor task is the
/// only caller.
#[async_trait]
pub trait RenderSession: Send {
    /// Load `address` in the session.
    async fn navigate(&mut self, address: &str) -> Result<()>;

    /// Evaluate a script expression in the page and return its JSON result.
    async fn execute_script(&mut self, script: &str) -> Result<serde_json::Value>;

    /// Wait until at least one element matches `selector`.
    ///
    /// Returns the number of matches, or `RenderTimeout` after `timeout`.
    async fn wait_for_presence(&mut self, selector: &str, timeout: Duration) -> Result<usize>;

    /// Read every entry matching `selector`.
    async fn collect_entries(&mut self, selector: &str) -> Result<Vec<ListingEntry>>;

    /// Reload the current page.
    async fn refresh(&mut self) -> Result<()>;

    /// Save an image of the current page for offline inspection.
    async fn capture_diagnostic(&mut self, path: &Path) -> Result<()>;

    /// Close the session and free the renderer.
    async fn release(self: Box<Self>) -> Result<()>;

    /// Wait until the page reports a complete ready state.
    async fn wait_ready(&mut self, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.execute_script(READY_STATE_SCRIPT).await?.as_bool() == Some(true) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(crate::FeedwatchError::RenderTimeout(format!(
                    "page not ready after {}s",
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Opens new rendering sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Open a fresh session. Errors are reported as `SessionAcquisition`.
    async fn open(&self) -> Result<Box<dyn RenderSession>>;
}
