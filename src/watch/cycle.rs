//! One poll tick: fetch, extract, diff, notify, refresh.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::item::{ItemExtractor, ItemId, ListingEntry};
use super::window::SeenWindow;
use crate::config::MonitorConfig;
use crate::notify::{NotificationSink, Recipient};
use crate::render::RenderSession;
use crate::{FeedwatchError, Result};

/// Timing and page-shape settings shared by the poll cycle and the monitor.
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub tick_interval: Duration,
    pub fetch_timeout: Duration,
    pub ready_timeout: Duration,
    pub priming_settle: Duration,
    pub refresh_settle: Duration,
    pub entry_selector: String,
    pub link_marker_selector: String,
    pub id_prefix_len: usize,
    pub diagnostic_path: PathBuf,
}

impl From<&MonitorConfig> for PollSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            tick_interval: config.tick_interval(),
            fetch_timeout: config.fetch_timeout(),
            ready_timeout: config.ready_timeout(),
            priming_settle: config.priming_settle(),
            refresh_settle: config.refresh_settle(),
            entry_selector: config.entry_selector.clone(),
            link_marker_selector: config.link_marker_selector.clone(),
            id_prefix_len: config.id_prefix_len,
            diagnostic_path: PathBuf::from(&config.diagnostic_path),
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

/// Why a tick could not read the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RenderTimeout,
    StaleReference,
    Render,
}

impl FailureKind {
    fn of(err: &FeedwatchError) -> Self {
        match err {
            FeedwatchError::RenderTimeout(_) => FailureKind::RenderTimeout,
            FeedwatchError::StaleReference(_) => FailureKind::StaleReference,
            _ => FailureKind::Render,
        }
    }
}

/// Result of a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// These ids were notified and admitted.
    NewItemsFound(Vec<ItemId>),
    NoNewItems,
    TransientFailure(FailureKind),
}

/// Text sent for a newly posted listing.
pub fn new_item_message(id: &ItemId) -> String {
    format!("New item found! {id}")
}

/// Executes poll ticks against a rendering session.
///
/// Holds no per-monitor state, so one instance serves every monitor.
#[derive(Clone)]
pub struct PollCycle {
    settings: Arc<PollSettings>,
    extractor: ItemExtractor,
    sink: Arc<dyn NotificationSink>,
}

impl PollCycle {
    pub fn new(settings: Arc<PollSettings>, sink: Arc<dyn NotificationSink>) -> Self {
        let extractor = ItemExtractor::new(settings.id_prefix_len);
        Self {
            settings,
            extractor,
            sink,
        }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    pub fn extractor(&self) -> &ItemExtractor {
        &self.extractor
    }

    /// Run one tick. Never fails: render errors become `TransientFailure`.
    ///
    /// The page is refreshed at the end of every tick, successful or not.
    pub async fn tick(
        &self,
        session: &mut dyn RenderSession,
        window: &mut SeenWindow,
        recipient: &Recipient,
    ) -> TickOutcome {
        let outcome = match self.diff_and_notify(session, window, recipient).await {
            Ok(found) if found.is_empty() => TickOutcome::NoNewItems,
            Ok(found) => TickOutcome::NewItemsFound(found),
            Err(e) => {
                if e.is_transient() {
                    warn!("Tick for {} could not read the feed: {}", recipient, e);
                } else {
                    error!("Tick for {} failed: {}", recipient, e);
                }
                self.capture_diagnostic(session).await;
                TickOutcome::TransientFailure(FailureKind::of(&e))
            }
        };

        self.reset_page(session).await;
        outcome
    }

    /// Wait for the feed markup and read every entry.
    pub async fn fetch_snapshot(
        &self,
        session: &mut dyn RenderSession,
    ) -> Result<Vec<ListingEntry>> {
        let settings = &self.settings;
        session
            .wait_for_presence(&settings.entry_selector, settings.fetch_timeout)
            .await?;
        session
            .wait_for_presence(&settings.link_marker_selector, settings.fetch_timeout)
            .await?;
        session.collect_entries(&settings.entry_selector).await
    }

    async fn diff_and_notify(
        &self,
        session: &mut dyn RenderSession,
        window: &mut SeenWindow,
        recipient: &Recipient,
    ) -> Result<Vec<ItemId>> {
        let snapshot = self.fetch_snapshot(session).await?;
        let fresh: Vec<ItemId> = self
            .extractor
            .extract(&snapshot)
            .into_iter()
            .filter(|id| !window.contains(id))
            .collect();

        debug!(
            "{} entries on page, {} new for {}",
            snapshot.len(),
            fresh.len(),
            recipient
        );

        for id in &fresh {
            if let Err(e) = self.sink.deliver(recipient, &new_item_message(id)).await {
                warn!("Failed to notify {} about {}: {}", recipient, id, e);
            }
            window.admit(id.clone());
        }

        if !fresh.is_empty() {
            info!("Notified {} about {} new item(s)", recipient, fresh.len());
        }
        Ok(fresh)
    }

    async fn capture_diagnostic(&self, session: &mut dyn RenderSession) {
        let path = &self.settings.diagnostic_path;
        match session.capture_diagnostic(path).await {
            Ok(()) => debug!("Saved diagnostic image to {}", path.display()),
            Err(e) => warn!("Failed to save diagnostic image: {}", e),
        }
    }

    async fn reset_page(&self, session: &mut dyn RenderSession) {
        if let Err(e) = session.refresh().await {
            warn!("Failed to refresh page: {}", e);
            return;
        }
        if let Err(e) = session.wait_ready(self.settings.ready_timeout).await {
            warn!("Page did not become ready after refresh: {}", e);
        }
    }
}
