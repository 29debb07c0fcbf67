//! Long-running feed monitors, one per recipient.
//!
//! A monitor moves through `Idle -> Starting -> Running -> Stopping -> Idle`.
//! Starting opens a rendering session and primes a fresh [`SeenWindow`]
//! from the current page without notifying. Running ticks a [`PollCycle`]
//! at a fixed interval on a dedicated task. Stopping is cooperative: the
//! stop signal is observed between ticks, after which the session is
//! released and the slot is cleared.
//!
//! Once [`MonitorManager::shutdown`] has begun the manager is closed: new
//! starts are refused, and a start that finishes priming afterwards releases
//! its session instead of spawning.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::{oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use super::cycle::{PollCycle, PollSettings, TickOutcome};
use super::window::SeenWindow;
use crate::notify::{NotificationSink, Recipient};
use crate::render::{RenderSession, SessionFactory};
use crate::{FeedwatchError, Result};

/// Scrolls to the end of the page so the feed lazy-loads its next page.
const SCROLL_TO_BOTTOM_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight);";
/// Zooming out makes the feed materialize more entries.
const ZOOM_OUT_SCRIPT: &str = "document.body.style.zoom='50%';";
const SCROLL_NEAR_BOTTOM_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight - 100);";
const SCROLL_TO_TOP_SCRIPT: &str = "window.scrollTo(0, 0);";

/// Message sent when a monitor has shut down.
pub const STOPPED_MESSAGE: &str = "Monitoring stopped.";

/// Lifecycle state of a recipient's monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Check that `address` is an absolute http(s) URL.
pub fn validate_feed_address(address: &str) -> Result<Url> {
    let url = Url::parse(address.trim())
        .map_err(|e| FeedwatchError::Validation(format!("invalid feed link: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(FeedwatchError::Validation(format!(
            "unsupported scheme '{scheme}' in feed link"
        ))),
    }
}

struct Slot {
    run_id: Uuid,
    state: MonitorState,
    feed_address: String,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Registry {
    slots: HashMap<Recipient, Slot>,
    closed: bool,
}

#[derive(Default)]
struct Shared {
    registry: Mutex<Registry>,
    /// Fired whenever a starting slot goes to running or away.
    settled: Notify,
}

/// Owns every monitor in the process.
///
/// Monitor tasks only hold a weak reference back, so dropping the manager
/// drops every stop sender and the tasks wind down on their own.
pub struct MonitorManager {
    factory: Arc<dyn SessionFactory>,
    sink: Arc<dyn NotificationSink>,
    cycle: PollCycle,
    shared: Arc<Shared>,
}

impl MonitorManager {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        sink: Arc<dyn NotificationSink>,
        settings: PollSettings,
    ) -> Self {
        let cycle = PollCycle::new(Arc::new(settings), Arc::clone(&sink));
        Self {
            factory,
            sink,
            cycle,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Start monitoring `feed_address` for `recipient`.
    ///
    /// Returns the number of listings seeded as already seen. Fails with
    /// `AlreadyRunning` if the recipient has a monitor in any non-idle state.
    /// If the session cannot be opened or primed, nothing is left behind.
    /// Fails with `ShuttingDown` once [`shutdown`](Self::shutdown) has begun.
    pub async fn start(&self, feed_address: &str, recipient: &Recipient) -> Result<usize> {
        let url = validate_feed_address(feed_address)?;
        let run_id = Uuid::new_v4();

        {
            let mut registry = self.shared.registry.lock().await;
            if registry.closed {
                return Err(FeedwatchError::ShuttingDown);
            }
            if registry.slots.contains_key(recipient) {
                return Err(FeedwatchError::AlreadyRunning);
            }
            registry.slots.insert(
                recipient.clone(),
                Slot {
                    run_id,
                    state: MonitorState::Starting,
                    feed_address: url.to_string(),
                    stop_tx: None,
                    task: None,
                },
            );
        }

        let (session, window) = match self.open_and_prime(&url).await {
            Ok(primed) => primed,
            Err(e) => {
                self.settle(recipient, run_id).await;
                warn!("Failed to start monitor for {}: {}", recipient, e);
                return Err(e);
            }
        };
        let seeded = window.len();

        let mut registry = self.shared.registry.lock().await;
        let closed = registry.closed;
        let owned = registry
            .slots
            .get(recipient)
            .is_some_and(|slot| slot.run_id == run_id);
        if closed || !owned {
            drop(registry);
            info!("Discarding monitor {} for {}: shutting down", run_id, recipient);
            if let Err(e) = session.release().await {
                warn!("Failed to release session of discarded monitor: {}", e);
            }
            self.settle(recipient, run_id).await;
            return Err(FeedwatchError::ShuttingDown);
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let run = MonitorRun {
            run_id,
            recipient: recipient.clone(),
            session,
            window,
            cycle: self.cycle.clone(),
            sink: Arc::clone(&self.sink),
            stop_rx,
            shared: Arc::downgrade(&self.shared),
        };
        if let Some(slot) = registry.slots.get_mut(recipient) {
            slot.state = MonitorState::Running;
            slot.stop_tx = Some(stop_tx);
            slot.task = Some(tokio::spawn(run.run()));
        }
        drop(registry);
        self.shared.settled.notify_waiters();

        info!(
            "Monitor {} started for {} on {} ({} listing(s) seeded)",
            run_id, recipient, url, seeded
        );
        Ok(seeded)
    }

    /// Ask `recipient`'s running monitor to stop after its current tick.
    pub async fn stop(&self, recipient: &Recipient) -> Result<()> {
        let mut registry = self.shared.registry.lock().await;
        let slot = match registry.slots.get_mut(recipient) {
            Some(slot) if slot.state == MonitorState::Running => slot,
            _ => return Err(FeedwatchError::NotRunning),
        };

        slot.state = MonitorState::Stopping;
        if let Some(stop_tx) = slot.stop_tx.take() {
            // The task may already be gone; the slot is cleared either way.
            let _ = stop_tx.send(());
        }
        info!("Stop requested for monitor {} ({})", slot.run_id, recipient);
        Ok(())
    }

    /// Current lifecycle state for `recipient`.
    pub async fn state(&self, recipient: &Recipient) -> MonitorState {
        self.shared
            .registry
            .lock()
            .await
            .slots
            .get(recipient)
            .map(|slot| slot.state)
            .unwrap_or(MonitorState::Idle)
    }

    /// Feed address monitored for `recipient`, if any.
    pub async fn feed_address(&self, recipient: &Recipient) -> Option<String> {
        self.shared
            .registry
            .lock()
            .await
            .slots
            .get(recipient)
            .map(|slot| slot.feed_address.clone())
    }

    /// Number of monitors not yet back to idle.
    pub async fn active_count(&self) -> usize {
        self.shared.registry.lock().await.slots.len()
    }

    /// Stop every monitor and wait until all sessions are released.
    ///
    /// Monitors still starting are waited for as well; they see the closed
    /// manager, release their session and fail with `ShuttingDown`.
    pub async fn shutdown(&self) {
        loop {
            // Registered before the scan so no resolution in between is missed.
            let settled = self.shared.settled.notified();

            let (tasks, starting) = {
                let mut registry = self.shared.registry.lock().await;
                registry.closed = true;
                let mut starting = 0;
                let tasks: Vec<JoinHandle<()>> = registry
                    .slots
                    .values_mut()
                    .filter_map(|slot| {
                        if slot.state == MonitorState::Starting {
                            starting += 1;
                        }
                        if let Some(stop_tx) = slot.stop_tx.take() {
                            let _ = stop_tx.send(());
                            slot.state = MonitorState::Stopping;
                        }
                        slot.task.take()
                    })
                    .collect();
                (tasks, starting)
            };

            if tasks.is_empty() && starting == 0 {
                break;
            }
            info!(
                "Waiting for {} monitor(s) to stop and {} to finish starting",
                tasks.len(),
                starting
            );
            for task in tasks {
                if let Err(e) = task.await {
                    error!("Monitor task failed: {}", e);
                }
            }
            if starting > 0 {
                settled.await;
            }
        }
    }

    /// Drop a slot that never reached running and wake any shutdown waiting on it.
    async fn settle(&self, recipient: &Recipient, run_id: Uuid) {
        {
            let mut registry = self.shared.registry.lock().await;
            if registry
                .slots
                .get(recipient)
                .is_some_and(|slot| slot.run_id == run_id)
            {
                registry.slots.remove(recipient);
            }
        }
        self.shared.settled.notify_waiters();
    }

    async fn open_and_prime(&self, url: &Url) -> Result<(Box<dyn RenderSession>, SeenWindow)> {
        let mut session = self.factory.open().await?;
        match self.prime(session.as_mut(), url).await {
            Ok(window) => Ok((session, window)),
            Err(e) => {
                if let Err(release_err) = session.release().await {
                    warn!("Failed to release session after priming error: {}", release_err);
                }
                Err(e)
            }
        }
    }

    /// Load the feed and seed a window with everything already listed.
    async fn prime(&self, session: &mut dyn RenderSession, url: &Url) -> Result<SeenWindow> {
        let settings = self.cycle.settings();

        session.navigate(url.as_str()).await?;
        session.execute_script(SCROLL_TO_BOTTOM_SCRIPT).await?;
        session.execute_script(ZOOM_OUT_SCRIPT).await?;
        session.execute_script(SCROLL_NEAR_BOTTOM_SCRIPT).await?;
        sleep(settings.priming_settle).await;

        let snapshot = self.cycle.fetch_snapshot(session).await?;
        let mut window = SeenWindow::new();
        // Oldest on the page first, so the top of the feed survives eviction.
        for id in self.cycle.extractor().extract(&snapshot).into_iter().rev() {
            window.admit(id);
        }
        debug!(
            "Primed window with {} of {} entries",
            window.len(),
            snapshot.len()
        );

        session.execute_script(SCROLL_TO_TOP_SCRIPT).await?;
        session.refresh().await?;
        sleep(settings.refresh_settle).await;
        Ok(window)
    }
}

/// State owned by one monitor task.
struct MonitorRun {
    run_id: Uuid,
    recipient: Recipient,
    session: Box<dyn RenderSession>,
    window: SeenWindow,
    cycle: PollCycle,
    sink: Arc<dyn NotificationSink>,
    stop_rx: oneshot::Receiver<()>,
    shared: Weak<Shared>,
}

impl MonitorRun {
    async fn run(mut self) {
        let mut timer = interval(self.cycle.settings().tick_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut self.stop_rx => break,
                _ = timer.tick() => {}
            }
            if self.stop_requested() {
                break;
            }

            let outcome = self
                .cycle
                .tick(self.session.as_mut(), &mut self.window, &self.recipient)
                .await;
            match outcome {
                TickOutcome::NewItemsFound(ids) => {
                    debug!("Monitor {}: {} new item(s)", self.run_id, ids.len())
                }
                TickOutcome::NoNewItems => debug!("Monitor {}: no new items", self.run_id),
                TickOutcome::TransientFailure(kind) => {
                    debug!("Monitor {}: tick failed ({:?})", self.run_id, kind)
                }
            }
        }

        self.finish().await;
    }

    /// Whether a stop arrived (or the manager went away) during the last wait.
    fn stop_requested(&mut self) -> bool {
        !matches!(
            self.stop_rx.try_recv(),
            Err(oneshot::error::TryRecvError::Empty)
        )
    }

    async fn finish(self) {
        let MonitorRun {
            run_id,
            recipient,
            session,
            sink,
            shared,
            ..
        } = self;

        if let Err(e) = session.release().await {
            warn!("Monitor {}: failed to release session: {}", run_id, e);
        }

        if let Some(shared) = shared.upgrade() {
            let mut registry = shared.registry.lock().await;
            if registry
                .slots
                .get(&recipient)
                .is_some_and(|slot| slot.run_id == run_id)
            {
                registry.slots.remove(&recipient);
            }
        }

        info!("Monitor {} for {} stopped", run_id, recipient);
        if let Err(e) = sink.deliver(&recipient, STOPPED_MESSAGE).await {
            debug!("Failed to send stop notice to {}: {}", recipient, e);
        }
    }
}
