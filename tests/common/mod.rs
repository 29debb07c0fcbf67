//! Test helpers for monitor and control-server tests.
//!
//! Provides a scripted in-memory renderer, a recording notification sink and
//! small polling utilities.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::{sleep, timeout, Instant};

use feedwatch::{
    FeedwatchError, ListingEntry, NotificationSink, PollSettings, Recipient, RenderSession,
    Result, SessionFactory,
};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A feed link whose first 41 characters are the listing id.
pub fn listing_link(n: u32) -> String {
    format!("https://www.grailed.com/listings/{n:08}-vintage-jacket?feed=1")
}

/// The id a notification carries for `listing_link(n)`.
pub fn listing_id(n: u32) -> String {
    listing_link(n)[..41].to_string()
}

/// A page of freshly posted listings.
pub fn fresh_page(ids: impl IntoIterator<Item = u32>) -> Page {
    Page::Entries(
        ids.into_iter()
            .map(|n| ListingEntry::new(1, listing_link(n)))
            .collect(),
    )
}

/// Fast settings for tests.
pub fn test_settings() -> PollSettings {
    PollSettings {
        tick_interval: Duration::from_millis(20),
        fetch_timeout: Duration::from_millis(100),
        ready_timeout: Duration::from_millis(100),
        priming_settle: Duration::ZERO,
        refresh_settle: Duration::ZERO,
        diagnostic_path: PathBuf::from("target/test-diagnostic.png"),
        ..PollSettings::default()
    }
}

/// What one snapshot read returns.
#[derive(Debug, Clone)]
pub enum Page {
    Entries(Vec<ListingEntry>),
    Timeout,
    Stale,
}

/// Counters of everything the renderer was asked to do.
#[derive(Debug, Default, Clone)]
pub struct RendererLog {
    pub opened: usize,
    pub released: usize,
    pub navigations: Vec<String>,
    pub scripts: usize,
    pub refreshes: usize,
    pub ready_waits: usize,
    pub diagnostics: usize,
    pub snapshots: usize,
}

/// Holds callers back until opened.
#[derive(Default)]
pub struct Gate {
    open: AtomicBool,
    entered: AtomicUsize,
    notify: Notify,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wait until the gate is opened.
    pub async fn pass(&self) {
        self.entered.fetch_add(1, Ordering::SeqCst);
        loop {
            let opened = self.notify.notified();
            if self.open.load(Ordering::SeqCst) {
                return;
            }
            opened.await;
        }
    }

    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// How many callers reached the gate so far.
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }
}

/// Shared page queue and counters behind a [`ScriptedRenderer`].
#[derive(Default)]
pub struct Script {
    pages: Mutex<VecDeque<Page>>,
    log: Mutex<RendererLog>,
    fail_open: AtomicBool,
    navigate_gate: Mutex<Option<Arc<Gate>>>,
    snapshot_gate: Mutex<Option<Arc<Gate>>>,
}

impl Script {
    fn record(&self, update: impl FnOnce(&mut RendererLog)) {
        update(&mut self.log.lock().unwrap());
    }

    /// Serve the next page. The last page repeats forever.
    fn next_page(&self) -> Page {
        let mut pages = self.pages.lock().unwrap();
        if pages.len() > 1 {
            pages.pop_front().unwrap_or(Page::Entries(Vec::new()))
        } else {
            pages.front().cloned().unwrap_or(Page::Entries(Vec::new()))
        }
    }

    fn peek_page(&self) -> Option<Page> {
        self.pages.lock().unwrap().front().cloned()
    }

    async fn pass(gate: &Mutex<Option<Arc<Gate>>>) {
        let gate = gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }
    }
}

/// In-memory renderer serving a fixed sequence of pages.
pub struct ScriptedRenderer {
    script: Arc<Script>,
}

impl ScriptedRenderer {
    pub fn new(pages: impl IntoIterator<Item = Page>) -> Arc<Self> {
        let script = Script {
            pages: Mutex::new(pages.into_iter().collect()),
            ..Script::default()
        };
        Arc::new(Self {
            script: Arc::new(script),
        })
    }

    /// A renderer that cannot open sessions.
    pub fn unavailable() -> Arc<Self> {
        let renderer = Self::new([]);
        renderer.script.fail_open.store(true, Ordering::SeqCst);
        renderer
    }

    pub fn push_page(&self, page: Page) {
        self.script.pages.lock().unwrap().push_back(page);
    }

    pub fn log(&self) -> RendererLog {
        self.script.log.lock().unwrap().clone()
    }

    /// Make every navigation wait at `gate`.
    pub fn hold_navigation(&self, gate: Arc<Gate>) {
        *self.script.navigate_gate.lock().unwrap() = Some(gate);
    }

    /// Make every snapshot read wait at `gate` after it is counted.
    pub fn hold_snapshots(&self, gate: Arc<Gate>) {
        *self.script.snapshot_gate.lock().unwrap() = Some(gate);
    }
}

#[async_trait]
impl SessionFactory for ScriptedRenderer {
    async fn open(&self) -> Result<Box<dyn RenderSession>> {
        if self.script.fail_open.load(Ordering::SeqCst) {
            return Err(FeedwatchError::SessionAcquisition(
                "renderer unavailable".to_string(),
            ));
        }
        self.script.record(|log| log.opened += 1);
        Ok(Box::new(ScriptedSession {
            script: Arc::clone(&self.script),
        }))
    }
}

pub struct ScriptedSession {
    script: Arc<Script>,
}

#[async_trait]
impl RenderSession for ScriptedSession {
    async fn navigate(&mut self, address: &str) -> Result<()> {
        self.script
            .record(|log| log.navigations.push(address.to_string()));
        Script::pass(&self.script.navigate_gate).await;
        Ok(())
    }

    async fn execute_script(&mut self, _script: &str) -> Result<serde_json::Value> {
        self.script.record(|log| log.scripts += 1);
        Ok(serde_json::Value::Null)
    }

    async fn wait_for_presence(&mut self, selector: &str, _timeout: Duration) -> Result<usize> {
        if let Some(Page::Timeout) = self.script.peek_page() {
            self.script.next_page();
            return Err(FeedwatchError::RenderTimeout(format!(
                "no element matched {selector}"
            )));
        }
        Ok(1)
    }

    async fn collect_entries(&mut self, _selector: &str) -> Result<Vec<ListingEntry>> {
        self.script.record(|log| log.snapshots += 1);
        Script::pass(&self.script.snapshot_gate).await;
        match self.script.next_page() {
            Page::Entries(entries) => Ok(entries),
            Page::Stale => Err(FeedwatchError::StaleReference("detached".to_string())),
            Page::Timeout => Err(FeedwatchError::RenderTimeout("late".to_string())),
        }
    }

    async fn refresh(&mut self) -> Result<()> {
        self.script.record(|log| log.refreshes += 1);
        Ok(())
    }

    async fn capture_diagnostic(&mut self, _path: &Path) -> Result<()> {
        self.script.record(|log| log.diagnostics += 1);
        Ok(())
    }

    async fn release(self: Box<Self>) -> Result<()> {
        self.script.record(|log| log.released += 1);
        Ok(())
    }

    async fn wait_ready(&mut self, _timeout: Duration) -> Result<()> {
        self.script.record(|log| log.ready_waits += 1);
        Ok(())
    }
}

/// Sink that records every delivery.
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<(Recipient, String)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages_for(&self, recipient: &Recipient) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| r == recipient)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn count_containing(&self, recipient: &Recipient, needle: &str) -> usize {
        self.messages_for(recipient)
            .iter()
            .filter(|text| text.contains(needle))
            .count()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, recipient: &Recipient, text: &str) -> Result<()> {
        self.messages
            .lock()
            .unwrap()
            .push((recipient.clone(), text.to_string()));
        Ok(())
    }
}

/// Poll `check` until it returns true or the default timeout elapses.
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + DEFAULT_TIMEOUT;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Run `fut` with the default timeout, panicking if it takes longer.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    timeout(DEFAULT_TIMEOUT, fut)
        .await
        .expect("operation timed out")
}
