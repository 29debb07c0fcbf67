//! Outbound notifications.
//!
//! Delivery is fire-and-forget: a sink reports transport errors, but callers
//! never retry and no receipt is expected.

mod connection;
mod webhook;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::Result;

pub use connection::ConnectionSink;
pub use webhook::WebhookSink;

/// Identity of the person a monitor reports to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Recipient(String);

impl Recipient {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Delivers text messages to recipients.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Send `text` to `recipient`.
    async fn deliver(&self, recipient: &Recipient, text: &str) -> Result<()>;
}

/// Delivers every message to all of its sinks.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl NotificationSink for FanoutSink {
    /// Fails only with the last error, after every sink has been tried.
    async fn deliver(&self, recipient: &Recipient, text: &str) -> Result<()> {
        let mut last_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(recipient, text).await {
                warn!("Delivery to {} failed: {}", recipient, e);
                last_error = Some(e);
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
