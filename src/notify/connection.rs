//! Delivery to live control connections.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::{NotificationSink, Recipient};
use crate::Result;

struct Outbox {
    connection_id: Uuid,
    sender: mpsc::UnboundedSender<String>,
}

/// Routes messages to the control connection a recipient is logged in on.
///
/// Messages for a recipient without a live connection are dropped.
#[derive(Default)]
pub struct ConnectionSink {
    outboxes: RwLock<HashMap<Recipient, Outbox>>,
}

impl ConnectionSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `recipient`'s messages to `sender`, replacing an older connection.
    pub async fn register(
        &self,
        recipient: Recipient,
        connection_id: Uuid,
        sender: mpsc::UnboundedSender<String>,
    ) {
        debug!("Connection {} now receives for {}", connection_id, recipient);
        self.outboxes.write().await.insert(
            recipient,
            Outbox {
                connection_id,
                sender,
            },
        );
    }

    /// Stop routing to `connection_id`.
    ///
    /// Ignored if the recipient has since logged in on another connection.
    pub async fn unregister(&self, recipient: &Recipient, connection_id: Uuid) {
        let mut outboxes = self.outboxes.write().await;
        if outboxes
            .get(recipient)
            .is_some_and(|outbox| outbox.connection_id == connection_id)
        {
            outboxes.remove(recipient);
        }
    }

    pub async fn is_connected(&self, recipient: &Recipient) -> bool {
        self.outboxes.read().await.contains_key(recipient)
    }
}

#[async_trait]
impl NotificationSink for ConnectionSink {
    async fn deliver(&self, recipient: &Recipient, text: &str) -> Result<()> {
        let outboxes = self.outboxes.read().await;
        match outboxes.get(recipient) {
            Some(outbox) => {
                if outbox.sender.send(text.to_string()).is_err() {
                    debug!("Connection for {} closed, message dropped", recipient);
                }
            }
            None => debug!("{} is offline, message dropped", recipient),
        }
        Ok(())
    }
}
