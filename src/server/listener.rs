//! TCP listener for the control server.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::config::ControlConfig;
use crate::{FeedwatchError, Result};

/// Pause after a failed accept, so a persistent error does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts control connections, bounded by a connection limit.
pub struct ControlServer {
    listener: TcpListener,
    semaphore: Arc<Semaphore>,
    max_connections: usize,
}

impl ControlServer {
    /// Bind to the configured address.
    pub async fn bind(config: &ControlConfig) -> Result<Self> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        info!("Control server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            semaphore: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Number of connections currently holding a slot.
    pub fn active_connections(&self) -> usize {
        self.max_connections - self.semaphore.available_permits()
    }

    /// Wait for a free slot, then accept the next connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit)> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| FeedwatchError::Io(std::io::Error::other("semaphore closed")))?;

        let (stream, addr) = self.listener.accept().await?;
        debug!(
            "Accepted control connection from {} ({}/{} in use)",
            addr,
            self.active_connections(),
            self.max_connections
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    /// Accept connections until `shutdown` resolves, running `handler` on its
    /// own task for each.
    ///
    /// Handlers receive a watch that flips to `true` when the server closes.
    /// They are expected to finish what they are doing and return; `run`
    /// waits for all of them before it returns.
    pub async fn run<F, Fut, S>(self, handler: F, shutdown: S)
    where
        F: Fn(TcpStream, SocketAddr, watch::Receiver<bool>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
        S: Future<Output = ()>,
    {
        let handler = Arc::new(handler);
        let (closing_tx, closing_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            while let Some(finished) = connections.try_join_next() {
                if let Err(e) = finished {
                    error!("Control connection task failed: {}", e);
                }
            }

            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.accept() => match accepted {
                    Ok((stream, addr, permit)) => {
                        let handler = Arc::clone(&handler);
                        let closing = closing_rx.clone();
                        connections.spawn(async move {
                            handler(stream, addr, closing).await;
                            drop(permit);
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept control connection: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        info!(
            "Control server closing; waiting for {} connection(s)",
            connections.len()
        );
        let _ = closing_tx.send(true);
        while let Some(finished) = connections.join_next().await {
            if let Err(e) = finished {
                error!("Control connection task failed: {}", e);
            }
        }
        info!("Control server stopped");
    }
}

/// Holds one connection slot until dropped.
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}
