//! One control connection: handshake, then a command loop.
//!
//! Replies and monitor notifications share a single outbound queue, so a
//! notification never interleaves with half a reply.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::command::parse_command;
use super::handler::execute;
use crate::notify::{ConnectionSink, Recipient};
use crate::watch::MonitorManager;

/// Longest accepted recipient name.
pub const MAX_NAME_LENGTH: usize = 32;

/// Longest accepted input line in bytes, terminator included.
pub const MAX_LINE_LENGTH: usize = 4096;

/// Sent to connected clients when the server closes.
pub const CLOSING_MESSAGE: &str = "Server is shutting down.";

/// Everything a control connection needs.
#[derive(Clone)]
pub struct ControlContext {
    pub manager: Arc<MonitorManager>,
    pub connections: Arc<ConnectionSink>,
    /// Expected first line; empty disables the check.
    pub token: String,
}

/// Why a recipient name was refused.
fn check_name(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        Some("A name is required.")
    } else if name.chars().count() > MAX_NAME_LENGTH {
        Some("That name is too long.")
    } else if name.chars().any(char::is_whitespace) {
        Some("Names cannot contain spaces.")
    } else {
        None
    }
}

/// Read one line of at most [`MAX_LINE_LENGTH`] bytes.
///
/// A longer line is an `InvalidData` error; the rest of it is never buffered.
async fn read_line<R>(reader: &mut R) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let read = (&mut *reader)
        .take(MAX_LINE_LENGTH as u64)
        .read_until(b'\n', &mut buf)
        .await?;
    if read == 0 {
        return Ok(None);
    }
    if read == MAX_LINE_LENGTH && !buf.ends_with(b"\n") {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "line too long",
        ));
    }

    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    String::from_utf8(buf)
        .map(Some)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// Wait for the next line, giving up when the client leaves or the server closes.
async fn next_input<R>(
    reader: &mut R,
    closing: &mut watch::Receiver<bool>,
    addr: SocketAddr,
) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    if *closing.borrow() {
        return None;
    }
    tokio::select! {
        line = read_line(reader) => match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Dropping control connection from {}: {}", addr, e);
                None
            }
        },
        _ = closing.changed() => None,
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(message) = rx.recv().await {
        let mut data = message.replace('\n', "\r\n");
        data.push_str("\r\n");
        if writer.write_all(data.as_bytes()).await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Serve one control connection until the client quits or disconnects.
///
/// `closing` turning `true` ends the connection the next time it waits for
/// input; a command already being executed runs to completion first.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    ctx: ControlContext,
    mut closing: watch::Receiver<bool>,
) {
    let connection_id = Uuid::new_v4();
    debug!("Control connection {} from {}", connection_id, addr);

    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let writer_task = tokio::spawn(write_loop(writer, rx));

    macro_rules! hang_up {
        () => {{
            drop(tx);
            let _ = writer_task.await;
            return;
        }};
    }
    macro_rules! send {
        ($msg:expr) => {
            if tx.send($msg.into()).is_err() {
                return;
            }
        };
    }

    if !ctx.token.is_empty() {
        send!("Token:");
        match next_input(&mut reader, &mut closing, addr).await {
            Some(line) if line.trim() == ctx.token => {}
            Some(_) => {
                warn!("Rejected control connection from {}: bad token", addr);
                send!("Access denied.");
                hang_up!();
            }
            None => hang_up!(),
        }
    }

    send!("Name:");
    let name = match next_input(&mut reader, &mut closing, addr).await {
        Some(line) => line.trim().to_string(),
        None => hang_up!(),
    };
    if let Some(reason) = check_name(&name) {
        send!(reason);
        hang_up!();
    }

    let recipient = Recipient::new(name);
    if ctx.connections.is_connected(&recipient).await {
        info!("{} logged in again; the earlier connection stops receiving", recipient);
    }
    ctx.connections
        .register(recipient.clone(), connection_id, tx.clone())
        .await;
    info!("{} connected from {}", recipient, addr);
    send!(format!(
        "Welcome, {recipient}. Type !help for a list of commands."
    ));

    while let Some(line) = next_input(&mut reader, &mut closing, addr).await {
        let Some(command) = parse_command(&line) else {
            continue;
        };
        let outcome = execute(&ctx.manager, &recipient, command).await;
        if tx.send(outcome.reply).is_err() || outcome.close {
            break;
        }
    }

    if *closing.borrow() {
        let _ = tx.send(CLOSING_MESSAGE.to_string());
    }
    ctx.connections.unregister(&recipient, connection_id).await;
    drop(tx);
    let _ = writer_task.await;
    info!("{} disconnected", recipient);
}
