//! Command execution against the monitor manager.

use tracing::info;

use super::command::{format_help, Command};
use crate::notify::Recipient;
use crate::watch::MonitorManager;
use crate::FeedwatchError;

/// Reply to the greeting command.
pub const GREETING: &str = "Hey there";

/// What to send back after a command and whether to hang up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub reply: String,
    pub close: bool,
}

impl CommandOutcome {
    fn reply(text: impl Into<String>) -> Self {
        Self {
            reply: text.into(),
            close: false,
        }
    }
}

/// Execute `command` on behalf of `recipient`.
///
/// Control misuse (already running, not running, bad link) becomes a reply;
/// nothing here fails.
pub async fn execute(
    manager: &MonitorManager,
    recipient: &Recipient,
    command: Command,
) -> CommandOutcome {
    info!("{} issued {}", recipient, command);

    match command {
        Command::Hi => CommandOutcome::reply(GREETING),
        Command::Monitor(link) if link.is_empty() => {
            CommandOutcome::reply("Usage: !monitor <feed link>")
        }
        Command::Monitor(link) => match manager.start(&link, recipient).await {
            Ok(seeded) => CommandOutcome::reply(format!(
                "Now monitoring {link}. Skipping {seeded} listing(s) already posted."
            )),
            Err(e @ FeedwatchError::AlreadyRunning) => CommandOutcome::reply(e.to_string()),
            Err(e) => CommandOutcome::reply(format!("Could not start monitoring: {e}")),
        },
        Command::Stop => match manager.stop(recipient).await {
            Ok(()) => CommandOutcome::reply("Stopping after the current check..."),
            Err(e) => CommandOutcome::reply(e.to_string()),
        },
        Command::Help => CommandOutcome::reply(format_help()),
        Command::Quit => CommandOutcome {
            reply: "Bye.".to_string(),
            close: true,
        },
        Command::Unknown(cmd) => CommandOutcome::reply(format!(
            "Unknown command '{cmd}'. Type !help for a list of commands."
        )),
    }
}
