//! Control server.
//!
//! Clients connect over TCP, identify themselves, and issue chat-style
//! commands (`!hi`, `!monitor <link>`, `!stop`). Monitor notifications are
//! pushed back on the same connection.

pub mod command;
mod handler;
mod listener;
mod session;

pub use command::{format_help, parse_command, Command};
pub use handler::{execute, CommandOutcome, GREETING};
pub use listener::{ConnectionPermit, ControlServer};
pub use session::{
    handle_connection, ControlContext, CLOSING_MESSAGE, MAX_LINE_LENGTH, MAX_NAME_LENGTH,
};
