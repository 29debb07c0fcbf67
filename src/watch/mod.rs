//! Feed watching: new-item extraction, seen-item history, poll ticks and
//! the per-recipient monitors that drive them.

mod cycle;
mod item;
mod monitor;
mod window;

pub use cycle::{new_item_message, FailureKind, PollCycle, PollSettings, TickOutcome};
pub use item::{ItemExtractor, ItemId, ListingEntry};
pub use monitor::{validate_feed_address, MonitorManager, MonitorState, STOPPED_MESSAGE};
pub use window::{SeenWindow, SEEN_WINDOW_CAPACITY};
