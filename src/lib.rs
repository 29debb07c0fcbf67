//! feedwatch - new-listing monitor for marketplace feeds.
//!
//! Polls a rendered listing feed, tells freshly posted listings apart from
//! bumped ones, and notifies each recipient exactly once per new listing.

pub mod config;
pub mod error;
pub mod logging;
pub mod notify;
pub mod render;
pub mod server;
pub mod watch;

pub use config::Config;
pub use error::{FeedwatchError, Result};
pub use notify::{ConnectionSink, FanoutSink, NotificationSink, Recipient, WebhookSink};
pub use render::{ChromeFactory, RenderSession, SessionFactory};
pub use server::{ControlContext, ControlServer};
pub use watch::{
    ItemExtractor, ItemId, ListingEntry, MonitorManager, MonitorState, PollCycle, PollSettings,
    SeenWindow, TickOutcome,
};
