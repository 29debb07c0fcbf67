//! Feed entries and new-item extraction.
//!
//! A rendered feed entry is either a freshly posted listing or an old listing
//! bumped back to the top. Fresh listings render with a single child element
//! under the age marker; bumped ones carry an extra "bumped" element.

use std::collections::HashSet;
use std::fmt;

/// Canonical identifier of a listing.
///
/// Derived from the listing link by keeping only the canonical item-path
/// prefix, so tracking suffixes never create a second identity for the same
/// listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(String);

impl ItemId {
    /// Build an id from a listing link, keeping at most `prefix_len` characters.
    ///
    /// Returns `None` for an empty link.
    pub fn from_link(link: &str, prefix_len: usize) -> Option<Self> {
        let link = link.trim();
        if link.is_empty() || prefix_len == 0 {
            return None;
        }
        let canonical: String = link.chars().take(prefix_len).collect();
        Some(Self(canonical))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One rendered feed entry as read from the renderer.
///
/// Each read can fail on its own when the page reflows underneath the
/// renderer; a failed read is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingEntry {
    /// Number of element descendants under the entry's age marker.
    pub child_count: Option<usize>,
    /// Link target of the enclosing anchor.
    pub link: Option<String>,
}

impl ListingEntry {
    pub fn new(child_count: usize, link: impl Into<String>) -> Self {
        Self {
            child_count: Some(child_count),
            link: Some(link.into()),
        }
    }

    /// Whether this entry is a newly posted listing.
    pub fn is_fresh(&self) -> bool {
        self.child_count == Some(1)
    }

    /// The entry's item id, if it is fresh and its link could be read.
    pub fn fresh_item_id(&self, prefix_len: usize) -> Option<ItemId> {
        if !self.is_fresh() {
            return None;
        }
        self.link
            .as_deref()
            .and_then(|link| ItemId::from_link(link, prefix_len))
    }
}

/// Extracts the ids of newly posted listings from a feed snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ItemExtractor {
    prefix_len: usize,
}

impl ItemExtractor {
    pub fn new(prefix_len: usize) -> Self {
        Self { prefix_len }
    }

    /// Return the distinct ids of all fresh entries, in feed order.
    ///
    /// Bumped entries and entries with unreadable fields are skipped without
    /// failing the batch.
    pub fn extract(&self, snapshot: &[ListingEntry]) -> Vec<ItemId> {
        let mut seen = HashSet::new();
        snapshot
            .iter()
            .filter_map(|entry| entry.fresh_item_id(self.prefix_len))
            .filter(|id| seen.insert(id.clone()))
            .collect()
    }
}
