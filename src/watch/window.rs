//! Bounded history of already-notified items.

use std::collections::{HashSet, VecDeque};

use super::item::ItemId;

/// Number of ids remembered. The feed lazy-loads 40 listings per page, so the
/// window always covers at least one full page.
pub const SEEN_WINDOW_CAPACITY: usize = 40;

/// Fixed-capacity, newest-first, deduplicating record of item ids.
#[derive(Debug, Clone, Default)]
pub struct SeenWindow {
    order: VecDeque<ItemId>,
    members: HashSet<ItemId>,
}

impl SeenWindow {
    pub fn new() -> Self {
        Self {
            order: VecDeque::with_capacity(SEEN_WINDOW_CAPACITY),
            members: HashSet::with_capacity(SEEN_WINDOW_CAPACITY),
        }
    }

    /// Check whether `id` is remembered.
    pub fn contains(&self, id: &ItemId) -> bool {
        self.members.contains(id)
    }

    /// Remember `id` as the newest entry.
    ///
    /// A no-op if `id` is already present. When full, the oldest id is
    /// evicted first. Returns `true` if the window changed.
    pub fn admit(&mut self, id: ItemId) -> bool {
        if self.members.contains(&id) {
            return false;
        }
        if self.order.len() >= SEEN_WINDOW_CAPACITY {
            if let Some(oldest) = self.order.pop_back() {
                self.members.remove(&oldest);
            }
        }
        self.members.insert(id.clone());
        self.order.push_front(id);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        SEEN_WINDOW_CAPACITY
    }

    /// Iterate ids from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &ItemId> {
        self.order.iter()
    }
}
