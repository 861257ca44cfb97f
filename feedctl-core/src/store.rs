//! In-memory feed arena.
//!
//! Feeds live in slots addressed by a stable index. Callers outside the
//! controller hold indices, never feeds: after a merge the slot content is
//! replaced and an index holder simply reads the slot again.
//!
//! Two levels of locking: the outer `RwLock` guards the *shape* of the arena
//! (length and order) and is only write-locked when the whole feed list is
//! replaced; each slot has its own `Mutex` for its content. A reload holds
//! the outer lock shared for its whole duration, so the arena can't be
//! resized or reordered while partitions are outstanding.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::SortOrder;
use crate::feed::Feed;

pub(crate) type Slot = Mutex<Feed>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnreadCounts {
    pub feeds: usize,
    pub articles: usize,
}

impl UnreadCounts {
    /// `(feed delta, article delta)` going from `before` to `self`.
    pub fn delta_since(&self, before: &UnreadCounts) -> (i64, i64) {
        (
            self.feeds as i64 - before.feeds as i64,
            self.articles as i64 - before.articles as i64,
        )
    }
}

#[derive(Debug, Default)]
pub struct FeedStore {
    slots: RwLock<Vec<Slot>>,
}

pub(crate) fn lock_slot(slot: &Slot) -> MutexGuard<'_, Feed> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl FeedStore {
    pub fn new(feeds: Vec<Feed>) -> Self {
        Self {
            slots: RwLock::new(feeds.into_iter().map(Mutex::new).collect()),
        }
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Vec<Slot>> {
        self.slots.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Vec<Slot>> {
        self.slots.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn with_feed<R>(&self, index: usize, f: impl FnOnce(&Feed) -> R) -> Option<R> {
        let slots = self.read();
        slots.get(index).map(|slot| f(&lock_slot(slot)))
    }

    pub fn with_feed_mut<R>(&self, index: usize, f: impl FnOnce(&mut Feed) -> R) -> Option<R> {
        let slots = self.read();
        slots.get(index).map(|slot| f(&mut lock_slot(slot)))
    }

    /// Copy of the feed currently at `index`.
    pub fn snapshot(&self, index: usize) -> Option<Feed> {
        self.with_feed(index, Feed::clone)
    }

    pub fn urls(&self) -> Vec<String> {
        self.read()
            .iter()
            .map(|slot| lock_slot(slot).url.clone())
            .collect()
    }

    pub fn index_of(&self, url: &str) -> Option<usize> {
        self.read().iter().position(|slot| lock_slot(slot).url == url)
    }

    pub fn for_each_mut(&self, mut f: impl FnMut(&mut Feed)) {
        for slot in self.read().iter() {
            f(&mut lock_slot(slot));
        }
    }

    /// A feed counts as unread when it has at least one unread item.
    pub fn unread_numbers(&self) -> UnreadCounts {
        let mut counts = UnreadCounts::default();
        for slot in self.read().iter() {
            let unread = lock_slot(slot).unread_item_count();
            if unread > 0 {
                counts.feeds += 1;
                counts.articles += unread;
            }
        }
        counts
    }

    /// Replaces the whole arena. Indices handed out before are invalid after.
    pub fn replace_all(&self, feeds: Vec<Feed>) {
        *self.write() = feeds.into_iter().map(Mutex::new).collect();
    }

    /// Rebuilds the arena from its current feeds under a single write lock.
    pub(crate) fn rebuild(&self, f: impl FnOnce(Vec<Feed>) -> Vec<Feed>) {
        let mut slots = self.write();
        let old = std::mem::take(&mut *slots)
            .into_iter()
            .map(|slot| slot.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner()))
            .collect();
        *slots = f(old).into_iter().map(Mutex::new).collect();
    }
}

/// Swaps `fresh` into `slot`, clearing the outgoing feed's items first so no
/// item outlives its feed.
pub(crate) fn swap_slot(slot: &Slot, mut fresh: Feed) {
    fresh.reattach_items();
    let mut current = lock_slot(slot);
    current.items.clear();
    *current = fresh;
}

/// Stable sort by first tag, case-insensitive; untagged feeds go last and
/// keep their relative order.
pub fn sort_feeds(feeds: &mut [Feed], order: SortOrder) {
    match order {
        SortOrder::None => {}
        SortOrder::FirstTag => feeds.sort_by_cached_key(firsttag_key),
    }
}

fn firsttag_key(feed: &Feed) -> (bool, String) {
    let tag = feed.first_tag();
    (tag.is_empty(), tag.to_lowercase())
}
