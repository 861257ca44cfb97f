//! Reload scheduler.
//!
//! `reload_all` splits the store's index range into contiguous partitions,
//! one per worker, and runs them under `std::thread::scope`: every spawned
//! worker is joined before the call returns and the calling thread takes the
//! last partition itself. The store's outer lock is held shared for the
//! whole batch, and each worker gets a disjoint sub-slice of slots, so no
//! slot is touched by two workers. Workers hand back the indexes they
//! merged; the view hears about them only after the outer lock is dropped,
//! so a view may read the store from its callback.

use std::ops::Range;
use std::sync::{MutexGuard, TryLockError};
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::controller::{censor_url, Controller};
use crate::error::{FetchError, ReloadError};
use crate::store::{lock_slot, Slot, UnreadCounts};

/// Proof that the caller holds the controller's reload lock.
pub struct ReloadGuard<'a> {
    _held: MutexGuard<'a, ()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadReport {
    pub before: UnreadCounts,
    pub after: UnreadCounts,
    pub notified: bool,
}

/// Splits `0..len` into at most `parts` contiguous, non-empty ranges whose
/// sizes differ by at most one; the earlier ranges take the remainder.
pub fn partition_indexes(len: usize, parts: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let parts = parts.clamp(1, len);
    let base = len / parts;
    let remainder = len % parts;

    let mut start = 0;
    (0..parts)
        .map(|i| {
            let size = base + usize::from(i < remainder);
            let range = start..start + size;
            start += size;
            range
        })
        .collect()
}

fn progress_prefix(position: usize, total: usize) -> String {
    if total > 0 {
        format!("({position}/{total}) ")
    } else {
        String::new()
    }
}

impl Controller {
    /// Takes the reload lock without waiting. A second caller gets
    /// [`ReloadError::Busy`] while a reload is running.
    pub fn try_lock_reload(&self) -> Result<ReloadGuard<'_>, ReloadError> {
        match self.reload_lock.try_lock() {
            Ok(held) => Ok(ReloadGuard { _held: held }),
            Err(TryLockError::Poisoned(poisoned)) => Ok(ReloadGuard {
                _held: poisoned.into_inner(),
            }),
            Err(TryLockError::WouldBlock) => {
                debug!("reload already in progress");
                Err(ReloadError::Busy)
            }
        }
    }

    /// Fetches and merges the feed at `index`. Errors are reported through
    /// the view's status line; the feed keeps its previous content.
    pub fn reload_one(&self, _guard: &ReloadGuard<'_>, index: usize, total: usize, unattended: bool) {
        let slots = self.store.read();
        let Some(slot) = slots.get(index) else {
            drop(slots);
            warn!(index, "reload of a feed index that doesn't exist");
            self.view.show_error("Error: invalid feed!");
            return;
        };
        let merged = self.reload_slot(slot, index, total, unattended);
        drop(slots);
        if merged {
            self.view.itemlist_changed(index);
        }
    }

    /// Reloads the feeds in `range`, in ascending order, on this thread.
    pub fn reload_range(
        &self,
        _guard: &ReloadGuard<'_>,
        range: Range<usize>,
        total: usize,
        unattended: bool,
    ) {
        let slots = self.store.read();
        let end = range.end.min(slots.len());
        let start = range.start.min(end);
        let merged = self.reload_slots(&slots[start..end], start, total, unattended);
        drop(slots);
        self.signal_itemlists(&merged);
    }

    /// Reloads a single feed on behalf of an interactive caller.
    pub fn reload(&self, index: usize, unattended: bool) -> Result<(), ReloadError> {
        let guard = self.try_lock_reload()?;
        if index >= self.store.len() {
            self.view.show_error("Error: invalid feed!");
            return Err(ReloadError::InvalidIndex(index));
        }
        self.reload_one(&guard, index, 0, unattended);
        Ok(())
    }

    /// Reloads every feed with the configured number of workers, then
    /// notifies if the unread counts moved.
    pub fn reload_all(&self, unattended: bool) -> Result<ReloadReport, ReloadError> {
        let guard = self.try_lock_reload()?;
        let before = self.compute_unread_numbers();
        let started = Instant::now();

        let slots = self.store.read();
        let total = slots.len();
        let workers = self.config.reload_threads.max(1);
        info!(feeds = total, workers, "reloading all feeds");

        let mut merged = Vec::new();
        if workers == 1 {
            merged = self.reload_slots(&slots, 0, total, unattended);
        } else {
            let partitions = partition_indexes(total, workers);
            if let Some((last, spawned)) = partitions.split_last() {
                std::thread::scope(|scope| {
                    let handles: Vec<_> = spawned
                        .iter()
                        .map(|range| {
                            let part = &slots[range.clone()];
                            let first = range.start;
                            scope.spawn(move || self.reload_slots(part, first, total, unattended))
                        })
                        .collect();

                    let inline =
                        self.reload_slots(&slots[last.clone()], last.start, total, unattended);

                    for (handle, range) in handles.into_iter().zip(spawned) {
                        match handle.join() {
                            Ok(indexes) => merged.extend(indexes),
                            Err(_) => error!(?range, "reload worker panicked"),
                        }
                    }
                    merged.extend(inline);
                });
            }
        }
        drop(slots);
        self.signal_itemlists(&merged);
        drop(guard);

        let after = self.compute_unread_numbers();
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "reload finished");
        let notified = self.notifier.notify_delta(&before, &after);
        Ok(ReloadReport {
            before,
            after,
            notified,
        })
    }

    /// Reloads the given feeds sequentially and notifies like `reload_all`.
    /// Unknown indexes are skipped.
    pub fn reload_indexes(
        &self,
        indexes: &[usize],
        unattended: bool,
    ) -> Result<ReloadReport, ReloadError> {
        let guard = self.try_lock_reload()?;
        let before = self.compute_unread_numbers();
        let total = self.store.len();
        for &index in indexes {
            if index < total {
                self.reload_one(&guard, index, total, unattended);
            } else {
                warn!(index, "skipping unknown feed index");
            }
        }
        drop(guard);

        let after = self.compute_unread_numbers();
        let notified = self.notifier.notify_delta(&before, &after);
        Ok(ReloadReport {
            before,
            after,
            notified,
        })
    }

    /// Returns the indexes whose item lists were replaced.
    fn reload_slots(
        &self,
        slots: &[Slot],
        first: usize,
        total: usize,
        unattended: bool,
    ) -> Vec<usize> {
        slots
            .iter()
            .enumerate()
            .filter_map(|(offset, slot)| {
                let index = first + offset;
                self.reload_slot(slot, index, total, unattended)
                    .then_some(index)
            })
            .collect()
    }

    fn signal_itemlists(&self, indexes: &[usize]) {
        for &index in indexes {
            self.view.itemlist_changed(index);
        }
    }

    fn reload_slot(&self, slot: &Slot, index: usize, total: usize, unattended: bool) -> bool {
        let (url, is_query) = {
            let feed = lock_slot(slot);
            (feed.url.clone(), feed.is_query())
        };
        if is_query {
            debug!(feed = %url, "query feeds are not fetched");
            return false;
        }

        if !unattended {
            self.view.set_status(&format!(
                "{}Loading {}...",
                progress_prefix(index + 1, total),
                censor_url(&url)
            ));
        }

        let result = self
            .parser
            .parse(&url)
            .and_then(|fetched| {
                self.merge_feed(slot, fetched)
                    .map_err(FetchError::from)
            });

        match result {
            Ok(merged) => {
                if merged {
                    self.enqueue_items(slot);
                }
                if !unattended {
                    self.view.set_status("");
                }
                merged
            }
            Err(e) => {
                self.report_fetch_error(&url, &e);
                false
            }
        }
    }

    fn report_fetch_error(&self, url: &str, error: &FetchError) {
        let url = censor_url(url);
        warn!(feed = %url, error = %error, "failed to reload feed");
        self.view
            .set_status(&format!("Error while retrieving {url}: {error}"));
    }
}
