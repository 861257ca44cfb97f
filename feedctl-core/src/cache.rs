use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::feed::{Feed, Item};

/// Persistent store of feeds and their items, keyed by feed identifier.
///
/// Implementations serialize access internally: the reload scheduler calls
/// into the cache from several worker threads at once.
pub trait Cache: Send + Sync {
    /// Builds a feed from its stored record. Unknown identifiers yield an
    /// empty feed.
    fn internalize(&self, url: &str) -> Result<Feed, CacheError>;

    /// Stores a feed's items, merging by guid with what is already stored.
    /// With `reset_unread` every item of the feed is stored as read.
    fn externalize(&self, feed: &Feed, reset_unread: bool) -> Result<(), CacheError>;

    fn known_feed_identifiers(&self) -> Result<Vec<String>, CacheError>;

    fn vacuum(&self) -> Result<(), CacheError>;

    fn mark_read_by_guid(&self, guids: &[String]) -> Result<(), CacheError>;

    fn read_guids(&self) -> Result<Vec<String>, CacheError>;

    /// Drops every stored feed whose identifier is not in `current`.
    fn cleanup(&self, current: &[String]) -> Result<(), CacheError>;

    /// Marks everything read, or only the items of `feed_url` when given.
    fn catchup_all(&self, feed_url: Option<&str>) -> Result<(), CacheError>;

    /// Persists the unread and enqueued flags of a single item.
    fn update_item_flags(&self, feed_url: &str, item: &Item) -> Result<(), CacheError>;

    fn mark_item_deleted(&self, guid: &str, deleted: bool) -> Result<(), CacheError>;

    fn unread_count(&self) -> Result<usize, CacheError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct CachedFeed {
    title: String,
    link: String,
    items: Vec<Item>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct CacheData {
    // feed url -> stored record
    feeds: BTreeMap<String, CachedFeed>,
}

/// [`Cache`] backed by a single JSON document, rewritten atomically on every
/// mutation.
#[derive(Debug)]
pub struct JsonCache {
    path: PathBuf,
    max_items: usize,
    inner: Mutex<CacheData>,
}

impl JsonCache {
    /// Opens the cache at `path`. A corrupt file falls back to the `.tmp`
    /// copy left by an interrupted write; if neither parses the open fails.
    pub fn open(path: impl AsRef<Path>, max_items: usize) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let data = match read_cache_file(&path)? {
            Some(Ok(data)) => data,
            Some(Err(reason)) => {
                warn!(error = %reason, path = %path.display(), "failed to parse cache, trying tmp fallback");
                match read_cache_file(&tmp_path(&path))? {
                    Some(Ok(data)) => data,
                    _ => return Err(CacheError::Corrupt { path, reason }),
                }
            }
            None => CacheData::default(),
        };

        info!(path = %path.display(), feeds = data.feeds.len(), "opened cache");
        Ok(Self {
            path,
            max_items,
            inner: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, CacheData> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, data: &CacheData) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(data)?;
        let tmp = tmp_path(&self.path);
        std::fs::write(&tmp, &bytes).map_err(|source| CacheError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| CacheError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Applies `f` to a copy of the data and keeps the copy only once it is
    /// on disk, so a failed write leaves the cache as it was.
    fn mutate<F>(&self, f: F) -> Result<(), CacheError>
    where
        F: FnOnce(&mut CacheData) -> bool,
    {
        let mut data = self.lock();
        let mut staged = data.clone();
        if f(&mut staged) {
            self.persist(&staged)?;
            *data = staged;
        }
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// `None` when the file does not exist, `Some(Err)` when it does not parse.
fn read_cache_file(path: &Path) -> Result<Option<Result<CacheData, String>>, CacheError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(
            serde_json::from_slice::<CacheData>(&bytes).map_err(|e| e.to_string()),
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(CacheError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn newest_first(items: &mut [Item]) {
    items.sort_by(|a, b| b.pub_date.cmp(&a.pub_date));
}

impl Cache for JsonCache {
    fn internalize(&self, url: &str) -> Result<Feed, CacheError> {
        let data = self.lock();
        let mut feed = Feed::new(url);
        if let Some(stored) = data.feeds.get(url) {
            feed.title.clone_from(&stored.title);
            feed.link.clone_from(&stored.link);
            feed.items = stored
                .items
                .iter()
                .filter(|item| !item.deleted)
                .cloned()
                .collect();
            newest_first(&mut feed.items);
            if self.max_items > 0 {
                feed.items.truncate(self.max_items);
            }
        } else {
            debug!(feed = %url, "feed not in cache yet");
        }
        feed.reattach_items();
        Ok(feed)
    }

    fn externalize(&self, feed: &Feed, reset_unread: bool) -> Result<(), CacheError> {
        self.mutate(|data| {
            let stored = data.feeds.entry(feed.url.clone()).or_default();
            stored.title.clone_from(&feed.title);
            stored.link.clone_from(&feed.link);
            for item in &feed.items {
                match stored.items.iter_mut().find(|s| s.guid == item.guid) {
                    Some(existing) => {
                        existing.title.clone_from(&item.title);
                        existing.author.clone_from(&item.author);
                        existing.link.clone_from(&item.link);
                        existing.description.clone_from(&item.description);
                        existing.enclosure_url.clone_from(&item.enclosure_url);
                        existing.enclosure_type.clone_from(&item.enclosure_type);
                        if item.pub_date.is_some() {
                            existing.pub_date = item.pub_date;
                        }
                        if reset_unread {
                            existing.unread = false;
                        }
                    }
                    None => {
                        let mut fresh = item.clone();
                        if reset_unread {
                            fresh.unread = false;
                        }
                        stored.items.push(fresh);
                    }
                }
            }
            true
        })
    }

    fn known_feed_identifiers(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.lock().feeds.keys().cloned().collect())
    }

    fn vacuum(&self) -> Result<(), CacheError> {
        let max_items = self.max_items;
        self.mutate(|data| {
            for stored in data.feeds.values_mut() {
                stored.items.retain(|item| !item.deleted);
                newest_first(&mut stored.items);
                if max_items > 0 {
                    stored.items.truncate(max_items);
                }
            }
            true
        })
    }

    fn mark_read_by_guid(&self, guids: &[String]) -> Result<(), CacheError> {
        let wanted: HashSet<&str> = guids.iter().map(String::as_str).collect();
        self.mutate(|data| {
            let mut changed = false;
            for item in data.feeds.values_mut().flat_map(|f| f.items.iter_mut()) {
                if item.unread && wanted.contains(item.guid.as_str()) {
                    item.unread = false;
                    changed = true;
                }
            }
            changed
        })
    }

    fn read_guids(&self) -> Result<Vec<String>, CacheError> {
        let data = self.lock();
        Ok(data
            .feeds
            .values()
            .flat_map(|f| f.items.iter())
            .filter(|item| !item.unread)
            .map(|item| item.guid.clone())
            .collect())
    }

    fn cleanup(&self, current: &[String]) -> Result<(), CacheError> {
        let keep: HashSet<&str> = current.iter().map(String::as_str).collect();
        self.mutate(|data| {
            let before = data.feeds.len();
            data.feeds.retain(|url, _| keep.contains(url.as_str()));
            let removed = before - data.feeds.len();
            if removed > 0 {
                info!(removed, "removed unsubscribed feeds from cache");
            }
            removed > 0
        })
    }

    fn catchup_all(&self, feed_url: Option<&str>) -> Result<(), CacheError> {
        self.mutate(|data| {
            let mut changed = false;
            for (url, stored) in data.feeds.iter_mut() {
                if feed_url.is_some_and(|wanted| wanted != url) {
                    continue;
                }
                for item in stored.items.iter_mut().filter(|i| i.unread) {
                    item.unread = false;
                    changed = true;
                }
            }
            changed
        })
    }

    fn update_item_flags(&self, feed_url: &str, item: &Item) -> Result<(), CacheError> {
        self.mutate(|data| {
            let Some(stored) = data
                .feeds
                .get_mut(feed_url)
                .and_then(|f| f.items.iter_mut().find(|s| s.guid == item.guid))
            else {
                return false;
            };
            stored.unread = item.unread;
            stored.enqueued = item.enqueued;
            true
        })
    }

    fn mark_item_deleted(&self, guid: &str, deleted: bool) -> Result<(), CacheError> {
        self.mutate(|data| {
            let mut changed = false;
            for item in data.feeds.values_mut().flat_map(|f| f.items.iter_mut()) {
                if item.guid == guid && item.deleted != deleted {
                    item.deleted = deleted;
                    changed = true;
                }
            }
            changed
        })
    }

    fn unread_count(&self) -> Result<usize, CacheError> {
        let data = self.lock();
        Ok(data
            .feeds
            .values()
            .flat_map(|f| f.items.iter())
            .filter(|item| item.unread && !item.deleted)
            .count())
    }
}
