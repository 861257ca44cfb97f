use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix of feed identifiers that are evaluated against the cache instead of
/// being fetched from the network.
pub const QUERY_PREFIX: &str = "query:";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Item {
    pub guid: String,
    pub title: String,
    pub author: Option<String>,
    pub link: String,
    pub description: Option<String>,
    pub pub_date: Option<DateTime<Utc>>,
    pub enclosure_url: Option<String>,
    pub enclosure_type: Option<String>,
    pub unread: bool,
    pub enqueued: bool,
    pub deleted: bool,
    /// Identifier of the owning feed. Refreshed on every merge; never used to
    /// look the feed up by anything other than its identifier.
    #[serde(skip)]
    pub feed_url: String,
}

impl Item {
    pub fn from_rss_item(feed_url: &str, item: &rss::Item) -> Self {
        let pub_date = item
            .pub_date()
            .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
            .map(|dt| dt.with_timezone(&Utc));

        // Dublin Core creator wins over the plain author field
        let author = item
            .dublin_core_ext()
            .and_then(|dc| dc.creators().first().map(|s| s.to_string()))
            .or_else(|| item.author().map(|s| s.to_string()));

        let title = item.title().unwrap_or_default().to_owned();
        let link = item.link().unwrap_or_default().to_owned();
        let guid = item
            .guid()
            .map(|guid| guid.value().to_owned())
            .filter(|guid| !guid.is_empty())
            .unwrap_or_else(|| fallback_guid(&link, &title));

        Self {
            guid,
            title,
            author,
            link,
            description: item.description().map(ToOwned::to_owned),
            pub_date,
            enclosure_url: item.enclosure().map(|e| e.url().to_owned()),
            enclosure_type: item.enclosure().map(|e| e.mime_type().to_owned()),
            unread: true,
            enqueued: false,
            deleted: false,
            feed_url: feed_url.to_owned(),
        }
    }

    pub fn from_atom_entry(feed_url: &str, entry: &atom_syndication::Entry) -> Self {
        let link = entry
            .links()
            .iter()
            .find(|l| l.rel() == "alternate")
            .or_else(|| entry.links().first())
            .map(|l| l.href().to_owned())
            .unwrap_or_default();
        let enclosure = entry.links().iter().find(|l| l.rel() == "enclosure");
        let title = entry.title().value.clone();
        let guid = if entry.id().is_empty() {
            fallback_guid(&link, &title)
        } else {
            entry.id().to_owned()
        };
        let description = entry
            .content()
            .and_then(|c| c.value().map(ToOwned::to_owned))
            .or_else(|| entry.summary().map(|s| s.value.clone()));
        let pub_date = entry
            .published()
            .copied()
            .unwrap_or_else(|| *entry.updated())
            .with_timezone(&Utc);

        Self {
            guid,
            title,
            author: entry.authors().first().map(|p| p.name().to_owned()),
            link,
            description,
            pub_date: Some(pub_date),
            enclosure_url: enclosure.map(|l| l.href().to_owned()),
            enclosure_type: enclosure.and_then(|l| l.mime_type().map(ToOwned::to_owned)),
            unread: true,
            enqueued: false,
            deleted: false,
            feed_url: feed_url.to_owned(),
        }
    }
}

fn fallback_guid(link: &str, title: &str) -> String {
    if link.is_empty() {
        title.to_owned()
    } else {
        link.to_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Feed {
    pub url: String,
    pub title: String,
    pub link: String,
    pub items: Vec<Item>,
    tags: Vec<String>,
}

impl Feed {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_query(&self) -> bool {
        self.url.starts_with(QUERY_PREFIX)
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn set_tags(&mut self, tags: Vec<String>) {
        self.tags = tags;
    }

    /// First tag usable for sorting: `~title` overrides and `!hidden` markers
    /// are skipped.
    pub fn first_tag(&self) -> &str {
        self.tags
            .iter()
            .find(|t| !t.starts_with('~') && !t.starts_with('!'))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Title to show, honouring a `~Title` tag override.
    pub fn display_title(&self) -> &str {
        self.tags
            .iter()
            .find_map(|t| t.strip_prefix('~'))
            .unwrap_or(&self.title)
    }

    pub fn unread_item_count(&self) -> usize {
        self.items.iter().filter(|i| i.unread && !i.deleted).count()
    }

    /// Points every item's back-reference at this feed.
    pub fn reattach_items(&mut self) {
        for item in &mut self.items {
            item.feed_url.clone_from(&self.url);
        }
    }

    pub fn item_by_guid_mut(&mut self, guid: &str) -> Option<&mut Item> {
        self.items.iter_mut().find(|i| i.guid == guid)
    }

    pub fn from_rss_channel(url: &str, channel: &rss::Channel) -> Self {
        let mut feed = Feed::new(url);
        feed.title = channel.title().to_owned();
        feed.link = channel.link().to_owned();
        feed.items = dedup_by_guid(
            channel
                .items()
                .iter()
                .map(|item| Item::from_rss_item(url, item))
                .collect(),
        );
        feed
    }

    pub fn from_atom_feed(url: &str, atom: &atom_syndication::Feed) -> Self {
        let mut feed = Feed::new(url);
        feed.title = atom.title().value.clone();
        feed.link = atom
            .links()
            .iter()
            .find(|l| l.rel() == "alternate")
            .or_else(|| atom.links().first())
            .map(|l| l.href().to_owned())
            .unwrap_or_default();
        feed.items = dedup_by_guid(
            atom.entries()
                .iter()
                .map(|entry| Item::from_atom_entry(url, entry))
                .collect(),
        );
        feed
    }
}

/// Keeps the first occurrence of every guid, preserving order.
pub fn dedup_by_guid(items: Vec<Item>) -> Vec<Item> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.guid.clone()))
        .collect()
}
