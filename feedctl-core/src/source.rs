//! Subscription list providers.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::{Config, RemoteConfig, UrlSourceKind};
use crate::error::SourceError;
use crate::fetch::FetchConfig;

pub trait UrlSource: Send + Sync {
    /// Re-reads the subscription list from its backing store.
    fn reload(&mut self) -> Result<(), SourceError>;

    fn urls(&self) -> &[String];

    fn tags(&self, url: &str) -> Vec<String>;

    fn all_tags(&self) -> BTreeSet<String>;

    fn set_offline(&mut self, offline: bool);

    /// Replaces the list wholesale; used to inject the cache's identifiers
    /// in offline mode.
    fn set_urls(&mut self, urls: Vec<String>);

    /// Human-readable origin, for status and error messages.
    fn source_name(&self) -> String;
}

/// Identifiers and their tags, in subscription order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Subscriptions {
    urls: Vec<String>,
    tags: HashMap<String, Vec<String>>,
}

impl Subscriptions {
    pub fn push(&mut self, url: String, tags: Vec<String>) {
        if self.tags.contains_key(&url) {
            debug!(feed = %url, "duplicate subscription ignored");
            return;
        }
        self.tags.insert(url.clone(), tags);
        self.urls.push(url);
    }

    /// Parses the line format: `<id> [tag ...]`, tags optionally
    /// double-quoted, `#` comments and blank lines skipped.
    pub fn parse_lines(text: &str) -> Self {
        let mut subs = Self::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = tokenize_quoted(line).into_iter();
            if let Some(url) = fields.next() {
                subs.push(url, fields.collect());
            }
        }
        subs
    }

    fn set_urls(&mut self, urls: Vec<String>) {
        self.tags.retain(|url, _| urls.contains(url));
        self.urls = urls;
    }

    fn tags(&self, url: &str) -> Vec<String> {
        self.tags.get(url).cloned().unwrap_or_default()
    }

    fn all_tags(&self) -> BTreeSet<String> {
        self.tags.values().flatten().cloned().collect()
    }
}

/// Splits on whitespace, treating `"..."` as one field with `\"` and `\\`
/// escapes.
pub fn tokenize_quoted(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let Some(&first) = chars.peek() else {
            break;
        };
        let mut field = String::new();
        if first == '"' {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            field.push(escaped);
                        }
                    }
                    '"' => break,
                    _ => field.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                field.push(c);
                chars.next();
            }
        }
        fields.push(field);
    }
    fields
}

/// Inverse of the quoted-field rule in [`tokenize_quoted`].
pub fn quote(field: &str) -> String {
    let mut out = String::with_capacity(field.len() + 2);
    out.push('"');
    for c in field.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Local subscription file.
#[derive(Debug)]
pub struct FileUrlSource {
    path: PathBuf,
    subs: Subscriptions,
}

impl FileUrlSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            subs: Subscriptions::default(),
        }
    }
}

impl UrlSource for FileUrlSource {
    fn reload(&mut self) -> Result<(), SourceError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            // an absent list is an empty list; the caller reports "no URLs"
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(SourceError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        self.subs = Subscriptions::parse_lines(&text);
        info!(path = %self.path.display(), feeds = self.subs.urls.len(), "loaded subscription list");
        Ok(())
    }

    fn urls(&self) -> &[String] {
        &self.subs.urls
    }

    fn tags(&self, url: &str) -> Vec<String> {
        self.subs.tags(url)
    }

    fn all_tags(&self) -> BTreeSet<String> {
        self.subs.all_tags()
    }

    fn set_offline(&mut self, _offline: bool) {}

    fn set_urls(&mut self, urls: Vec<String>) {
        self.subs.set_urls(urls);
    }

    fn source_name(&self) -> String {
        self.path.display().to_string()
    }
}

#[derive(Debug, Deserialize)]
struct AccountSubscription {
    url: String,
    #[serde(default)]
    tags: Vec<String>,
}

/// Subscription list held by a remote service.
///
/// `RemoteList` fetches a document in the local line format;
/// `RemoteAccount` authenticates and fetches a JSON array of
/// `{"url": ..., "tags": [...]}` records.
#[derive(Debug)]
pub struct RemoteUrlSource {
    kind: UrlSourceKind,
    remote: RemoteConfig,
    client: Client,
    offline: bool,
    subs: Subscriptions,
}

impl RemoteUrlSource {
    pub fn new(
        kind: UrlSourceKind,
        remote: RemoteConfig,
        fetch: &FetchConfig,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(fetch.request_timeout)
            .user_agent(fetch.user_agent.clone())
            .build()?;
        Ok(Self {
            kind,
            remote,
            client,
            offline: false,
            subs: Subscriptions::default(),
        })
    }
}

impl UrlSource for RemoteUrlSource {
    fn reload(&mut self) -> Result<(), SourceError> {
        if self.offline {
            debug!("offline, keeping cached subscription list");
            return Ok(());
        }
        if self.remote.url.is_empty() {
            return Err(SourceError::NotConfigured("remote.url"));
        }
        let mut request = self.client.get(&self.remote.url);
        if !self.remote.login.is_empty() {
            request = request.basic_auth(&self.remote.login, Some(&self.remote.password));
        }
        let response = request.send()?.error_for_status()?;
        self.subs = match self.kind {
            UrlSourceKind::RemoteAccount => {
                let records: Vec<AccountSubscription> = response
                    .json()
                    .map_err(|e| SourceError::Invalid(e.to_string()))?;
                let mut subs = Subscriptions::default();
                for record in records {
                    subs.push(record.url, record.tags);
                }
                subs
            }
            _ => Subscriptions::parse_lines(&response.text()?),
        };
        info!(source = %self.remote.url, feeds = self.subs.urls.len(), "loaded remote subscription list");
        Ok(())
    }

    fn urls(&self) -> &[String] {
        &self.subs.urls
    }

    fn tags(&self, url: &str) -> Vec<String> {
        self.subs.tags(url)
    }

    fn all_tags(&self) -> BTreeSet<String> {
        self.subs.all_tags()
    }

    fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    fn set_urls(&mut self, urls: Vec<String>) {
        self.subs.set_urls(urls);
    }

    fn source_name(&self) -> String {
        crate::controller::censor_url(&self.remote.url)
    }
}

/// Builds the configured URL source. `url_file` is used by the local variant.
pub fn from_config(config: &Config, url_file: &Path) -> Result<Box<dyn UrlSource>, SourceError> {
    match config.urls_source {
        UrlSourceKind::Local => Ok(Box::new(FileUrlSource::new(url_file))),
        kind => Ok(Box::new(RemoteUrlSource::new(
            kind,
            config.remote.clone(),
            &FetchConfig::from(config),
        )?)),
    }
}
