use std::io::Cursor;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::redirect;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::FetchError;
use crate::feed::Feed;

/// Turns a feed identifier into a freshly fetched feed.
pub trait FeedParser: Send + Sync {
    fn parse(&self, url: &str) -> Result<Feed, FetchError>;
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub request_timeout: Duration,
    pub max_retries: u8,
    pub retry_backoff_ms: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for FetchConfig {
    fn from(config: &Config) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            max_retries: config.retry_attempts,
            retry_backoff_ms: config.retry_backoff_ms,
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Blocking HTTP fetcher for RSS 2.0 and Atom documents.
#[derive(Debug, Clone)]
pub struct HttpFeedParser {
    client: Client,
    config: FetchConfig,
}

impl HttpFeedParser {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .redirect(redirect::Policy::limited(5))
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client, config })
    }

    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut attempt: u8 = 0;
        loop {
            let result = self
                .client
                .get(url)
                .send()
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.bytes());
            match result {
                Ok(bytes) => return Ok(bytes.to_vec()),
                Err(err) if attempt < self.config.max_retries => {
                    attempt += 1;
                    let backoff = self.config.retry_backoff_ms * u64::from(attempt);
                    warn!(feed = %url, error = %err, attempt, backoff_ms = backoff, "fetch failed, retrying");
                    std::thread::sleep(Duration::from_millis(backoff));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl FeedParser for HttpFeedParser {
    fn parse(&self, url: &str) -> Result<Feed, FetchError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(FetchError::Unsupported(url.to_owned()));
        }
        let bytes = self.fetch_bytes(url)?;
        let feed = parse_document(url, &bytes)?;
        debug!(feed = %url, items = feed.items.len(), "parsed feed");
        Ok(feed)
    }
}

/// Parses an RSS document, falling back to Atom.
pub fn parse_document(url: &str, bytes: &[u8]) -> Result<Feed, FetchError> {
    match rss::Channel::read_from(Cursor::new(bytes)) {
        Ok(channel) => Ok(Feed::from_rss_channel(url, &channel)),
        Err(rss_err) => match atom_syndication::Feed::read_from(Cursor::new(bytes)) {
            Ok(atom) => Ok(Feed::from_atom_feed(url, &atom)),
            Err(atom_err) => Err(FetchError::Parse(format!(
                "not RSS ({rss_err}) and not Atom ({atom_err})"
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_atom_when_rss_fails() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Feed</title>
  <id>urn:feed</id>
  <updated>2024-10-21T07:28:00Z</updated>
  <link href="http://example.com/"/>
  <entry>
    <title>Episode</title>
    <id>urn:entry:1</id>
    <updated>2024-10-21T07:28:00Z</updated>
    <link rel="alternate" href="http://example.com/1"/>
    <link rel="enclosure" type="audio/mpeg" href="http://cdn.example.com/ep1.mp3"/>
  </entry>
</feed>"#;
        let feed = parse_document("http://example.com/atom", atom.as_bytes()).unwrap();
        assert_eq!(feed.title, "Atom Feed");
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].guid, "urn:entry:1");
        assert_eq!(
            feed.items[0].enclosure_url.as_deref(),
            Some("http://cdn.example.com/ep1.mp3")
        );
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            parse_document("http://x", b"definitely not xml"),
            Err(FetchError::Parse(_))
        ));
    }

    #[test]
    fn query_feeds_are_not_fetched() {
        let parser = HttpFeedParser::new(FetchConfig::default()).unwrap();
        assert!(matches!(
            parser.parse("query:unread:unread = \"yes\""),
            Err(FetchError::Unsupported(_))
        ));
    }
}
