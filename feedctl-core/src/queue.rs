use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use tracing::{debug, info};

use crate::config::expand_tilde;
use crate::error::QueueError;
use crate::source::{quote, tokenize_quoted};
use crate::template::Template;

/// Download queue: one `<url> "<filename>"` line per enclosure, each URL at
/// most once.
#[derive(Debug)]
pub struct QueueFile {
    path: PathBuf,
    download_path: String,
    // serializes the scan-then-append of concurrent enqueues
    write_lock: Mutex<()>,
}

impl QueueFile {
    /// `download_path` is a directory template: `%n` is the feed title and
    /// `%h` the enclosure's host name.
    pub fn new(path: impl AsRef<Path>, download_path: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            download_path: download_path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> QueueError {
        QueueError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Appends `url` unless it is already queued. Returns whether a line was
    /// written.
    pub fn enqueue(&self, url: &str, feed_title: &str) -> Result<bool, QueueError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if self.contains(url)? {
            debug!(url, "already enqueued");
            return Ok(false);
        }

        let filename = self.generate_filename(url, feed_title);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        writeln!(file, "{} {}", url, quote(&filename)).map_err(|e| self.io_err(e))?;
        info!(url, filename = %filename, "enqueued download");
        Ok(true)
    }

    pub fn contains(&self, url: &str) -> Result<bool, QueueError> {
        Ok(self.entries()?.iter().any(|(queued, _)| queued == url))
    }

    /// All `(url, filename)` entries in file order.
    pub fn entries(&self) -> Result<Vec<(String, String)>, QueueError> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_err(e)),
        };
        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| self.io_err(e))?;
            let mut fields = tokenize_quoted(&line).into_iter();
            if let Some(url) = fields.next() {
                entries.push((url, fields.next().unwrap_or_default()));
            }
        }
        Ok(entries)
    }

    pub fn generate_filename(&self, url: &str, feed_title: &str) -> String {
        let mut template = expand_tilde(&self.download_path);
        if !template.ends_with('/') {
            template.push('/');
        }
        let mut path = Template::new()
            .var('n', feed_title)
            .var('h', hostname(url))
            .render(&template);

        match basename(url) {
            Some(base) => path.push_str(&base),
            None => path.push_str(&Local::now().format("%Y-%b-%d-%H%M%S.unknown").to_string()),
        }
        path
    }
}

fn hostname(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(ToOwned::to_owned))
        .unwrap_or_default()
}

/// Last non-empty path segment of the URL.
fn basename(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(ToOwned::to_owned)
}
