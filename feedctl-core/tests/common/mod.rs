#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Barrier, Mutex};

use feedctl_core::{
    Cache, Config, Controller, Feed, FeedParser, FetchError, FileUrlSource, Item, JsonCache,
    NotifySink, QueueFile, UrlSource, View,
};
use tempfile::TempDir;

pub fn item(guid: &str, unread: bool) -> Item {
    Item {
        guid: guid.to_string(),
        title: format!("title {guid}"),
        link: format!("http://example.com/{guid}"),
        unread,
        ..Default::default()
    }
}

pub fn guids(feed: &Feed) -> Vec<String> {
    let mut guids: Vec<String> = feed.items.iter().map(|i| i.guid.clone()).collect();
    guids.sort();
    guids
}

#[derive(Clone)]
enum Response {
    Items(Vec<Item>),
    Fail(String),
}

#[derive(Default)]
struct ParserState {
    responses: Mutex<HashMap<String, Response>>,
    calls: Mutex<Vec<String>>,
    // (entered, release): parse blocks between the two when set
    gate: Mutex<Option<(Arc<Barrier>, Arc<Barrier>)>>,
}

/// Parser answering from a table instead of the network.
#[derive(Clone, Default)]
pub struct FakeParser {
    state: Arc<ParserState>,
}

impl FakeParser {
    pub fn respond(&self, url: &str, items: Vec<Item>) {
        self.state
            .responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Response::Items(items));
    }

    pub fn fail(&self, url: &str, message: &str) {
        self.state
            .responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Response::Fail(message.to_string()));
    }

    /// Makes the next parse call wait on both barriers.
    pub fn gate(&self, entered: Arc<Barrier>, release: Arc<Barrier>) {
        *self.state.gate.lock().unwrap() = Some((entered, release));
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.calls.lock().unwrap().clone()
    }
}

impl FeedParser for FakeParser {
    fn parse(&self, url: &str) -> Result<Feed, FetchError> {
        self.state.calls.lock().unwrap().push(url.to_string());
        let gate = self.state.gate.lock().unwrap().take();
        if let Some((entered, release)) = gate {
            entered.wait();
            release.wait();
        }
        let response = self.state.responses.lock().unwrap().get(url).cloned();
        match response {
            Some(Response::Items(items)) => {
                let mut feed = Feed::new(url);
                feed.title = format!("Feed {url}");
                feed.items = items;
                Ok(feed)
            }
            Some(Response::Fail(message)) => Err(FetchError::Parse(message)),
            None => Err(FetchError::Unsupported(url.to_string())),
        }
    }
}

#[derive(Default)]
pub struct RecordingView {
    pub statuses: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<String>>,
    pub itemlists: Mutex<Vec<usize>>,
    pub feedlists: Mutex<Vec<usize>>,
}

impl RecordingView {
    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn itemlists(&self) -> Vec<usize> {
        self.itemlists.lock().unwrap().clone()
    }
}

impl View for RecordingView {
    fn feedlist_changed(&self, len: usize) {
        self.feedlists.lock().unwrap().push(len);
    }

    fn itemlist_changed(&self, index: usize) {
        self.itemlists.lock().unwrap().push(index);
    }

    fn set_status(&self, message: &str) {
        self.statuses.lock().unwrap().push(message.to_string());
    }

    fn show_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}

#[derive(Clone, Default)]
pub struct RecordingSink {
    pub messages: Arc<Mutex<Vec<String>>>,
}

impl NotifySink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn notify(&self, message: &str) -> std::io::Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

pub fn write_urls(path: &PathBuf, lines: &[&str]) {
    std::fs::write(path, lines.join("\n")).unwrap();
}

/// Controller over a JSON cache and a URL file in a temporary directory.
pub struct Harness {
    pub dir: TempDir,
    pub url_file: PathBuf,
    pub cache: Arc<JsonCache>,
    pub parser: FakeParser,
    pub view: Arc<RecordingView>,
    pub controller: Controller,
}

impl Harness {
    /// Feeds are not loaded yet, so the cache can be seeded first.
    pub fn new(urls: &[&str], configure: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let url_file = dir.path().join("urls");
        write_urls(&url_file, urls);

        let mut config = Config::default();
        configure(&mut config);

        let cache = Arc::new(JsonCache::open(dir.path().join("cache.json"), config.max_items).unwrap());
        let mut source = FileUrlSource::new(&url_file);
        source.reload().unwrap();
        let parser = FakeParser::default();
        let view = Arc::new(RecordingView::default());
        let queue = QueueFile::new(
            dir.path().join("queue"),
            dir.path().join("downloads").display().to_string(),
        );
        let controller = Controller::new(
            config,
            cache.clone(),
            Box::new(source),
            Box::new(parser.clone()),
            queue,
        )
        .with_view(view.clone());

        Self {
            dir,
            url_file,
            cache,
            parser,
            view,
            controller,
        }
    }

    pub fn seed(&self, url: &str, items: Vec<Item>) {
        let mut feed = Feed::new(url);
        feed.title = format!("Cached {url}");
        feed.items = items;
        self.cache.externalize(&feed, false).unwrap();
    }

    pub fn load(self) -> Self {
        self.controller.load_feeds().unwrap();
        self
    }

    pub fn feed(&self, url: &str) -> Feed {
        let index = self.controller.feed_index_by_url(url).unwrap();
        self.controller.store().snapshot(index).unwrap()
    }
}
