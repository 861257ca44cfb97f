//! Startup and orderly shutdown.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::{Cache, JsonCache};
use crate::config::{expand_tilde, Config, UrlSourceKind};
use crate::controller::Controller;
use crate::error::{CacheError, StartupError};
use crate::fetch::{FeedParser, FetchConfig, HttpFeedParser};
use crate::lifecycle::Lifecycle;
use crate::lock::lock_path_for;
use crate::queue::QueueFile;
use crate::source;
use crate::view::View;

/// Command-line overrides. Anything left `None` resolves inside the
/// configuration directory.
#[derive(Debug, Clone, Default)]
pub struct StartupOptions {
    pub config_dir: Option<PathBuf>,
    pub url_file: Option<PathBuf>,
    pub cache_file: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub offline: bool,
}

#[derive(Debug, Clone)]
pub struct Paths {
    pub config_dir: PathBuf,
    pub url_file: PathBuf,
    pub cache_file: PathBuf,
    pub config_file: PathBuf,
    pub queue_file: PathBuf,
}

impl Paths {
    pub fn resolve(options: &StartupOptions) -> Result<Self, StartupError> {
        let config_dir = match &options.config_dir {
            Some(dir) => dir.clone(),
            None => Config::default_dir().ok_or(StartupError::NoConfigDir)?,
        };
        if let Err(e) = std::fs::create_dir_all(&config_dir) {
            warn!(error = %e, path = %config_dir.display(), "failed to create config dir");
        }
        Ok(Self {
            url_file: options
                .url_file
                .clone()
                .unwrap_or_else(|| config_dir.join("urls")),
            cache_file: options
                .cache_file
                .clone()
                .unwrap_or_else(|| config_dir.join("cache.json")),
            config_file: options
                .config_file
                .clone()
                .unwrap_or_else(|| config_dir.join("config.json")),
            queue_file: config_dir.join("queue"),
            config_dir,
        })
    }
}

/// A started controller together with the process lock it runs under.
pub struct Session {
    controller: Controller,
    lifecycle: Lifecycle,
    paths: Paths,
}

impl Session {
    pub fn start(options: StartupOptions, view: Arc<dyn View>) -> Result<Self, StartupError> {
        Self::start_with(options, view, |config| {
            let parser: Box<dyn FeedParser> = Box::new(
                HttpFeedParser::new(FetchConfig::from(config)).map_err(StartupError::Fetcher)?,
            );
            Ok(parser)
        })
    }

    /// Runs the startup sequence with a caller-supplied fetcher. If any step
    /// fails the lock taken so far is released on the way out.
    pub fn start_with<F>(
        options: StartupOptions,
        view: Arc<dyn View>,
        make_parser: F,
    ) -> Result<Self, StartupError>
    where
        F: FnOnce(&Config) -> Result<Box<dyn FeedParser>, StartupError>,
    {
        let mut paths = Paths::resolve(&options)?;
        let mut lifecycle = Lifecycle::new();
        lifecycle.lock(&lock_path_for(&paths.cache_file))?;

        let config = Config::load(&paths.config_file)?;
        info!(path = %paths.config_file.display(), "loaded configuration");

        if options.cache_file.is_none() {
            if let Some(configured) = &config.cache_file {
                let configured = PathBuf::from(expand_tilde(&configured.to_string_lossy()));
                if configured != paths.cache_file {
                    info!(path = %configured.display(), "cache file moved by configuration");
                    lifecycle.lock(&lock_path_for(&configured))?;
                    paths.cache_file = configured;
                }
            }
        }

        let cache = JsonCache::open(&paths.cache_file, config.max_items)
            .map_err(StartupError::CacheOpen)?;
        let cache: Arc<dyn Cache> = Arc::new(cache);

        let mut urls = source::from_config(&config, &paths.url_file).map_err(|error| {
            StartupError::Source {
                source_name: paths.url_file.display().to_string(),
                error,
            }
        })?;
        if options.offline && config.urls_source != UrlSourceKind::Local {
            info!("offline mode, loading URLs from the cache");
            urls.set_offline(true);
            urls.set_urls(
                cache
                    .known_feed_identifiers()
                    .map_err(StartupError::Internalize)?,
            );
        } else {
            info!(source = %urls.source_name(), "loading URLs");
            urls.reload().map_err(|error| StartupError::Source {
                source_name: urls.source_name(),
                error,
            })?;
        }

        if urls.urls().is_empty() {
            warn!("no URLs configured");
            return Err(StartupError::NoUrls(no_urls_message(
                config.urls_source,
                &paths.url_file,
            )));
        }

        let parser = make_parser(&config)?;
        let queue = QueueFile::new(&paths.queue_file, config.download_path.clone());
        let controller = Controller::new(config, cache, urls, parser, queue).with_view(view);
        controller
            .load_feeds()
            .map_err(StartupError::Internalize)?;

        Ok(Self {
            controller,
            lifecycle,
            paths,
        })
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn lock_path(&self) -> Option<&Path> {
        self.lifecycle.lock_path()
    }

    /// Compacts the cache and exits without the shutdown cleanup pass.
    pub fn vacuum(self) -> Result<(), CacheError> {
        let result = self.controller.cache().vacuum();
        self.lifecycle.shutdown();
        result
    }

    /// Leaves without touching the cache.
    pub fn release(self) {
        self.lifecycle.shutdown();
    }

    /// Orderly shutdown: prunes the cache against the live feed list, then
    /// releases the lock. A cleanup failure is returned for reporting only.
    pub fn shutdown(self) -> Result<(), CacheError> {
        let Session {
            controller,
            lifecycle,
            ..
        } = self;
        let result = controller.cleanup_cache();
        if let Err(e) = &result {
            warn!(error = %e, "cache cleanup failed");
        }
        lifecycle.shutdown();
        result
    }
}

fn no_urls_message(kind: UrlSourceKind, url_file: &Path) -> String {
    match kind {
        UrlSourceKind::Local => format!(
            "Error: no URLs configured. Please fill the file {} with RSS feed URLs.",
            url_file.display()
        ),
        UrlSourceKind::RemoteList => "It looks like the subscription list you configured \
             contains no feeds. Please fill it with feeds, and try again."
            .to_string(),
        UrlSourceKind::RemoteAccount => "It looks like you haven't configured any feeds in \
             your account. Please do so, and try again."
            .to_string(),
    }
}
