pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod lifecycle;
pub mod lock;
pub mod notify;
pub mod queue;
pub mod reload;
pub mod session;
pub mod source;
pub mod store;
pub mod template;
pub mod view;

pub use cache::{Cache, JsonCache};
pub use config::{Config, SortOrder, UrlSourceKind};
pub use controller::{censor_url, Controller};
pub use error::{
    CacheError, ConfigError, ControllerError, FetchError, LockError, QueueError, ReloadError,
    SourceError, StartupError,
};
pub use feed::{Feed, Item};
pub use fetch::{FeedParser, FetchConfig, HttpFeedParser};
pub use lifecycle::{install_signal_handlers, Lifecycle};
pub use lock::LockHandle;
pub use notify::{Notifier, NotifySink};
pub use queue::QueueFile;
pub use reload::{partition_indexes, ReloadGuard, ReloadReport};
pub use session::{Paths, Session, StartupOptions};
pub use source::{FileUrlSource, RemoteUrlSource, UrlSource};
pub use store::{FeedStore, UnreadCounts};
pub use view::{NullView, View};
