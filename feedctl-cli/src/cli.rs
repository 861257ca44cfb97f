use std::path::PathBuf;

use clap::Parser;
use feedctl_core::StartupOptions;

/// feedctl: feed aggregation controller
#[derive(Parser, Debug)]
#[command(name = "feedctl", version)]
#[command(about = "Refresh, cache and track subscribed RSS/Atom feeds", long_about = None)]
pub struct Cli {
    /// Refresh feeds on start
    #[arg(short = 'r', long = "refresh-on-start")]
    pub refresh_on_start: bool,

    /// Read feed URLs from <urlfile>
    #[arg(short = 'u', long = "url-file", value_name = "urlfile")]
    pub url_file: Option<PathBuf>,

    /// Use <cachefile> as cache file
    #[arg(short = 'c', long = "cache-file", value_name = "cachefile")]
    pub cache_file: Option<PathBuf>,

    /// Read configuration from <configfile>
    #[arg(short = 'C', long = "config-file", value_name = "configfile")]
    pub config_file: Option<PathBuf>,

    /// Clean up cache thoroughly
    #[arg(short = 'v', long)]
    pub vacuum: bool,

    /// Offline mode (only applies to remote subscription sources)
    #[arg(short = 'o', long)]
    pub offline: bool,

    /// Execute list of commands (`reload`, `print-unread`)
    #[arg(short = 'x', long = "execute", value_name = "command", num_args = 1..)]
    pub execute: Vec<String>,

    /// Import list of read articles from <file>
    #[arg(short = 'I', long = "import-read", value_name = "file", conflicts_with = "export_read")]
    pub import_read: Option<PathBuf>,

    /// Export list of read articles to <file>
    #[arg(short = 'E', long = "export-read", value_name = "file")]
    pub export_read: Option<PathBuf>,

    /// Log level, 1 (errors only) to 6
    #[arg(short = 'l', long = "log-level", value_name = "loglevel",
          value_parser = clap::value_parser!(u8).range(1..=6))]
    pub log_level: Option<u8>,

    /// Write the log to <logfile>
    #[arg(short = 'd', long = "log-file", value_name = "logfile")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    pub fn startup_options(&self) -> StartupOptions {
        StartupOptions {
            config_dir: None,
            url_file: self.url_file.clone(),
            cache_file: self.cache_file.clone(),
            config_file: self.config_file.clone(),
            offline: self.offline,
        }
    }

    /// Filter directive for the log level; `info` when none was given.
    pub fn log_directive(&self) -> &'static str {
        match self.log_level {
            Some(1) => "error",
            Some(2) => "warn",
            Some(3) | None => "info",
            Some(4) => "debug",
            Some(_) => "trace",
        }
    }
}
