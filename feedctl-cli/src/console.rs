use std::io::{IsTerminal, Write};
use std::sync::Mutex;

use feedctl_core::lifecycle::set_display_active;
use feedctl_core::View;
use tracing::debug;

/// Line-oriented presentation on the terminal. On a tty, status messages
/// overwrite each other on one line with the cursor hidden.
pub struct ConsoleView {
    interactive: bool,
    status_shown: Mutex<bool>,
}

impl ConsoleView {
    pub fn new() -> Self {
        Self {
            interactive: std::io::stderr().is_terminal(),
            status_shown: Mutex::new(false),
        }
    }

    fn with_status<R>(&self, f: impl FnOnce(&mut bool) -> R) -> R {
        let mut shown = self
            .status_shown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut shown)
    }

    /// Ends the status line, restoring the cursor.
    pub fn finish_status(&self) {
        self.with_status(|shown| {
            if *shown {
                let mut err = std::io::stderr().lock();
                let _ = write!(err, "\r\x1b[K\x1b[?25h");
                let _ = err.flush();
                *shown = false;
                set_display_active(false);
            }
        });
    }
}

impl Default for ConsoleView {
    fn default() -> Self {
        Self::new()
    }
}

impl View for ConsoleView {
    fn feedlist_changed(&self, len: usize) {
        debug!(feeds = len, "feed list changed");
    }

    fn itemlist_changed(&self, index: usize) {
        debug!(index, "item list changed");
    }

    fn set_status(&self, message: &str) {
        if !self.interactive {
            if !message.is_empty() {
                eprintln!("{message}");
            }
            return;
        }
        self.with_status(|shown| {
            let mut err = std::io::stderr().lock();
            if !*shown {
                set_display_active(true);
                let _ = write!(err, "\x1b[?25l");
                *shown = true;
            }
            let _ = write!(err, "\r\x1b[K{message}");
            let _ = err.flush();
        });
    }

    fn show_error(&self, message: &str) {
        self.finish_status();
        eprintln!("{message}");
    }
}
