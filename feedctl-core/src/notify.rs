use std::io::Write;
use std::process::Command;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::config::Config;
use crate::store::UnreadCounts;
use crate::template::Template;

/// Destination for a rendered notification. Failures are reported back and
/// never stop the remaining sinks.
pub trait NotifySink: Send + Sync {
    fn name(&self) -> &str;
    fn notify(&self, message: &str) -> std::io::Result<()>;
}

type SharedWriter = Mutex<Box<dyn Write + Send>>;

fn write_escaped(out: &SharedWriter, prefix: &str, message: &str) -> std::io::Result<()> {
    let mut out = out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    write!(out, "{prefix}{message}\x1b\\")?;
    out.flush()
}

/// GNU screen hardstatus message (`ESC ^ ... ESC \`).
pub struct ScreenSink {
    out: SharedWriter,
}

impl ScreenSink {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl NotifySink for ScreenSink {
    fn name(&self) -> &str {
        "screen"
    }

    fn notify(&self, message: &str) -> std::io::Result<()> {
        write_escaped(&self.out, "\x1b^", message)
    }
}

/// Terminal window title (`ESC ] 2 ; ... ESC \`).
pub struct XtermTitleSink {
    out: SharedWriter,
}

impl XtermTitleSink {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl NotifySink for XtermTitleSink {
    fn name(&self) -> &str {
        "xterm"
    }

    fn notify(&self, message: &str) -> std::io::Result<()> {
        write_escaped(&self.out, "\x1b]2;", message)
    }
}

/// Runs an external program with the message as its single argument.
pub struct ProgramSink {
    program: String,
}

impl ProgramSink {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl NotifySink for ProgramSink {
    fn name(&self) -> &str {
        &self.program
    }

    fn notify(&self, message: &str) -> std::io::Result<()> {
        let status = Command::new(&self.program).arg(message).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(std::io::Error::other(format!(
                "`{}` exited with {status}",
                self.program
            )))
        }
    }
}

#[derive(Default)]
pub struct Notifier {
    format: String,
    sinks: Vec<Box<dyn NotifySink>>,
}

impl Notifier {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            sinks: Vec::new(),
        }
    }

    /// Sinks enabled by the configuration; escape sequences go to stdout.
    pub fn from_config(config: &Config) -> Self {
        let mut notifier = Self::new(config.notify_format.clone());
        if config.notify_screen {
            notifier.add_sink(Box::new(ScreenSink::new(Box::new(std::io::stdout()))));
        }
        if config.notify_xterm {
            notifier.add_sink(Box::new(XtermTitleSink::new(Box::new(std::io::stdout()))));
        }
        if let Some(program) = config.notify_program.as_deref().filter(|p| !p.is_empty()) {
            notifier.add_sink(Box::new(ProgramSink::new(program)));
        }
        notifier
    }

    pub fn add_sink(&mut self, sink: Box<dyn NotifySink>) {
        self.sinks.push(sink);
    }

    /// `%f` unread feeds, `%n` unread articles, `%d` article delta, `%D` feed
    /// delta.
    pub fn render(&self, before: &UnreadCounts, after: &UnreadCounts) -> String {
        let (feed_delta, article_delta) = after.delta_since(before);
        Template::new()
            .var('f', after.feeds)
            .var('n', after.articles)
            .var('d', article_delta)
            .var('D', feed_delta)
            .render(&self.format)
    }

    /// Notifies every sink when the counts moved. Returns whether anything
    /// was sent.
    pub fn notify_delta(&self, before: &UnreadCounts, after: &UnreadCounts) -> bool {
        if before == after {
            return false;
        }
        let message = self.render(before, after);
        self.dispatch(&message);
        true
    }

    pub fn dispatch(&self, message: &str) {
        for sink in &self.sinks {
            debug!(sink = sink.name(), "notifying");
            if let Err(e) = sink.notify(message) {
                warn!(sink = sink.name(), error = %e, "notification failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct FailingSink;

    impl NotifySink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }
        fn notify(&self, _message: &str) -> std::io::Result<()> {
            Err(std::io::Error::other("boom"))
        }
    }

    #[test]
    fn renders_counts_and_deltas() {
        let notifier = Notifier::new("%f feeds, %n articles (%D/%d)");
        let before = UnreadCounts { feeds: 1, articles: 5 };
        let after = UnreadCounts { feeds: 2, articles: 3 };
        assert_eq!(notifier.render(&before, &after), "2 feeds, 3 articles (1/-2)");
    }

    #[test]
    fn unchanged_counts_do_not_notify() {
        let buf = Buffer::default();
        let mut notifier = Notifier::new("%n");
        notifier.add_sink(Box::new(ScreenSink::new(Box::new(buf.clone()))));
        let counts = UnreadCounts { feeds: 1, articles: 1 };
        assert!(!notifier.notify_delta(&counts, &counts));
        assert!(buf.0.lock().unwrap().is_empty());
    }

    #[test]
    fn failing_sink_does_not_block_others() {
        let buf = Buffer::default();
        let mut notifier = Notifier::new("%n new");
        notifier.add_sink(Box::new(FailingSink));
        notifier.add_sink(Box::new(XtermTitleSink::new(Box::new(buf.clone()))));
        let sent = notifier.notify_delta(
            &UnreadCounts::default(),
            &UnreadCounts { feeds: 1, articles: 4 },
        );
        assert!(sent);
        assert_eq!(
            String::from_utf8(buf.0.lock().unwrap().clone()).unwrap(),
            "\x1b]2;4 new\x1b\\"
        );
    }

    #[test]
    fn missing_program_is_an_error() {
        let sink = ProgramSink::new("/nonexistent/feedctl-notify");
        assert!(sink.notify("hi").is_err());
    }
}
