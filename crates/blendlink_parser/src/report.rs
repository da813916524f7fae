//! Injected diagnostics sink
//!
//! Advisory diagnostics (missing members, misaligned structs, duplicate
//! addresses) flow through a [`Report`] implementation supplied to the
//! loader at construction time. Diagnostics never change control flow;
//! fatal conditions are returned as errors instead.

use log::{debug, error, info, trace, warn};

/// Severity levels for diagnostics, from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Sink for advisory diagnostics emitted during parsing, linking and
/// relocation.
pub trait Report {
    fn message(&self, severity: Severity, text: &str);

    fn trace(&self, text: &str) {
        self.message(Severity::Trace, text);
    }

    fn info(&self, text: &str) {
        self.message(Severity::Info, text);
    }

    fn warn(&self, text: &str) {
        self.message(Severity::Warn, text);
    }
}

/// Default sink: forwards everything to the `log` crate
#[derive(Debug, Default)]
pub struct LogReport;

impl Report for LogReport {
    fn message(&self, severity: Severity, text: &str) {
        match severity {
            Severity::Trace => trace!("{text}"),
            Severity::Debug => debug!("{text}"),
            Severity::Info => info!("{text}"),
            Severity::Warn => warn!("{text}"),
            Severity::Error => error!("{text}"),
        }
    }
}

/// Sink that discards every diagnostic
#[derive(Debug, Default)]
pub struct NullReport;

impl Report for NullReport {
    fn message(&self, _severity: Severity, _text: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Capture(Mutex<Vec<(Severity, String)>>);

    impl Report for Capture {
        fn message(&self, severity: Severity, text: &str) {
            self.0.lock().unwrap().push((severity, text.to_string()));
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Trace < Severity::Debug);
        assert!(Severity::Warn < Severity::Error);
    }

    #[test]
    fn test_capture_sink() {
        let sink = Capture(Mutex::new(Vec::new()));
        sink.warn("misaligned struct");
        sink.trace("member skipped");

        let messages = sink.0.lock().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].0, Severity::Warn);
        assert_eq!(messages[1].1, "member skipped");
    }
}
