//! Logger collaborator seam
//!
//! The core emits log events through this trait; rendering is out of scope.
//! The default implementation forwards to `tracing`, so a subscriber decides
//! formatting and destination.

use std::fmt::Debug;
use tracing::{error, info, warn};

/// Structured log sink consumed by the router and logging middleware.
pub trait Logger: Send + Sync + Debug {
    /// Informational event.
    fn info(&self, message: &str);

    /// Recoverable anomaly.
    fn warn(&self, message: &str);

    /// Failure worth operator attention.
    fn error(&self, message: &str);
}

/// Default logger backed by the `tracing` macros.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger;

impl TracingLogger {
    /// Creates the tracing-backed logger.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Logger for TracingLogger {
    fn info(&self, message: &str) {
        info!(target: "switchboard", "{message}");
    }

    fn warn(&self, message: &str) {
        warn!(target: "switchboard", "{message}");
    }

    fn error(&self, message: &str) {
        error!(target: "switchboard", "{message}");
    }
}

/// Logger that discards everything. Useful in tests asserting behavior that
/// must not depend on logging.
#[derive(Debug, Clone, Default)]
pub struct NullLogger;

impl NullLogger {
    /// Creates the discarding logger.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Logger for NullLogger {
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Test logger that records every event for assertions.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    events: std::sync::Mutex<Vec<(LogLevel, String)>>,
}

/// Severity recorded by [`RecordingLogger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Info event.
    Info,
    /// Warning event.
    Warn,
    /// Error event.
    Error,
}

impl RecordingLogger {
    /// Creates an empty recording logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<(LogLevel, String)> {
        self.events.lock().expect("logger lock poisoned").clone()
    }
}

impl Logger for RecordingLogger {
    fn info(&self, message: &str) {
        self.events
            .lock()
            .expect("logger lock poisoned")
            .push((LogLevel::Info, message.to_string()));
    }

    fn warn(&self, message: &str) {
        self.events
            .lock()
            .expect("logger lock poisoned")
            .push((LogLevel::Warn, message.to_string()));
    }

    fn error(&self, message: &str) {
        self.events
            .lock()
            .expect("logger lock poisoned")
            .push((LogLevel::Error, message.to_string()));
    }
}
