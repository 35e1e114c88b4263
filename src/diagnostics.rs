//! Diagnostics sink for the resolution engine.
//!
//! The engine never logs directly; it reports through a [`Diagnostics`]
//! implementation handed to it at construction. Production code uses
//! [`TracingDiagnostics`]; tests use [`RecordingDiagnostics`] to assert on
//! exactly what was reported.

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

/// Severity of a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Verbose tracing of cache and shape decisions
    Debug,
    /// Progress
    Info,
    /// Recoverable problems (missing or mistyped fields)
    Warn,
    /// Bundle failures
    Error,
}

/// One diagnostic event, scoped to a bundle.
///
/// Events never carry secret values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Bundle being resolved (or the on-demand bundle name)
    pub bundle: String,
    /// Secret path involved, if any
    pub path: Option<String>,
    /// Field involved, if any
    pub field: Option<String>,
    /// Human-readable message
    pub message: String,
}

impl Event {
    /// Create an event for `bundle`.
    pub fn new(bundle: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            bundle: bundle.into(),
            path: None,
            field: None,
            message: message.into(),
        }
    }

    /// Attach the secret path.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attach the field name.
    #[must_use]
    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// Receiver of engine diagnostics.
pub trait Diagnostics: Send + Sync {
    /// Verbose detail.
    fn debug(&self, event: Event);
    /// Progress.
    fn info(&self, event: Event);
    /// Recoverable problem.
    fn warn(&self, event: Event);
    /// Bundle-level failure.
    fn error(&self, event: Event);
}

/// Forwards events to `tracing` with structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn debug(&self, e: Event) {
        debug!(bundle = %e.bundle, path = e.path.as_deref(), field = e.field.as_deref(), "{}", e.message);
    }

    fn info(&self, e: Event) {
        info!(bundle = %e.bundle, path = e.path.as_deref(), field = e.field.as_deref(), "{}", e.message);
    }

    fn warn(&self, e: Event) {
        warn!(bundle = %e.bundle, path = e.path.as_deref(), field = e.field.as_deref(), "{}", e.message);
    }

    fn error(&self, e: Event) {
        error!(bundle = %e.bundle, path = e.path.as_deref(), field = e.field.as_deref(), "{}", e.message);
    }
}

/// Captures events in memory.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    events: Mutex<Vec<(Level, Event)>>,
}

impl RecordingDiagnostics {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded event, in order.
    #[must_use]
    pub fn events(&self) -> Vec<(Level, Event)> {
        self.events.lock().clone()
    }

    /// Events recorded at `level`.
    #[must_use]
    pub fn at(&self, level: Level) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// Shorthand for `at(Level::Warn)`.
    #[must_use]
    pub fn warnings(&self) -> Vec<Event> {
        self.at(Level::Warn)
    }

    fn record(&self, level: Level, event: Event) {
        self.events.lock().push((level, event));
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn debug(&self, event: Event) {
        self.record(Level::Debug, event);
    }

    fn info(&self, event: Event) {
        self.record(Level::Info, event);
    }

    fn warn(&self, event: Event) {
        self.record(Level::Warn, event);
    }

    fn error(&self, event: Event) {
        self.record(Level::Error, event);
    }
}
