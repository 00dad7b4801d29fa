//! Event sink injected into the pipeline.
//!
//! The library never prints.  Every progress message, header dump and
//! tolerated defect is handed to a [`Reporter`]; the binary plugs in
//! [`TracingReporter`], tests use [`MemoryReporter`].

use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info    => "info",
            Severity::Warning => "warning",
            Severity::Error   => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub severity: Severity,
    pub message:  String,
}

pub trait Reporter {
    fn report(&self, event: Event);
}

pub(crate) fn info(reporter: &dyn Reporter, message: impl Into<String>) {
    reporter.report(Event { severity: Severity::Info, message: message.into() });
}

pub(crate) fn warn(reporter: &dyn Reporter, message: impl Into<String>) {
    reporter.report(Event { severity: Severity::Warning, message: message.into() });
}

pub(crate) fn error(reporter: &dyn Reporter, message: impl Into<String>) {
    reporter.report(Event { severity: Severity::Error, message: message.into() });
}

// ── Implementations ──────────────────────────────────────────────────────────

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: Event) {
        match event.severity {
            Severity::Info    => tracing::info!("{}", event.message),
            Severity::Warning => tracing::warn!("{}", event.message),
            Severity::Error   => tracing::error!("{}", event.message),
        }
    }
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&self, _event: Event) {}
}

/// Keeps every event in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<Event>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn with_severity(&self, severity: Severity) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.severity == severity)
            .collect()
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, event: Event) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
