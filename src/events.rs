//! # Instrumentation Events
//!
//! Every component of the pipeline reports what it did through a structured
//! event stream: plan creation, phase boundaries, scans, joins, filters,
//! expression evaluation, aggregation, and query completion. An event carries
//! a name, the latency since query start, and a map of well-known fields.
//!
//! Dispatch is zero-cost when no sink is attached: callers check
//! [`QueryContext::instrumented`](crate::context::QueryContext::instrumented)
//! before building field maps.

use parking_lot::Mutex;
use serde_json::Value as Field;
use std::fmt;
use std::time::Duration;

/// A single instrumentation event.
#[derive(Debug, Clone)]
pub struct Event {
    /// Event name, e.g. `pattern/match` or `join/hash`
    pub name: &'static str,
    /// Latency from query start
    pub elapsed: Duration,
    /// Structural fields (sizes, durations, chosen index, ...)
    pub fields: Vec<(&'static str, Field)>,
}

impl Event {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:>8.3}ms] {}", self.elapsed.as_secs_f64() * 1e3, self.name)?;
        for (name, value) in &self.fields {
            write!(f, " {name}={value}")?;
        }
        Ok(())
    }
}

/// Receiver for instrumentation events.
///
/// Events have no lifetime obligations beyond the call; sinks that need them
/// later must copy.
pub trait EventSink: Send + Sync {
    fn handle(&self, event: Event);
}

/// Stores events in arrival order for later inspection. The sink used by
/// tests to assert which plan steps actually ran.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<Event>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        CollectingSink::default()
    }

    /// All events received so far, in order.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Events with the given name, in order.
    pub fn named(&self, name: &str) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name == name).count()
    }
}

impl EventSink for CollectingSink {
    fn handle(&self, event: Event) {
        self.events.lock().push(event);
    }
}

/// Renders events through `tracing` at debug level. The human formatter for
/// interactive use.
#[derive(Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn handle(&self, event: Event) {
        tracing::debug!(target: "tetradb::events", "{event}");
    }
}
