//! Query Context
//!
//! Per-query state threaded through planning and execution: a cooperative
//! cancellation flag, the query start instant, and the optional event sink.
//!
//! ## Design
//!
//! Cancellation uses an atomic flag shared across threads. Iterators check it
//! between tuple productions and surface [`QueryError::Cancelled`] promptly;
//! partially produced relations are discarded by the caller.

use crate::error::{QueryError, Result};
use crate::events::{Event, EventSink};
use serde_json::Value as Field;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Context carried by a running query.
#[derive(Clone)]
pub struct QueryContext {
    cancelled: Arc<AtomicBool>,
    started: Instant,
    sink: Option<Arc<dyn EventSink>>,
}

impl QueryContext {
    pub fn new() -> Self {
        QueryContext {
            cancelled: Arc::new(AtomicBool::new(false)),
            started: Instant::now(),
            sink: None,
        }
    }

    /// Context with an attached event sink.
    pub fn with_sink(sink: Arc<dyn EventSink>) -> Self {
        QueryContext {
            sink: Some(sink),
            ..QueryContext::new()
        }
    }

    /// Handle for cancelling this query from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    /// Cooperative cancellation check; called between tuple productions.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancelled.load(Ordering::Relaxed) {
            Err(QueryError::Cancelled {
                elapsed_ms: self.started.elapsed().as_millis() as u64,
            })
        } else {
            Ok(())
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// True when an event sink is attached. Callers gate field construction
    /// on this so instrumentation costs nothing otherwise.
    pub fn instrumented(&self) -> bool {
        self.sink.is_some()
    }

    /// Emit an event; no-op without a sink.
    pub fn emit(&self, name: &'static str, fields: Vec<(&'static str, Field)>) {
        if let Some(sink) = &self.sink {
            sink.handle(Event {
                name,
                elapsed: self.started.elapsed(),
                fields,
            });
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }
}

impl Default for QueryContext {
    fn default() -> Self {
        QueryContext::new()
    }
}

/// Handle for cancelling a query from another thread.
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingSink;

    #[test]
    fn test_not_cancelled_by_default() {
        let ctx = QueryContext::new();
        assert!(ctx.check_cancelled().is_ok());
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_cancel_through_handle() {
        let ctx = QueryContext::new();
        let handle = ctx.cancel_handle();
        handle.cancel();
        assert!(ctx.is_cancelled());
        assert!(matches!(
            ctx.check_cancelled(),
            Err(QueryError::Cancelled { .. })
        ));
    }

    #[test]
    fn test_emit_without_sink_is_noop() {
        let ctx = QueryContext::new();
        assert!(!ctx.instrumented());
        ctx.emit("query/complete", vec![]);
    }

    #[test]
    fn test_emit_with_sink() {
        let sink = Arc::new(CollectingSink::new());
        let ctx = QueryContext::with_sink(Arc::clone(&sink) as Arc<dyn crate::events::EventSink>);
        assert!(ctx.instrumented());
        ctx.emit("query/complete", vec![("rows", serde_json::json!(3))]);
        assert_eq!(sink.count("query/complete"), 1);
    }
}
