//! Query Engine Error Types
//!
//! Every failure mode of the parse/plan/execute pipeline is a variant here.
//! Parse and validation errors are reported before execution begins; all
//! other variants abort the running query and surface to the caller with the
//! failing phase identified. Partial results are never returned.

use crate::storage::StorageError;
use thiserror::Error;

/// Errors produced by the query engine
#[derive(Error, Debug)]
pub enum QueryError {
    /// Malformed surface syntax
    #[error("parse error at {line}:{column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    /// Structurally invalid query (unknown function, wrong arity,
    /// unbound find/order-by variable, duplicate column)
    #[error("validation error: {0}")]
    Validation(String),

    /// A predicate or expression referenced a symbol absent from its input tuple
    #[error("cannot resolve '{0}' in input relation")]
    Resolution(String),

    /// An operation received an incompatible value variant
    #[error("type error: expected {expected}, got {got}")]
    Type {
        expected: &'static str,
        got: &'static str,
    },

    /// Propagated from the key-value layer
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The query's context was cancelled
    #[error("query cancelled after {elapsed_ms}ms")]
    Cancelled { elapsed_ms: u64 },

    /// Corrupted key, arity mismatch, or other broken invariant; fatal for the query
    #[error("internal invariant violation: {0}")]
    Internal(String),

    /// Wraps any of the above with the plan phase that was executing
    #[error("query failed in phase '{phase}': {source}")]
    InPhase {
        phase: String,
        #[source]
        source: Box<QueryError>,
    },
}

impl QueryError {
    /// Attach the failing phase to an execution error.
    ///
    /// Parse and validation errors are reported before any phase runs, so
    /// they pass through unchanged.
    pub fn in_phase(self, phase: &str) -> Self {
        match self {
            QueryError::Parse { .. } | QueryError::Validation(_) | QueryError::InPhase { .. } => {
                self
            }
            other => QueryError::InPhase {
                phase: phase.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, unwrapping any phase attribution.
    pub fn root(&self) -> &QueryError {
        match self {
            QueryError::InPhase { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type for query operations
pub type Result<T> = std::result::Result<T, QueryError>;
