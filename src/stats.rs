//! Attribute statistics and selectivity estimation for pattern ordering.
//!
//! Tracks per-attribute datom counts. The planner consults these to estimate
//! per-pattern cardinality before reordering; when no statistics are
//! available it falls back to fixed heuristics.

use crate::value::Keyword;
use std::collections::HashMap;
use std::sync::Arc;

/// Cardinality assumed for an attribute nobody has analyzed.
pub const DEFAULT_ATTRIBUTE_CARDINALITY: usize = 1_000;

/// Per-attribute statistics over the committed datoms.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    /// Datom count per attribute (canonical keyword form)
    counts: HashMap<String, usize>,
    /// Total committed datoms
    total: usize,
}

impl Statistics {
    pub fn new() -> Self {
        Statistics::default()
    }

    /// Record one committed datom for an attribute.
    pub fn record(&mut self, attribute: &Arc<Keyword>) {
        *self
            .counts
            .entry(attribute.canonical().to_string())
            .or_insert(0) += 1;
        self.total += 1;
    }

    /// Datom count for an attribute; `None` when never seen.
    pub fn attribute_count(&self, attribute: &Arc<Keyword>) -> Option<usize> {
        self.counts.get(attribute.canonical()).copied()
    }

    /// Estimated cardinality of a scan over one attribute, falling back to
    /// the default heuristic when unknown.
    pub fn estimate_attribute(&self, attribute: &Arc<Keyword>) -> usize {
        self.attribute_count(attribute)
            .unwrap_or(DEFAULT_ATTRIBUTE_CARDINALITY)
    }

    /// Total committed datoms.
    pub fn total(&self) -> usize {
        self.total
    }
}
