//! Database Facade
//!
//! Ties the layers together: accepts facts, allocates strictly monotonic
//! transaction ids, fans datoms out to all four indexes, and runs queries
//! against point-in-time snapshots.
//!
//! ## Snapshot discipline
//!
//! A query never sees writes committed after its snapshot was taken. The
//! executor is read-only; writers go through [`Database::transact`], which
//! holds the write lock only long enough to insert the encoded keys.

use crate::config::Config;
use crate::context::QueryContext;
use crate::error::Result;
use crate::events::EventSink;
use crate::exec::{Executor, QueryInput};
use crate::index::{encode_key, Index};
use crate::plan::{Plan, Planner, PlannerOptions};
use crate::query::{parse_query, Query};
use crate::relation::Relation;
use crate::stats::Statistics;
use crate::storage::{MemStore, Snapshot};
use crate::value::{Identity, Keyword, Value};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A fact to assert: entity, attribute, value.
pub type Fact = (Arc<Identity>, Arc<Keyword>, Value);

/// An embedded EAV database over the in-memory store.
pub struct Database {
    store: RwLock<MemStore>,
    stats: RwLock<Statistics>,
    next_tx: AtomicU64,
    options: PlannerOptions,
    sink: Option<Arc<dyn EventSink>>,
}

impl Database {
    pub fn new() -> Self {
        Database::with_options(PlannerOptions::default())
    }

    pub fn with_options(options: PlannerOptions) -> Self {
        Database {
            store: RwLock::new(MemStore::new()),
            stats: RwLock::new(Statistics::new()),
            next_tx: AtomicU64::new(0),
            options,
            sink: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Database::with_options(config.planner.clone().into())
    }

    /// Attach an event sink observed by every subsequent query.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Assert a batch of facts under one freshly allocated transaction id.
    /// Returns the transaction id.
    pub fn transact(&self, facts: Vec<Fact>) -> Result<u64> {
        let tx = self.next_tx.fetch_add(1, Ordering::SeqCst) + 1;
        let mut store = self.store.write();
        let mut stats = self.stats.write();
        for (e, a, v) in facts {
            stats.record(&a);
            let datom = crate::datom::Datom::new(e, a, v, tx);
            for index in Index::ALL {
                store.insert_key(index, encode_key(index, &datom)?);
            }
        }
        Ok(tx)
    }

    /// Highest committed transaction id.
    pub fn basis_tx(&self) -> u64 {
        self.next_tx.load(Ordering::SeqCst)
    }

    /// A read-only snapshot of the current state.
    pub fn snapshot(&self) -> Snapshot {
        self.store.read().snapshot(self.basis_tx())
    }

    /// Per-query context honoring the attached sink.
    pub fn query_context(&self) -> QueryContext {
        match &self.sink {
            Some(sink) => QueryContext::with_sink(Arc::clone(sink)),
            None => QueryContext::new(),
        }
    }

    /// Compile a query against current statistics.
    pub fn plan(&self, query: &Query, ctx: &QueryContext) -> Result<Plan> {
        let stats = self.stats.read().clone();
        Planner::with_stats(self.options.clone(), &stats).plan(query, ctx)
    }

    /// Parse, plan, and execute a query from its surface syntax.
    pub fn q(&self, source: &str, inputs: Vec<QueryInput>) -> Result<Relation> {
        let query = parse_query(source)?;
        self.q_query(&query, inputs)
    }

    /// Plan and execute an already parsed query.
    pub fn q_query(&self, query: &Query, inputs: Vec<QueryInput>) -> Result<Relation> {
        let ctx = self.query_context();
        self.q_with_context(query, inputs, &ctx)
    }

    /// Execute with a caller-provided context (cancellation, custom sink).
    pub fn q_with_context(
        &self,
        query: &Query,
        inputs: Vec<QueryInput>,
        ctx: &QueryContext,
    ) -> Result<Relation> {
        let span = tracing::debug_span!("query", basis_tx = self.basis_tx());
        let _guard = span.enter();

        let plan = self.plan(query, ctx)?;
        let snapshot = self.snapshot();
        let stats = self.stats.read().clone();
        let executor = Executor::with_stats(&snapshot, &stats);
        executor.execute(&plan, inputs, ctx)
    }
}

impl Default for Database {
    fn default() -> Self {
        Database::new()
    }
}
