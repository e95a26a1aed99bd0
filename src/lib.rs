//! # TetraDB Datalog Engine
//!
//! A Datalog query engine over an EAV (entity-attribute-value) triple store
//! with indexed storage. A client submits a declarative query in S-expression
//! syntax; the engine parses it, plans an execution strategy, and returns
//! tuples of bound variables (or aggregated results) by scanning indexes,
//! performing joins, applying predicates, and optionally aggregating.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Query Source
//!     ↓
//! [Parser]          → Query AST
//!     ↓
//! [Planner]         → Phased plan (ordering, pushdown, decorrelation)
//!     ↓
//! [Executor]        → Relations (joins, filters, expressions, subqueries)
//!     ↓                  ↑
//! [Pattern Matcher] ─────┘   index selection, range scans, key decoding
//!     ↓
//! [Storage]              ordered byte-keyed snapshot (EAVT/AEVT/AVET/VAET)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use tetradb::{Database, Value, Identity, Keyword};
//!
//! let db = Database::new();
//! db.transact(vec![
//!     (Identity::from_name("alice"), Keyword::new("user", "name"), Value::from("Alice")),
//!     (Identity::from_name("bob"), Keyword::new("user", "name"), Value::from("Bob")),
//! ]).unwrap();
//!
//! let result = db.q("[:find ?n :where [?e :user/name ?n]]", vec![]).unwrap();
//! assert_eq!(result.size(), Some(2));
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `value` | Typed values, content-addressed identities, interning pools |
//! | `datom` | The immutable `(E, A, V, Tx)` fact |
//! | `index` | Index permutations and the order-preserving key codec |
//! | `storage` | Byte-level storage contract + in-memory reference store |
//! | `query` | AST, surface-syntax parser, function registry |
//! | `relation` | Columns/tuples/relations and the join algorithms |
//! | `matcher` | Index-aware pattern realization with pushed constraints |
//! | `plan` | Phased planner: ordering, pushdown, decorrelation |
//! | `exec` | Plan execution, predicates, expressions, aggregation |
//! | `events` | Structured instrumentation stream and sinks |
//! | `context` | Per-query cancellation and event dispatch |
//! | `stats` | Attribute statistics for selectivity estimation |
//! | `config` | Hierarchical configuration (TOML + environment) |
//! | `db` | Embedded database facade |

pub mod config;
pub mod context;
pub mod datom;
pub mod db;
pub mod error;
pub mod events;
pub mod exec;
pub mod index;
pub mod matcher;
pub mod plan;
pub mod query;
pub mod relation;
pub mod stats;
pub mod storage;
pub mod value;

// Re-export the primary types
pub use config::Config;
pub use context::{CancelHandle, QueryContext};
pub use datom::{Datom, Position};
pub use db::{Database, Fact};
pub use error::{QueryError, Result};
pub use events::{CollectingSink, Event, EventSink, LogSink};
pub use exec::{AggregationMode, Executor, QueryInput};
pub use index::Index;
pub use matcher::{PatternMatcher, StorageConstraint, TimeComponent};
pub use plan::{Plan, Planner, PlannerOptions};
pub use query::{parse_query, parse_value, Query, Symbol};
pub use relation::{Columns, JoinKind, Relation, Tuple};
pub use stats::Statistics;
pub use storage::{KvStore, MemStore, Snapshot, StorageError};
pub use value::{Identity, Keyword, Value};
