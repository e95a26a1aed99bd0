//! # Relation Algebra
//!
//! The intermediate data structure of the executor: an ordered set of tuples
//! over a named column vector. Relations come in two variants:
//!
//! - **materialized** — backed by a concrete tuple vector; iteration is
//!   restartable and `len` is known;
//! - **lazy** — backed by a one-shot producer (typically an index scan).
//!   Consuming a lazy relation moves it, so a second iteration is
//!   unrepresentable; call [`Relation::materialize`] first to keep the data.
//!
//! A relation also carries an optional *sort key*: the column prefix its
//! tuples are known to be ordered by. The matcher sets it when scan order
//! matches output order, `sorted()` sets it to the full column list, and the
//! merge join requires it on both inputs.

pub mod join;

pub use join::{join, select_join_kind, JoinKind, JoinOutcome};

use crate::context::QueryContext;
use crate::error::{QueryError, Result};
use crate::query::ast::{Direction, Symbol};
use crate::value::Value;
use std::cmp::Ordering;
use std::fmt;

/// An ordered tuple of values; its schema lives in the owning relation.
pub type Tuple = Vec<Value>;

/// A streaming tuple source. Single-owner, consumed at most once.
pub type TupleStream = Box<dyn Iterator<Item = Result<Tuple>> + Send>;

/// One-shot producer backing a lazy relation.
pub type Producer = Box<dyn FnOnce() -> Result<TupleStream> + Send>;

/// An ordered column vector without duplicates.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Columns(Vec<Symbol>);

impl Columns {
    /// Build a column vector, rejecting duplicate names.
    pub fn new(symbols: Vec<Symbol>) -> Result<Columns> {
        for (i, sym) in symbols.iter().enumerate() {
            if symbols[..i].contains(sym) {
                return Err(QueryError::Validation(format!(
                    "duplicate column '{sym}' in relation schema"
                )));
            }
        }
        Ok(Columns(symbols))
    }

    pub fn empty() -> Columns {
        Columns(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Symbol] {
        &self.0
    }

    pub fn index_of(&self, symbol: &Symbol) -> Option<usize> {
        self.0.iter().position(|s| s == symbol)
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.0.contains(symbol)
    }

    /// Columns present in both, in self's order.
    pub fn intersection(&self, other: &Columns) -> Vec<Symbol> {
        self.0
            .iter()
            .filter(|s| other.contains(s))
            .cloned()
            .collect()
    }

    /// Self's columns followed by columns only in `other`.
    pub fn union(&self, other: &Columns) -> Columns {
        let mut out = self.0.clone();
        for sym in &other.0 {
            if !out.contains(sym) {
                out.push(sym.clone());
            }
        }
        Columns(out)
    }
}

impl fmt::Debug for Columns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, s) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{s}")?;
        }
        write!(f, "]")
    }
}

enum Body {
    Materialized(Vec<Tuple>),
    Lazy(Producer),
}

/// An ordered set of tuples over a named column vector.
pub struct Relation {
    columns: Columns,
    body: Body,
    sorted_by: Option<Vec<Symbol>>,
}

impl Relation {
    /// A materialized relation. Every tuple's arity must equal the column
    /// count.
    pub fn materialized(columns: Columns, tuples: Vec<Tuple>) -> Result<Relation> {
        let arity = columns.len();
        if let Some(bad) = tuples.iter().find(|t| t.len() != arity) {
            return Err(QueryError::Internal(format!(
                "tuple arity {} does not match column count {arity}",
                bad.len()
            )));
        }
        Ok(Relation {
            columns,
            body: Body::Materialized(tuples),
            sorted_by: None,
        })
    }

    /// An empty relation over the given columns.
    pub fn empty(columns: Columns) -> Relation {
        Relation {
            columns,
            body: Body::Materialized(Vec::new()),
            sorted_by: None,
        }
    }

    /// A lazy relation backed by a one-shot producer.
    pub fn lazy(columns: Columns, producer: Producer) -> Relation {
        Relation {
            columns,
            body: Body::Lazy(producer),
            sorted_by: None,
        }
    }

    /// Record the column prefix this relation is known to be ordered by.
    pub fn with_sort_key(mut self, sorted_by: Vec<Symbol>) -> Relation {
        self.sorted_by = Some(sorted_by);
        self
    }

    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    /// The sort key, if the relation is known ordered.
    pub fn sort_key(&self) -> Option<&[Symbol]> {
        self.sorted_by.as_deref()
    }

    /// Tuple count; `None` until materialized.
    pub fn size(&self) -> Option<usize> {
        match &self.body {
            Body::Materialized(tuples) => Some(tuples.len()),
            Body::Lazy(_) => None,
        }
    }

    pub fn is_materialized(&self) -> bool {
        matches!(self.body, Body::Materialized(_))
    }

    /// Borrow the tuples of a materialized relation.
    pub fn rows(&self) -> Result<&[Tuple]> {
        match &self.body {
            Body::Materialized(tuples) => Ok(tuples),
            Body::Lazy(_) => Err(QueryError::Internal(
                "lazy relation accessed without materialization".to_string(),
            )),
        }
    }

    /// Consume the relation into a single-pass tuple stream.
    ///
    /// Consuming moves the relation, so a lazy producer can never run twice.
    pub fn into_stream(self) -> Result<(Columns, TupleStream)> {
        let columns = self.columns;
        let stream: TupleStream = match self.body {
            Body::Materialized(tuples) => Box::new(tuples.into_iter().map(Ok)),
            Body::Lazy(producer) => producer()?,
        };
        Ok((columns, stream))
    }

    /// Realize a lazy relation into a materialized one, checking for
    /// cancellation between tuple productions. Materialized relations pass
    /// through unchanged.
    pub fn materialize(self, ctx: &QueryContext) -> Result<Relation> {
        if self.is_materialized() {
            return Ok(self);
        }
        let sorted_by = self.sorted_by.clone();
        let (columns, stream) = self.into_stream()?;
        let mut tuples = Vec::new();
        for item in stream {
            ctx.check_cancelled()?;
            tuples.push(item?);
        }
        Ok(Relation {
            columns,
            body: Body::Materialized(tuples),
            sorted_by,
        })
    }

    /// A deterministically ordered materialization: tuples sorted by the
    /// total value order across all columns. Used for equality-testing and
    /// display.
    pub fn sorted(self, ctx: &QueryContext) -> Result<Relation> {
        let materialized = self.materialize(ctx)?;
        let columns = materialized.columns.clone();
        let mut tuples = match materialized.body {
            Body::Materialized(tuples) => tuples,
            Body::Lazy(_) => unreachable!("materialize returned lazy"),
        };
        tuples.sort();
        let key = columns.as_slice().to_vec();
        Ok(Relation {
            columns,
            body: Body::Materialized(tuples),
            sorted_by: Some(key),
        })
    }

    /// Stable sort by order-by specs (column index, direction).
    pub fn order_by(&mut self, specs: &[(usize, Direction)]) -> Result<()> {
        let tuples = match &mut self.body {
            Body::Materialized(tuples) => tuples,
            Body::Lazy(_) => {
                return Err(QueryError::Internal(
                    "order-by over an unmaterialized relation".to_string(),
                ))
            }
        };
        tuples.sort_by(|a, b| {
            for (idx, direction) in specs {
                let ord = a[*idx].cmp(&b[*idx]);
                let ord = match direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        self.sorted_by = None;
        Ok(())
    }

    /// Project to a subset of columns (by name), cloning the selected values.
    pub fn project(&self, keep: &[Symbol]) -> Result<Relation> {
        let indices: Vec<usize> = keep
            .iter()
            .map(|sym| {
                self.columns
                    .index_of(sym)
                    .ok_or_else(|| QueryError::Resolution(sym.as_str().to_string()))
            })
            .collect::<Result<_>>()?;
        let rows = self.rows()?;
        let tuples = rows
            .iter()
            .map(|t| indices.iter().map(|&i| t[i].clone()).collect())
            .collect();
        Relation::materialized(Columns::new(keep.to_vec())?, tuples)
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            Body::Materialized(tuples) => f
                .debug_struct("Relation")
                .field("columns", &self.columns)
                .field("size", &tuples.len())
                .finish(),
            Body::Lazy(_) => f
                .debug_struct("Relation")
                .field("columns", &self.columns)
                .field("size", &"lazy")
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Columns {
        Columns::new(names.iter().map(|n| Symbol::new(*n)).collect()).expect("columns")
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let err = Columns::new(vec![Symbol::new("?a"), Symbol::new("?a")]).unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }

    #[test]
    fn test_arity_mismatch_rejected() {
        let err =
            Relation::materialized(cols(&["?a", "?b"]), vec![vec![Value::Int64(1)]]).unwrap_err();
        assert!(matches!(err, QueryError::Internal(_)));
    }

    #[test]
    fn test_lazy_realizes_once() {
        let rel = Relation::lazy(
            cols(&["?a"]),
            Box::new(|| {
                let stream: TupleStream =
                    Box::new(vec![vec![Value::Int64(1)], vec![Value::Int64(2)]].into_iter().map(Ok));
                Ok(stream)
            }),
        );
        let ctx = QueryContext::new();
        let materialized = rel.materialize(&ctx).expect("materialize");
        assert_eq!(materialized.size(), Some(2));
        // rows() is now restartable
        assert_eq!(materialized.rows().expect("rows").len(), 2);
        assert_eq!(materialized.rows().expect("rows").len(), 2);
    }

    #[test]
    fn test_cancelled_materialization() {
        let ctx = QueryContext::new();
        ctx.cancel_handle().cancel();
        let rel = Relation::lazy(
            cols(&["?a"]),
            Box::new(|| {
                let stream: TupleStream = Box::new(vec![vec![Value::Int64(1)]].into_iter().map(Ok));
                Ok(stream)
            }),
        );
        assert!(matches!(
            rel.materialize(&ctx),
            Err(QueryError::Cancelled { .. })
        ));
    }

    #[test]
    fn test_sorted_is_deterministic() {
        let ctx = QueryContext::new();
        let make = |order: &[i64]| {
            Relation::materialized(
                cols(&["?a"]),
                order.iter().map(|&i| vec![Value::Int64(i)]).collect(),
            )
            .expect("relation")
        };
        let a = make(&[3, 1, 2]).sorted(&ctx).expect("sorted");
        let b = make(&[2, 3, 1]).sorted(&ctx).expect("sorted");
        assert_eq!(a.rows().expect("rows"), b.rows().expect("rows"));
        assert!(a.sort_key().is_some());
    }

    #[test]
    fn test_order_by_directions() {
        let mut rel = Relation::materialized(
            cols(&["?a", "?b"]),
            vec![
                vec![Value::Int64(1), Value::from("x")],
                vec![Value::Int64(2), Value::from("y")],
                vec![Value::Int64(1), Value::from("y")],
            ],
        )
        .expect("relation");
        rel.order_by(&[(0, Direction::Desc), (1, Direction::Asc)])
            .expect("order");
        let rows = rel.rows().expect("rows");
        assert_eq!(rows[0][0], Value::Int64(2));
        assert_eq!(rows[1], vec![Value::Int64(1), Value::from("x")]);
    }

    #[test]
    fn test_project() {
        let rel = Relation::materialized(
            cols(&["?a", "?b"]),
            vec![vec![Value::Int64(1), Value::from("x")]],
        )
        .expect("relation");
        let projected = rel.project(&[Symbol::new("?b")]).expect("project");
        assert_eq!(projected.rows().expect("rows"), &[vec![Value::from("x")]]);
    }

    #[test]
    fn test_project_unknown_column_is_resolution_error() {
        let rel = Relation::materialized(cols(&["?a"]), vec![]).expect("relation");
        assert!(matches!(
            rel.project(&[Symbol::new("?zzz")]),
            Err(QueryError::Resolution(_))
        ));
    }
}
