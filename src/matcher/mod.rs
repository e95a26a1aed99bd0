//! # Index-Aware Pattern Matcher
//!
//! Realizes a data pattern into a relation by selecting the index whose
//! leading key components cover the most bound positions, scanning one
//! contiguous key range per distinct input binding, and decoding datoms
//! straight out of the self-describing keys.
//!
//! ## Binding application
//!
//! When an input binding relation shares variables with the pattern, the
//! matcher iterates its distinct shared-value rows in key order as the outer
//! side. Each row narrows the scan range; the narrowed range reuses the open
//! cursor via a forward seek whenever the new start lies ahead of the
//! cursor's position, and reopens otherwise. Reuse never advances backward.
//! Bindings that share no variable with the pattern do not narrow anything:
//! exactly one cursor is opened regardless of the binding relation's size.
//!
//! ## Pushed constraints
//!
//! Storage constraints are evaluated against the decoded V component before
//! tuple construction, dropping exactly the tuples the equivalent
//! post-realization predicate would drop.

pub mod constraints;

pub use constraints::{StorageConstraint, TimeComponent};

use crate::context::QueryContext;
use crate::datom::Position;
use crate::error::{QueryError, Result};
use crate::index::{decode_key, encode_prefix_range, Index};
use crate::query::ast::{Pattern, PatternElem, Symbol};
use crate::relation::{Columns, Relation, Tuple};
use crate::storage::{Cursor, KvStore};
use crate::value::Value;
use serde_json::json;
use std::collections::BTreeSet;

/// How one datom position relates to the pattern and bindings.
#[derive(Debug, Clone)]
enum PosSource {
    /// Pattern carries a constant here
    Const(Value),
    /// Pattern variable also present in the input bindings
    Shared { combo_idx: usize, out_idx: usize },
    /// Pattern variable bound only by the scan
    Free { out_idx: usize },
    /// Repeated variable; must equal the value at its first occurrence
    Dup { out_idx: usize },
    Blank,
}

impl PosSource {
    fn is_bound(&self) -> bool {
        matches!(self, PosSource::Const(_) | PosSource::Shared { .. })
    }
}

/// Pattern matcher over a read-only storage snapshot.
pub struct PatternMatcher<'s, S: KvStore> {
    store: &'s S,
}

impl<'s, S: KvStore> PatternMatcher<'s, S> {
    pub fn new(store: &'s S) -> Self {
        PatternMatcher { store }
    }

    /// `match(pattern, input_bindings?) → relation`
    pub fn matches(
        &self,
        pattern: &Pattern,
        bindings: Option<&Relation>,
        ctx: &QueryContext,
    ) -> Result<Relation> {
        self.matches_with_constraints(pattern, bindings, &[], ctx)
    }

    /// Pattern realization with storage-pushed constraints on the V position.
    pub fn matches_with_constraints(
        &self,
        pattern: &Pattern,
        bindings: Option<&Relation>,
        constraints: &[StorageConstraint],
        ctx: &QueryContext,
    ) -> Result<Relation> {
        if pattern.elems.len() != 3 && pattern.elems.len() != 4 {
            return Err(QueryError::Internal(format!(
                "pattern arity {} reached the matcher",
                pattern.elems.len()
            )));
        }

        let (sources, out_syms, shared_syms) = classify(pattern, bindings);

        let bound_at = |pos: Position| {
            source_at(&sources, pos).is_some_and(PosSource::is_bound)
        };
        let index = select_index(&bound_at);

        // Leading bound positions of the selected index form the scan prefix
        let prefix_positions: Vec<Position> = index
            .positions()
            .iter()
            .copied()
            .take_while(|p| bound_at(*p))
            .collect();
        let prefix_len = prefix_positions.len();

        // Bound positions outside the prefix become per-datom checks
        let residual_positions: Vec<Position> = Position::ALL
            .iter()
            .copied()
            .filter(|p| {
                source_at(&sources, *p).is_some_and(PosSource::is_bound)
                    && !prefix_positions.contains(p)
            })
            .collect();

        // Distinct shared-value rows, iterated in key order so cursor reuse
        // only ever seeks forward
        let combos: Vec<Vec<Value>> = match (&shared_syms[..], bindings) {
            ([], _) => vec![Vec::new()],
            (shared, Some(rel)) => {
                let indices: Vec<usize> = shared
                    .iter()
                    .map(|sym| {
                        rel.columns()
                            .index_of(sym)
                            .ok_or_else(|| QueryError::Resolution(sym.as_str().to_string()))
                    })
                    .collect::<Result<_>>()?;
                let distinct: BTreeSet<Vec<Value>> = rel
                    .rows()?
                    .iter()
                    .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                    .collect();
                distinct.into_iter().collect()
            }
            (_, None) => unreachable!("shared symbols require bindings"),
        };

        // Wide cursor span: the range of the constant-only leading prefix.
        // Every per-combo range is a sub-range of it.
        let const_prefix: Vec<Value> = index
            .positions()
            .iter()
            .map_while(|p| match source_at(&sources, *p) {
                Some(PosSource::Const(v)) => Some(v.clone()),
                _ => None,
            })
            .collect();
        let (_, wide_end) = encode_prefix_range(index, &const_prefix)?;

        let mut cursor: Option<Box<dyn Cursor + '_>> = None;
        let mut cursors_opened: u64 = 0;
        let mut tuples: Vec<Tuple> = Vec::new();

        for combo in &combos {
            let prefix_values: Vec<Value> = prefix_positions
                .iter()
                .map(|p| match source_at(&sources, *p) {
                    Some(PosSource::Const(v)) => v.clone(),
                    Some(PosSource::Shared { combo_idx, .. }) => combo[*combo_idx].clone(),
                    _ => unreachable!("prefix positions are bound"),
                })
                .collect();
            let (start, end) = encode_prefix_range(index, &prefix_values)?;

            // Iterator-reuse rule: forward seek only; a cursor already at or
            // past the new start must be reopened
            let reusable = cursor
                .as_ref()
                .is_some_and(|c| c.position().is_none_or(|p| p < start.as_slice()));
            if reusable {
                if let Some(c) = cursor.as_mut() {
                    c.seek(&start)?;
                }
            } else {
                if let Some(mut stale) = cursor.take() {
                    stale.close();
                }
                cursor = Some(self.store.scan(index, &start, &wide_end)?);
                cursors_opened += 1;
            }
            let c = cursor.as_mut().expect("cursor just ensured");

            'scan: while let Some(key) = c.next_key()? {
                if !end.is_empty() && key.as_slice() >= end.as_slice() {
                    break;
                }
                ctx.check_cancelled()?;
                let datom = decode_key(index, &key)?;

                for pos in &residual_positions {
                    let expected = match source_at(&sources, *pos) {
                        Some(PosSource::Const(v)) => v.clone(),
                        Some(PosSource::Shared { combo_idx, .. }) => combo[*combo_idx].clone(),
                        _ => unreachable!("residual positions are bound"),
                    };
                    if datom.component(*pos) != expected {
                        continue 'scan;
                    }
                }

                for constraint in constraints {
                    if !constraint.matches(&datom.v)? {
                        continue 'scan;
                    }
                }

                let mut tuple: Tuple = vec![Value::Bool(false); out_syms.len()];
                for pos in Position::ALL {
                    match source_at(&sources, pos) {
                        Some(PosSource::Shared { out_idx, .. })
                        | Some(PosSource::Free { out_idx }) => {
                            tuple[*out_idx] = datom.component(pos);
                        }
                        _ => {}
                    }
                }
                for pos in Position::ALL {
                    if let Some(PosSource::Dup { out_idx }) = source_at(&sources, pos) {
                        if datom.component(pos) != tuple[*out_idx] {
                            continue 'scan;
                        }
                    }
                }
                tuples.push(tuple);
            }
        }

        if let Some(mut c) = cursor.take() {
            c.close();
        }

        // a pattern of nothing but constants is an existence check
        if out_syms.is_empty() {
            tuples.truncate(1);
        }

        if ctx.instrumented() {
            let bound_summary: String = Position::ALL
                .iter()
                .map(|p| if bound_at(*p) { p.label().chars().next().expect("label") } else { '-' })
                .collect();
            ctx.emit(
                "pattern/match",
                vec![
                    ("pattern", json!(pattern.to_string())),
                    ("index", json!(index.name())),
                    ("prefix", json!(prefix_len)),
                    ("bound", json!(bound_summary)),
                    ("cursors", json!(cursors_opened)),
                    ("tuples", json!(tuples.len())),
                    ("constraints", json!(constraints.len())),
                ],
            );
        }

        let columns = Columns::new(out_syms.clone())?;
        let mut relation = Relation::materialized(columns, tuples)?;
        if combos.len() == 1 {
            let sort_key = scan_order_key(&sources, &out_syms, index);
            if !sort_key.is_empty() {
                relation = relation.with_sort_key(sort_key);
            }
        }
        Ok(relation)
    }
}

/// Classify each pattern position against the binding columns. Returns the
/// per-position sources, the output column symbols (pattern variables in
/// position order), and the shared symbols (in first-occurrence order).
fn classify(
    pattern: &Pattern,
    bindings: Option<&Relation>,
) -> (Vec<(Position, PosSource)>, Vec<Symbol>, Vec<Symbol>) {
    let mut sources = Vec::with_capacity(4);
    let mut out_syms: Vec<Symbol> = Vec::new();
    let mut shared_syms: Vec<Symbol> = Vec::new();

    for (i, position) in Position::ALL.iter().enumerate() {
        let Some(elem) = pattern.elems.get(i) else {
            break;
        };
        let source = match elem {
            PatternElem::Constant(v) => PosSource::Const(v.clone()),
            PatternElem::Blank => PosSource::Blank,
            PatternElem::Variable(sym) => {
                if let Some(out_idx) = out_syms.iter().position(|s| s == sym) {
                    PosSource::Dup { out_idx }
                } else {
                    let out_idx = out_syms.len();
                    out_syms.push(sym.clone());
                    let in_bindings =
                        bindings.is_some_and(|rel| rel.columns().contains(sym));
                    if in_bindings {
                        let combo_idx = shared_syms.len();
                        shared_syms.push(sym.clone());
                        PosSource::Shared { combo_idx, out_idx }
                    } else {
                        PosSource::Free { out_idx }
                    }
                }
            }
        };
        sources.push((*position, source));
    }
    (sources, out_syms, shared_syms)
}

fn source_at(sources: &[(Position, PosSource)], pos: Position) -> Option<&PosSource> {
    sources
        .iter()
        .find(|(p, _)| *p == pos)
        .map(|(_, source)| source)
}

/// Select the index whose leading components cover the most bound positions.
/// Tie-break: a bound secondary component, then EAVT-first preference order.
fn select_index(bound_at: &dyn Fn(Position) -> bool) -> Index {
    let preference = |index: Index| match index {
        Index::Eavt => 3u8,
        Index::Aevt => 2,
        Index::Avet => 1,
        Index::Vaet => 0,
    };

    let mut best = Index::Eavt;
    let mut best_score = (0usize, false, 0u8);
    for index in Index::ALL {
        let positions = index.positions();
        let prefix_len = positions.iter().take_while(|p| bound_at(**p)).count();
        let score = (prefix_len, bound_at(positions[1]), preference(index));
        if score > best_score {
            best = index;
            best_score = score;
        }
    }
    best
}

/// Output columns known to follow scan order for a single-cursor scan:
/// variables in index component order, up to the first blank position.
/// Constant positions are fixed across the scan and do not break ordering.
fn scan_order_key(
    sources: &[(Position, PosSource)],
    out_syms: &[Symbol],
    index: Index,
) -> Vec<Symbol> {
    let mut key = Vec::new();
    let ordered: Vec<Position> = index
        .positions()
        .iter()
        .copied()
        .chain(std::iter::once(Position::T))
        .collect();
    for pos in ordered {
        match source_at(sources, pos) {
            Some(PosSource::Const(_)) | Some(PosSource::Dup { .. }) => continue,
            Some(PosSource::Shared { out_idx, .. }) | Some(PosSource::Free { out_idx }) => {
                key.push(out_syms[*out_idx].clone());
            }
            Some(PosSource::Blank) | None => break,
        }
    }
    key
}
