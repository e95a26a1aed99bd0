//! Natural Joins
//!
//! Combines two relations on the intersection of their columns. Three
//! algorithms:
//!
//! - **hash** — build a multimap on the smaller side keyed by the join
//!   columns, probe the larger side;
//! - **nested-loop** — when either side is tiny, or as the Cartesian product
//!   when the schemas share no columns (flagged in the outcome);
//! - **merge** — when both inputs are already ordered by the join columns.
//!
//! Kind selection is a pure function of the input sizes, the common column
//! set, and the inputs' sort keys, so plans are reproducible. Result columns
//! are the left schema followed by right-only columns; hash and nested-loop
//! outputs preserve the probe/outer side's order, merge outputs are ordered
//! by the join key.

use crate::context::QueryContext;
use crate::error::Result;
use crate::query::ast::Symbol;
use crate::relation::{Columns, Relation, Tuple};
use crate::value::Value;
use std::collections::HashMap;

/// Nested-loop cutoff: at or below this many tuples, hashing costs more
/// than it saves.
const NESTED_LOOP_MAX: usize = 4;

/// Join algorithm chosen for a pair of relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Hash,
    NestedLoop,
    Merge,
}

impl JoinKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinKind::Hash => "hash",
            JoinKind::NestedLoop => "nested-loop",
            JoinKind::Merge => "merge",
        }
    }
}

/// Result of a join, with the structural facts instrumentation reports.
pub struct JoinOutcome {
    pub kind: JoinKind,
    /// True when the join degenerated to a Cartesian product
    pub cartesian: bool,
    pub left_size: usize,
    pub right_size: usize,
    pub result: Relation,
}

/// Deterministic join-kind selection.
///
/// Precedence: no common columns is a flagged Cartesian nested-loop; both
/// inputs sorted on the join columns stream through a merge; a tiny side
/// makes hashing pointless; everything else hash-joins.
pub fn select_join_kind(
    left_size: usize,
    right_size: usize,
    common: &[Symbol],
    left_sorted: bool,
    right_sorted: bool,
) -> (JoinKind, bool) {
    if common.is_empty() {
        (JoinKind::NestedLoop, true)
    } else if left_sorted && right_sorted {
        (JoinKind::Merge, false)
    } else if left_size.min(right_size) <= NESTED_LOOP_MAX {
        (JoinKind::NestedLoop, false)
    } else {
        (JoinKind::Hash, false)
    }
}

fn sorted_on(relation: &Relation, common: &[Symbol]) -> bool {
    match relation.sort_key() {
        Some(key) => key.len() >= common.len() && key[..common.len()] == *common,
        None => false,
    }
}

/// Natural join of two relations.
///
/// Both inputs are materialized first (sizes drive kind selection).
pub fn join(left: Relation, right: Relation, ctx: &QueryContext) -> Result<JoinOutcome> {
    let left = left.materialize(ctx)?;
    let right = right.materialize(ctx)?;

    let common = left.columns().intersection(right.columns());
    let left_size = left.size().unwrap_or(0);
    let right_size = right.size().unwrap_or(0);
    let (kind, cartesian) = select_join_kind(
        left_size,
        right_size,
        &common,
        sorted_on(&left, &common),
        sorted_on(&right, &common),
    );

    let result = match kind {
        JoinKind::NestedLoop => nested_loop_join(&left, &right, &common, ctx)?,
        JoinKind::Hash => hash_join(&left, &right, &common, ctx)?,
        JoinKind::Merge => merge_join(&left, &right, &common, ctx)?,
    };

    Ok(JoinOutcome {
        kind,
        cartesian,
        left_size,
        right_size,
        result,
    })
}

struct JoinShape {
    out_columns: Columns,
    left_key: Vec<usize>,
    right_key: Vec<usize>,
    /// Right column indices that survive into the output
    right_keep: Vec<usize>,
}

fn shape(left: &Relation, right: &Relation, common: &[Symbol]) -> JoinShape {
    let left_key = common
        .iter()
        .map(|s| left.columns().index_of(s).expect("common column in left"))
        .collect();
    let right_key = common
        .iter()
        .map(|s| right.columns().index_of(s).expect("common column in right"))
        .collect();
    let right_keep = right
        .columns()
        .as_slice()
        .iter()
        .enumerate()
        .filter(|(_, s)| !common.contains(s))
        .map(|(i, _)| i)
        .collect();
    JoinShape {
        out_columns: left.columns().union(right.columns()),
        left_key,
        right_key,
        right_keep,
    }
}

fn key_of(tuple: &Tuple, indices: &[usize]) -> Vec<Value> {
    indices.iter().map(|&i| tuple[i].clone()).collect()
}

fn splice(left: &Tuple, right: &Tuple, right_keep: &[usize]) -> Tuple {
    let mut out = Vec::with_capacity(left.len() + right_keep.len());
    out.extend(left.iter().cloned());
    out.extend(right_keep.iter().map(|&i| right[i].clone()));
    out
}

fn nested_loop_join(
    left: &Relation,
    right: &Relation,
    common: &[Symbol],
    ctx: &QueryContext,
) -> Result<Relation> {
    let s = shape(left, right, common);
    let mut out = Vec::new();
    for lt in left.rows()? {
        ctx.check_cancelled()?;
        for rt in right.rows()? {
            if common.is_empty() || key_of(lt, &s.left_key) == key_of(rt, &s.right_key) {
                out.push(splice(lt, rt, &s.right_keep));
            }
        }
    }
    let sort_key = left.sort_key().map(<[Symbol]>::to_vec);
    let mut result = Relation::materialized(s.out_columns, out)?;
    if let Some(key) = sort_key {
        result = result.with_sort_key(key);
    }
    Ok(result)
}

fn hash_join(
    left: &Relation,
    right: &Relation,
    common: &[Symbol],
    ctx: &QueryContext,
) -> Result<Relation> {
    let s = shape(left, right, common);
    let left_size = left.size().unwrap_or(0);
    let right_size = right.size().unwrap_or(0);
    let build_left = left_size <= right_size;

    let (build, build_key) = if build_left {
        (left, &s.left_key)
    } else {
        (right, &s.right_key)
    };

    let mut table: HashMap<Vec<Value>, Vec<usize>> = HashMap::with_capacity(
        build.size().unwrap_or(0),
    );
    for (i, tuple) in build.rows()?.iter().enumerate() {
        table.entry(key_of(tuple, build_key)).or_default().push(i);
    }

    let mut out = Vec::new();
    if build_left {
        let left_rows = left.rows()?;
        for rt in right.rows()? {
            ctx.check_cancelled()?;
            if let Some(matches) = table.get(&key_of(rt, &s.right_key)) {
                for &i in matches {
                    out.push(splice(&left_rows[i], rt, &s.right_keep));
                }
            }
        }
    } else {
        let right_rows = right.rows()?;
        for lt in left.rows()? {
            ctx.check_cancelled()?;
            if let Some(matches) = table.get(&key_of(lt, &s.left_key)) {
                for &i in matches {
                    out.push(splice(lt, &right_rows[i], &s.right_keep));
                }
            }
        }
    }

    // Probe-side order is preserved, so its sort key survives
    let probe = if build_left { right } else { left };
    let sort_key = probe.sort_key().map(<[Symbol]>::to_vec);
    let mut result = Relation::materialized(s.out_columns, out)?;
    if let Some(key) = sort_key {
        result = result.with_sort_key(key);
    }
    Ok(result)
}

fn merge_join(
    left: &Relation,
    right: &Relation,
    common: &[Symbol],
    ctx: &QueryContext,
) -> Result<Relation> {
    let s = shape(left, right, common);
    let left_rows = left.rows()?;
    let right_rows = right.rows()?;

    let mut out = Vec::new();
    let mut i = 0;
    let mut j = 0;
    while i < left_rows.len() && j < right_rows.len() {
        ctx.check_cancelled()?;
        let lk = key_of(&left_rows[i], &s.left_key);
        let rk = key_of(&right_rows[j], &s.right_key);
        match lk.cmp(&rk) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                let i_end = (i..left_rows.len())
                    .take_while(|&x| key_of(&left_rows[x], &s.left_key) == lk)
                    .last()
                    .map_or(i, |x| x + 1);
                let j_end = (j..right_rows.len())
                    .take_while(|&x| key_of(&right_rows[x], &s.right_key) == rk)
                    .last()
                    .map_or(j, |x| x + 1);
                for lt in &left_rows[i..i_end] {
                    for rt in &right_rows[j..j_end] {
                        out.push(splice(lt, rt, &s.right_keep));
                    }
                }
                i = i_end;
                j = j_end;
            }
        }
    }

    Ok(Relation::materialized(s.out_columns, out)?.with_sort_key(common.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Columns {
        Columns::new(names.iter().map(|n| Symbol::new(*n)).collect()).expect("columns")
    }

    fn rel(names: &[&str], rows: Vec<Vec<i64>>) -> Relation {
        Relation::materialized(
            cols(names),
            rows.into_iter()
                .map(|r| r.into_iter().map(Value::Int64).collect())
                .collect(),
        )
        .expect("relation")
    }

    #[test]
    fn test_kind_selection_is_deterministic() {
        let common = vec![Symbol::new("?x")];
        assert_eq!(
            select_join_kind(100, 100, &[], false, false),
            (JoinKind::NestedLoop, true)
        );
        assert_eq!(
            select_join_kind(100, 100, &common, true, true),
            (JoinKind::Merge, false)
        );
        assert_eq!(
            select_join_kind(3, 100, &common, false, false),
            (JoinKind::NestedLoop, false)
        );
        assert_eq!(
            select_join_kind(100, 100, &common, true, false),
            (JoinKind::Hash, false)
        );
    }

    #[test]
    fn test_hash_join_on_common_column() {
        // Above the nested-loop cutoff on both sides
        let left = rel(
            &["?x", "?a"],
            (0..6).map(|i| vec![i, i * 10]).collect(),
        );
        let right = rel(
            &["?x", "?b"],
            (0..6).map(|i| vec![i, i * 100]).collect(),
        );
        let ctx = QueryContext::new();
        let outcome = join(left, right, &ctx).expect("join");
        assert_eq!(outcome.kind, JoinKind::Hash);
        assert!(!outcome.cartesian);
        let rows = outcome.result.rows().expect("rows");
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0], vec![Value::Int64(0), Value::Int64(0), Value::Int64(0)]);
        assert_eq!(
            outcome.result.columns().as_slice(),
            &[Symbol::new("?x"), Symbol::new("?a"), Symbol::new("?b")]
        );
    }

    #[test]
    fn test_nested_loop_small_side() {
        let left = rel(&["?x", "?a"], vec![vec![1, 10], vec![2, 20]]);
        let right = rel(
            &["?x", "?b"],
            (0..10).map(|i| vec![i, i * 100]).collect(),
        );
        let ctx = QueryContext::new();
        let outcome = join(left, right, &ctx).expect("join");
        assert_eq!(outcome.kind, JoinKind::NestedLoop);
        assert_eq!(outcome.result.rows().expect("rows").len(), 2);
    }

    #[test]
    fn test_cartesian_flagged() {
        let left = rel(&["?a"], vec![vec![1], vec![2]]);
        let right = rel(&["?b"], vec![vec![10], vec![20], vec![30]]);
        let ctx = QueryContext::new();
        let outcome = join(left, right, &ctx).expect("join");
        assert!(outcome.cartesian);
        assert_eq!(outcome.result.rows().expect("rows").len(), 6);
    }

    #[test]
    fn test_merge_join_streams_sorted_inputs() {
        let left = rel(
            &["?x", "?a"],
            (0..8).map(|i| vec![i, i * 10]).collect(),
        )
        .with_sort_key(vec![Symbol::new("?x")]);
        let right = rel(
            &["?x", "?b"],
            (0..8).map(|i| vec![i, i * 100]).collect(),
        )
        .with_sort_key(vec![Symbol::new("?x")]);
        let ctx = QueryContext::new();
        let outcome = join(left, right, &ctx).expect("join");
        assert_eq!(outcome.kind, JoinKind::Merge);
        let rows = outcome.result.rows().expect("rows");
        assert_eq!(rows.len(), 8);
        assert_eq!(outcome.result.sort_key(), Some(&[Symbol::new("?x")][..]));
    }

    #[test]
    fn test_merge_join_duplicate_keys_cross_product() {
        let left = rel(&["?x", "?a"], vec![vec![1, 10], vec![1, 11], vec![2, 12], vec![3, 13], vec![4, 14]])
            .with_sort_key(vec![Symbol::new("?x")]);
        let right = rel(&["?x", "?b"], vec![vec![1, 100], vec![1, 101], vec![3, 102], vec![5, 103], vec![6, 104]])
            .with_sort_key(vec![Symbol::new("?x")]);
        let ctx = QueryContext::new();
        let outcome = join(left, right, &ctx).expect("join");
        assert_eq!(outcome.kind, JoinKind::Merge);
        // key 1: 2x2 = 4 rows, key 3: 1 row
        assert_eq!(outcome.result.rows().expect("rows").len(), 5);
    }

    #[test]
    fn test_join_results_agree_across_kinds() {
        let pairs: Vec<Vec<i64>> = (0..12).map(|i| vec![i % 5, i]).collect();
        let left_rows: Vec<Vec<i64>> = pairs.clone();
        let right_rows: Vec<Vec<i64>> = (0..12).map(|i| vec![i % 5, i * 7]).collect();

        let ctx = QueryContext::new();

        // Hash path
        let hash = join(
            rel(&["?x", "?a"], left_rows.clone()),
            rel(&["?x", "?b"], right_rows.clone()),
            &ctx,
        )
        .expect("join");
        assert_eq!(hash.kind, JoinKind::Hash);

        // Merge path over the same data, pre-sorted
        let mut ls = left_rows;
        ls.sort();
        let mut rs = right_rows;
        rs.sort();
        let merge = join(
            rel(&["?x", "?a"], ls).with_sort_key(vec![Symbol::new("?x")]),
            rel(&["?x", "?b"], rs).with_sort_key(vec![Symbol::new("?x")]),
            &ctx,
        )
        .expect("join");
        assert_eq!(merge.kind, JoinKind::Merge);

        let mut hash_rows = hash.result.rows().expect("rows").to_vec();
        let mut merge_rows = merge.result.rows().expect("rows").to_vec();
        hash_rows.sort();
        merge_rows.sort();
        assert_eq!(hash_rows, merge_rows);
    }

    #[test]
    fn test_empty_input_propagates() {
        let left = rel(&["?x", "?a"], vec![]);
        let right = rel(&["?x", "?b"], (0..10).map(|i| vec![i, i]).collect());
        let ctx = QueryContext::new();
        let outcome = join(left, right, &ctx).expect("join");
        assert_eq!(outcome.result.rows().expect("rows").len(), 0);
    }
}
