//! Aggregation
//!
//! Groups tuples by the non-aggregated find variables and folds the
//! aggregate functions over each group. `count` counts rows; `sum` and `avg`
//! return floats when any input is a float; `min`/`max` use the total value
//! ordering.
//!
//! Both execution modes share one accumulator core, so for any partitioning
//! of the input into chunks the streaming fold over the concatenation equals
//! the materialized aggregate. Output order is the group-key order of the
//! accumulation map; callers wanting a specific order apply `:order-by`.

use crate::context::QueryContext;
use crate::error::{QueryError, Result};
use crate::query::ast::{AggregateFn, FindElem};
use crate::relation::{Columns, Relation, Tuple, TupleStream};
use crate::value::Value;
use std::collections::BTreeMap;

/// How the executor fed the aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMode {
    /// Tuples folded straight off the stream
    Streaming,
    /// Input vector collected first
    Materialized,
}

impl AggregationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationMode::Streaming => "streaming",
            AggregationMode::Materialized => "materialized",
        }
    }
}

/// Running state for one aggregate over one group.
#[derive(Debug, Clone)]
enum Acc {
    Count(i64),
    Sum {
        int: i64,
        float: f64,
        any_float: bool,
    },
    Avg {
        int: i64,
        float: f64,
        any_float: bool,
        count: i64,
    },
    Min(Option<Value>),
    Max(Option<Value>),
}

impl Acc {
    fn new(agg: AggregateFn) -> Acc {
        match agg {
            AggregateFn::Count => Acc::Count(0),
            AggregateFn::Sum => Acc::Sum {
                int: 0,
                float: 0.0,
                any_float: false,
            },
            AggregateFn::Avg => Acc::Avg {
                int: 0,
                float: 0.0,
                any_float: false,
                count: 0,
            },
            AggregateFn::Min => Acc::Min(None),
            AggregateFn::Max => Acc::Max(None),
        }
    }

    fn update(&mut self, value: &Value) -> Result<()> {
        fn add_numeric(
            int: &mut i64,
            float: &mut f64,
            any_float: &mut bool,
            value: &Value,
        ) -> Result<()> {
            match value {
                Value::Int64(i) => {
                    *int = int.wrapping_add(*i);
                    *float += *i as f64;
                    Ok(())
                }
                Value::Float64(f) => {
                    *float += f;
                    *any_float = true;
                    Ok(())
                }
                other => Err(QueryError::Type {
                    expected: "number",
                    got: other.type_tag(),
                }),
            }
        }

        match self {
            Acc::Count(n) => {
                *n += 1;
                Ok(())
            }
            Acc::Sum { int, float, any_float } => add_numeric(int, float, any_float, value),
            Acc::Avg { int, float, any_float, count } => {
                add_numeric(int, float, any_float, value)?;
                *count += 1;
                Ok(())
            }
            Acc::Min(slot) => {
                if slot.as_ref().is_none_or(|best| value < best) {
                    *slot = Some(value.clone());
                }
                Ok(())
            }
            Acc::Max(slot) => {
                if slot.as_ref().is_none_or(|best| value > best) {
                    *slot = Some(value.clone());
                }
                Ok(())
            }
        }
    }

    fn finish(self) -> Result<Value> {
        match self {
            Acc::Count(n) => Ok(Value::Int64(n)),
            Acc::Sum { int, float, any_float } => Ok(if any_float {
                Value::Float64(float)
            } else {
                Value::Int64(int)
            }),
            Acc::Avg { int, float, any_float, count } => {
                if count == 0 {
                    return Err(QueryError::Internal("avg over empty group".to_string()));
                }
                Ok(if any_float {
                    Value::Float64(float / count as f64)
                } else {
                    Value::Int64(int / count)
                })
            }
            Acc::Min(slot) | Acc::Max(slot) => {
                slot.ok_or_else(|| QueryError::Internal("min/max over empty group".to_string()))
            }
        }
    }
}

/// Fold a tuple stream into grouped aggregate rows.
///
/// The result columns are the find symbols in find order. An empty input
/// yields an empty relation: with no rows there are no groups.
pub fn aggregate_stream(
    find: &[FindElem],
    columns: &Columns,
    stream: TupleStream,
    ctx: &QueryContext,
) -> Result<Relation> {
    // Per find element: either a group-key column or an aggregate source
    enum Slot {
        Key(usize),
        Agg(AggregateFn, usize),
    }
    let slots: Vec<Slot> = find
        .iter()
        .map(|elem| {
            let idx = columns
                .index_of(elem.symbol())
                .ok_or_else(|| QueryError::Resolution(elem.symbol().as_str().to_string()))?;
            Ok(match elem {
                FindElem::Var(_) => Slot::Key(idx),
                FindElem::Aggregate(agg, _) => Slot::Agg(*agg, idx),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let key_indices: Vec<usize> = slots
        .iter()
        .filter_map(|s| match s {
            Slot::Key(i) => Some(*i),
            Slot::Agg(_, _) => None,
        })
        .collect();
    let aggs: Vec<(AggregateFn, usize)> = slots
        .iter()
        .filter_map(|s| match s {
            Slot::Agg(agg, i) => Some((*agg, *i)),
            Slot::Key(_) => None,
        })
        .collect();

    let mut groups: BTreeMap<Vec<Value>, Vec<Acc>> = BTreeMap::new();
    for item in stream {
        ctx.check_cancelled()?;
        let tuple = item?;
        let key: Vec<Value> = key_indices.iter().map(|&i| tuple[i].clone()).collect();
        let accs = groups
            .entry(key)
            .or_insert_with(|| aggs.iter().map(|(agg, _)| Acc::new(*agg)).collect());
        for (acc, (_, idx)) in accs.iter_mut().zip(&aggs) {
            acc.update(&tuple[*idx])?;
        }
    }

    let out_columns = Columns::new(find.iter().map(|e| e.symbol().clone()).collect())?;
    let mut rows: Vec<Tuple> = Vec::with_capacity(groups.len());
    for (key, accs) in groups {
        let mut finished = accs.into_iter().map(Acc::finish);
        let mut key_iter = key.into_iter();
        let row: Tuple = slots
            .iter()
            .map(|slot| match slot {
                Slot::Key(_) => Ok(key_iter.next().expect("key arity")),
                Slot::Agg(_, _) => finished.next().expect("agg arity"),
            })
            .collect::<Result<_>>()?;
        rows.push(row);
    }
    Relation::materialized(out_columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::Symbol;

    fn stream_of(rows: Vec<Tuple>) -> TupleStream {
        Box::new(rows.into_iter().map(Ok))
    }

    fn columns(names: &[&str]) -> Columns {
        Columns::new(names.iter().map(|n| Symbol::new(*n)).collect()).expect("columns")
    }

    fn run(find: Vec<FindElem>, cols: &Columns, rows: Vec<Tuple>) -> Relation {
        aggregate_stream(&find, cols, stream_of(rows), &QueryContext::new()).expect("aggregate")
    }

    #[test]
    fn test_count_counts_rows() {
        let cols = columns(&["?p"]);
        let rel = run(
            vec![FindElem::Aggregate(AggregateFn::Count, Symbol::new("?p"))],
            &cols,
            vec![vec![Value::Int64(7)], vec![Value::Int64(7)]],
        );
        assert_eq!(rel.rows().expect("rows"), &[vec![Value::Int64(2)]]);
    }

    #[test]
    fn test_min_max_over_floats() {
        let cols = columns(&["?h"]);
        let rows = vec![vec![Value::Float64(150.0)], vec![Value::Float64(155.0)]];
        let max = run(
            vec![FindElem::Aggregate(AggregateFn::Max, Symbol::new("?h"))],
            &cols,
            rows.clone(),
        );
        assert_eq!(max.rows().expect("rows"), &[vec![Value::Float64(155.0)]]);
        let min = run(
            vec![FindElem::Aggregate(AggregateFn::Min, Symbol::new("?h"))],
            &cols,
            rows,
        );
        assert_eq!(min.rows().expect("rows"), &[vec![Value::Float64(150.0)]]);
    }

    #[test]
    fn test_sum_avg_float_contagion() {
        let cols = columns(&["?x"]);
        let ints = vec![vec![Value::Int64(1)], vec![Value::Int64(2)]];
        let sum = run(
            vec![FindElem::Aggregate(AggregateFn::Sum, Symbol::new("?x"))],
            &cols,
            ints.clone(),
        );
        assert_eq!(sum.rows().expect("rows"), &[vec![Value::Int64(3)]]);

        let mixed = vec![vec![Value::Int64(1)], vec![Value::Float64(2.5)]];
        let sum = run(
            vec![FindElem::Aggregate(AggregateFn::Sum, Symbol::new("?x"))],
            &cols,
            mixed.clone(),
        );
        assert_eq!(sum.rows().expect("rows"), &[vec![Value::Float64(3.5)]]);

        let avg = run(
            vec![FindElem::Aggregate(AggregateFn::Avg, Symbol::new("?x"))],
            &cols,
            mixed,
        );
        assert_eq!(avg.rows().expect("rows"), &[vec![Value::Float64(1.75)]]);
    }

    #[test]
    fn test_grouping_by_find_vars() {
        let cols = columns(&["?name", "?amount"]);
        let rel = run(
            vec![
                FindElem::Var(Symbol::new("?name")),
                FindElem::Aggregate(AggregateFn::Sum, Symbol::new("?amount")),
            ],
            &cols,
            vec![
                vec![Value::from("a"), Value::Int64(1)],
                vec![Value::from("b"), Value::Int64(10)],
                vec![Value::from("a"), Value::Int64(2)],
            ],
        );
        let rows = rel.rows().expect("rows");
        assert_eq!(rows.len(), 2);
        assert!(rows.contains(&vec![Value::from("a"), Value::Int64(3)]));
        assert!(rows.contains(&vec![Value::from("b"), Value::Int64(10)]));
    }

    #[test]
    fn test_empty_input_yields_empty() {
        let cols = columns(&["?x"]);
        let rel = run(
            vec![FindElem::Aggregate(AggregateFn::Count, Symbol::new("?x"))],
            &cols,
            vec![],
        );
        assert_eq!(rel.size(), Some(0));
    }

    #[test]
    fn test_chunked_fold_equals_whole() {
        // commutative-associative folds are chunking-insensitive
        let cols = columns(&["?g", "?x"]);
        let find = vec![
            FindElem::Var(Symbol::new("?g")),
            FindElem::Aggregate(AggregateFn::Sum, Symbol::new("?x")),
            ];
        let all: Vec<Tuple> = (0..20)
            .map(|i| vec![Value::Int64(i % 3), Value::Int64(i)])
            .collect();

        let whole = run(find.clone(), &cols, all.clone());

        for split in [1, 7, 13, 19] {
            let (a, b) = all.split_at(split);
            let mut chunked: Vec<Tuple> = b.to_vec();
            chunked.extend(a.to_vec());
            let reordered = run(find.clone(), &cols, chunked);
            assert_eq!(
                whole.rows().expect("rows"),
                reordered.rows().expect("rows"),
                "split at {split}"
            );
        }
    }
}
