//! # Query Executor
//!
//! Drives a compiled [`Plan`]: realizes patterns through the matcher,
//! collapses the realized relations of a phase in decreasing-size order,
//! applies filters and expression bindings in planner order, dispatches
//! decorrelated subqueries across a bounded worker pool, and finishes with
//! projection, aggregation, and ordering.
//!
//! Every step reports through the context's event sink: `phase/begin`,
//! `phase/complete`, `pattern/match`, `join/*`, `filter/predicate`,
//! `expression/evaluate`, `subquery/execute`, `aggregation/executed`,
//! `query/complete`.
//!
//! Execution is single-threaded and cooperative except for decorrelated
//! subqueries, whose independent sub-plans run over the shared read-only
//! snapshot. Worker results are spliced back in input order, so callers
//! never observe worker scheduling.

pub mod aggregate;
pub mod functions;
pub mod predicate;

pub use aggregate::{aggregate_stream, AggregationMode};

use crate::context::QueryContext;
use crate::error::{QueryError, Result};
use crate::matcher::PatternMatcher;
use crate::plan::{Plan, PlanStep, PlannedSubquery, Planner, PlannerOptions};
use crate::query::ast::{BindForm, Direction, Expression, InputSpec, Predicate, Symbol, Term};
use crate::relation::{join, Columns, Relation, Tuple};
use crate::stats::Statistics;
use crate::storage::KvStore;
use crate::value::Value;
use rayon::prelude::*;
use serde_json::json;
use std::collections::{BTreeSet, HashSet};

/// Caller-supplied value for one `:in` spec.
#[derive(Debug, Clone)]
pub enum QueryInput {
    /// `$` — the database snapshot the executor already holds
    Database,
    Scalar(Value),
    Collection(Vec<Value>),
    Tuple(Vec<Value>),
    Relation(Vec<Vec<Value>>),
}

/// Executes plans against a read-only snapshot.
pub struct Executor<'s, S: KvStore + Sync> {
    store: &'s S,
    stats: Option<&'s Statistics>,
}

impl<'s, S: KvStore + Sync> Executor<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Executor { store, stats: None }
    }

    pub fn with_stats(store: &'s S, stats: &'s Statistics) -> Self {
        Executor {
            store,
            stats: Some(stats),
        }
    }

    /// Execute a plan to completion.
    pub fn execute(
        &self,
        plan: &Plan,
        inputs: Vec<QueryInput>,
        ctx: &QueryContext,
    ) -> Result<Relation> {
        let result = self.execute_inner(plan, inputs, ctx)?;
        if ctx.instrumented() {
            ctx.emit(
                "query/complete",
                vec![("rows", json!(result.size().unwrap_or(0)))],
            );
        }
        Ok(result)
    }

    fn execute_inner(
        &self,
        plan: &Plan,
        inputs: Vec<QueryInput>,
        ctx: &QueryContext,
    ) -> Result<Relation> {
        let mut acc = self.seed_relation(&plan.inputs, inputs, ctx)?;

        for step in &plan.input_steps {
            acc = Some(self.apply_step(step, acc, &plan.options, ctx)?);
        }

        for (i, phase) in plan.phases.iter().enumerate() {
            if ctx.instrumented() {
                ctx.emit(
                    "phase/begin",
                    vec![("phase", json!(i)), ("patterns", json!(phase.units.len()))],
                );
            }
            acc = Some(
                self.run_phase(phase, acc, &plan.options, ctx)
                    .map_err(|e| e.in_phase(&format!("phase-{i}")))?,
            );
            if ctx.instrumented() {
                ctx.emit(
                    "phase/complete",
                    vec![
                        ("phase", json!(i)),
                        ("rows", json!(acc.as_ref().and_then(Relation::size).unwrap_or(0))),
                    ],
                );
            }
        }

        for step in &plan.final_steps {
            acc = Some(self.apply_step(step, acc, &plan.options, ctx)?);
        }

        let rel = match acc {
            Some(rel) => rel.materialize(ctx)?,
            None => unit_relation(),
        };

        let mut out = if plan.find.iter().any(|e| {
            matches!(e, crate::query::ast::FindElem::Aggregate(_, _))
        }) {
            let rows_in = rel.size().unwrap_or(0);
            let mode = if plan.streaming_aggregation
                && rows_in >= plan.options.streaming_aggregation_threshold
            {
                AggregationMode::Streaming
            } else {
                AggregationMode::Materialized
            };
            let (columns, stream) = rel.into_stream()?;
            let aggregated = aggregate_stream(&plan.find, &columns, stream, ctx)
                .map_err(|e| e.in_phase("aggregate"))?;
            if ctx.instrumented() {
                ctx.emit(
                    "aggregation/executed",
                    vec![
                        ("mode", json!(mode.as_str())),
                        ("rows", json!(rows_in)),
                        ("groups", json!(aggregated.size().unwrap_or(0))),
                    ],
                );
            }
            aggregated
        } else {
            let projected = rel
                .project(&plan.result_columns())
                .map_err(|e| e.in_phase("project"))?;
            distinct(projected)?
        };

        if !plan.order_by.is_empty() {
            let specs: Vec<(usize, Direction)> = plan
                .order_by
                .iter()
                .map(|spec| {
                    out.columns()
                        .index_of(&spec.symbol)
                        .map(|i| (i, spec.direction))
                        .ok_or_else(|| {
                            QueryError::Resolution(spec.symbol.as_str().to_string())
                        })
                })
                .collect::<Result<_>>()?;
            out.order_by(&specs)?;
        }

        Ok(out)
    }

    /// Fold the `:in` bindings into one seed relation. `None` when the query
    /// takes nothing but the database.
    fn seed_relation(
        &self,
        specs: &[InputSpec],
        inputs: Vec<QueryInput>,
        ctx: &QueryContext,
    ) -> Result<Option<Relation>> {
        if specs.len() != inputs.len() {
            return Err(QueryError::Validation(format!(
                "query expects {} inputs, got {}",
                specs.len(),
                inputs.len()
            )));
        }

        let mut acc: Option<Relation> = None;
        for (spec, input) in specs.iter().zip(inputs) {
            let rel = match (spec, input) {
                (InputSpec::Database, QueryInput::Database) => continue,
                (InputSpec::Scalar(s), QueryInput::Scalar(v)) => Relation::materialized(
                    Columns::new(vec![s.clone()])?,
                    vec![vec![v]],
                )?,
                (InputSpec::Collection(s), QueryInput::Collection(vs)) => {
                    Relation::materialized(
                        Columns::new(vec![s.clone()])?,
                        vs.into_iter().map(|v| vec![v]).collect(),
                    )?
                }
                (InputSpec::Tuple(syms), QueryInput::Tuple(vals)) => {
                    if syms.len() != vals.len() {
                        return Err(QueryError::Validation(format!(
                            "tuple input arity {} does not match spec arity {}",
                            vals.len(),
                            syms.len()
                        )));
                    }
                    Relation::materialized(Columns::new(syms.clone())?, vec![vals])?
                }
                (InputSpec::Relation(syms), QueryInput::Relation(rows)) => {
                    Relation::materialized(Columns::new(syms.clone())?, rows)?
                }
                (spec, input) => {
                    return Err(QueryError::Validation(format!(
                        "input {input:?} does not satisfy :in spec {spec}"
                    )))
                }
            };
            acc = Some(match acc {
                None => rel,
                Some(prev) => self.join_step(prev, rel, ctx)?,
            });
        }
        Ok(acc)
    }

    /// One phase: realize patterns against the incoming bindings, collapse
    /// pending relations (decreasing size) whenever steps need the joined
    /// result, and again at phase end.
    fn run_phase(
        &self,
        phase: &crate::plan::Phase,
        incoming: Option<Relation>,
        options: &PlannerOptions,
        ctx: &QueryContext,
    ) -> Result<Relation> {
        let matcher = PatternMatcher::new(self.store);
        let mut current = incoming;
        let mut pending: Vec<Relation> = Vec::new();

        for unit in &phase.units {
            ctx.check_cancelled()?;
            let realized = matcher.matches_with_constraints(
                &unit.pattern.pattern,
                current.as_ref(),
                &unit.pattern.constraints,
                ctx,
            )?;
            pending.push(realized);

            if !unit.steps.is_empty() {
                current = Some(self.collapse(current.take(), std::mem::take(&mut pending), ctx)?);
                for step in &unit.steps {
                    current = Some(self.apply_step(step, current.take(), options, ctx)?);
                }
            }
        }

        if !pending.is_empty() {
            current = Some(self.collapse(current.take(), pending, ctx)?);
        }
        current.ok_or_else(|| QueryError::Internal("phase produced no relation".to_string()))
    }

    /// Reduce a set of relations to one by natural joins, largest first, so
    /// every hash build happens on the smaller side.
    fn collapse(
        &self,
        current: Option<Relation>,
        pending: Vec<Relation>,
        ctx: &QueryContext,
    ) -> Result<Relation> {
        let mut relations: Vec<Relation> = Vec::with_capacity(pending.len() + 1);
        if let Some(rel) = current {
            relations.push(rel);
        }
        relations.extend(pending);

        relations.sort_by_key(|r| std::cmp::Reverse(r.size().unwrap_or(0)));
        let mut iter = relations.into_iter();
        let mut acc = iter
            .next()
            .ok_or_else(|| QueryError::Internal("collapse of zero relations".to_string()))?;
        for rel in iter {
            acc = self.join_step(acc, rel, ctx)?;
        }
        Ok(acc)
    }

    fn join_step(&self, left: Relation, right: Relation, ctx: &QueryContext) -> Result<Relation> {
        let outcome = join(left, right, ctx)?;
        if ctx.instrumented() {
            let name = match outcome.kind {
                crate::relation::JoinKind::Hash => "join/hash",
                crate::relation::JoinKind::NestedLoop => "join/nested-loop",
                crate::relation::JoinKind::Merge => "join/merge",
            };
            ctx.emit(
                name,
                vec![
                    ("left", json!(outcome.left_size)),
                    ("right", json!(outcome.right_size)),
                    ("rows", json!(outcome.result.size().unwrap_or(0))),
                    ("cartesian", json!(outcome.cartesian)),
                ],
            );
        }
        Ok(outcome.result)
    }

    fn apply_step(
        &self,
        step: &PlanStep,
        rel: Option<Relation>,
        options: &PlannerOptions,
        ctx: &QueryContext,
    ) -> Result<Relation> {
        let rel = match rel {
            Some(rel) => rel.materialize(ctx)?,
            None => unit_relation(),
        };
        match step {
            PlanStep::Filter(pred) => self.filter_step(pred, rel, ctx),
            PlanStep::Bind(expr) => self.bind_step(expr, rel, ctx),
            PlanStep::Subquery(sq) => self.subquery_step(sq, rel, options, ctx),
        }
    }

    fn filter_step(
        &self,
        pred: &Predicate,
        rel: Relation,
        ctx: &QueryContext,
    ) -> Result<Relation> {
        let columns = rel.columns().clone();
        let rows_in = rel.size().unwrap_or(0);
        let mut kept: Vec<Tuple> = Vec::new();
        for tuple in rel.rows()? {
            ctx.check_cancelled()?;
            if predicate::eval_predicate(pred, &columns, tuple)? {
                kept.push(tuple.clone());
            }
        }
        if ctx.instrumented() {
            ctx.emit(
                "filter/predicate",
                vec![
                    ("predicate", json!(pred.to_string())),
                    ("in", json!(rows_in)),
                    ("out", json!(kept.len())),
                ],
            );
        }
        Relation::materialized(columns, kept)
    }

    fn bind_step(
        &self,
        expr: &Expression,
        rel: Relation,
        ctx: &QueryContext,
    ) -> Result<Relation> {
        let columns = rel.columns().clone();
        let mut out_syms: Vec<Symbol> = columns.as_slice().to_vec();
        out_syms.push(expr.binding.clone());
        let out_columns = Columns::new(out_syms)?;

        let mut out: Vec<Tuple> = Vec::new();
        for tuple in rel.rows()? {
            ctx.check_cancelled()?;
            let args: Vec<Value> = expr
                .args
                .iter()
                .map(|arg| predicate::resolve_term(arg, &columns, tuple))
                .collect::<Result<_>>()?;
            let value = functions::eval_call(&expr.name, &args)?;
            let mut extended = tuple.clone();
            extended.push(value);
            out.push(extended);
        }
        if ctx.instrumented() {
            ctx.emit(
                "expression/evaluate",
                vec![
                    ("expression", json!(expr.to_string())),
                    ("rows", json!(out.len())),
                ],
            );
        }
        Relation::materialized(out_columns, out)
    }

    /// Realize subquery inputs, dispatch sub-plans (in parallel when the
    /// plan decorrelated the subquery), splice results back in input order,
    /// and join with the outer relation.
    fn subquery_step(
        &self,
        planned: &PlannedSubquery,
        rel: Relation,
        options: &PlannerOptions,
        ctx: &QueryContext,
    ) -> Result<Relation> {
        let sq = &planned.subquery;

        let mut input_vars: Vec<Symbol> = Vec::new();
        for term in &sq.inputs {
            term.variables(&mut input_vars);
        }

        let columns = rel.columns().clone();
        let var_indices: Vec<usize> = input_vars
            .iter()
            .map(|sym| {
                columns
                    .index_of(sym)
                    .ok_or_else(|| QueryError::Resolution(sym.as_str().to_string()))
            })
            .collect::<Result<_>>()?;

        // Decorrelation runs the body once per distinct input tuple; the
        // correlated fallback runs it per outer row
        let input_tuples: Vec<Vec<Value>> = if planned.decorrelate {
            let distinct: BTreeSet<Vec<Value>> = rel
                .rows()?
                .iter()
                .map(|row| var_indices.iter().map(|&i| row[i].clone()).collect())
                .collect();
            distinct.into_iter().collect()
        } else {
            rel.rows()?
                .iter()
                .map(|row| var_indices.iter().map(|&i| row[i].clone()).collect())
                .collect()
        };

        let mut spliced_syms = input_vars.clone();
        spliced_syms.extend(sq.binding.symbols().iter().cloned());
        let spliced_columns = Columns::new(spliced_syms)?;

        if input_tuples.is_empty() {
            // empty inputs: empty result, no worker dispatch
            let empty = Relation::empty(spliced_columns);
            return self.join_step(rel, empty, ctx);
        }

        let sub_plan = match self.stats {
            Some(stats) => Planner::with_stats(options.clone(), stats),
            None => Planner::new(options.clone()),
        }
        .plan(&sq.query, ctx)?;

        let input_columns = Columns::new(input_vars.clone())?;
        let run_one = |input: &Vec<Value>| -> Result<Vec<Tuple>> {
            let sub_inputs: Vec<QueryInput> = sq
                .inputs
                .iter()
                .map(|term| match term {
                    Term::Database => Ok(QueryInput::Database),
                    term => predicate::resolve_term(term, &input_columns, input)
                        .map(QueryInput::Scalar),
                })
                .collect::<Result<_>>()?;
            let sub_result = self.execute(&sub_plan, sub_inputs, ctx)?;
            splice_results(&sq.binding, input, sub_result)
        };

        let parallel = planned.decorrelate && planned.parallel && input_tuples.len() > 1;
        let per_input: Vec<Vec<Tuple>> = if parallel {
            let workers = if options.subquery_workers == 0 {
                num_cpus::get()
            } else {
                options.subquery_workers
            };
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|e| QueryError::Internal(format!("worker pool: {e}")))?;
            pool.install(|| {
                input_tuples
                    .par_iter()
                    .map(run_one)
                    .collect::<Result<Vec<_>>>()
            })?
        } else {
            input_tuples
                .iter()
                .map(run_one)
                .collect::<Result<Vec<_>>>()?
        };

        // concatenation in input order keeps results deterministic
        let spliced_rows: Vec<Tuple> = per_input.into_iter().flatten().collect();
        let spliced = Relation::materialized(spliced_columns, spliced_rows)?;

        if ctx.instrumented() {
            ctx.emit(
                "subquery/execute",
                vec![
                    ("inputs", json!(input_tuples.len())),
                    ("parallel", json!(parallel)),
                    ("rows", json!(spliced.size().unwrap_or(0))),
                ],
            );
        }

        self.join_step(rel, spliced, ctx)
    }
}

/// The identity relation: zero columns, one empty tuple.
fn unit_relation() -> Relation {
    Relation::materialized(Columns::empty(), vec![vec![]])
        .expect("unit relation is well-formed")
}

/// Set semantics for non-aggregated results: drop duplicate tuples,
/// preserving first occurrence.
fn distinct(rel: Relation) -> Result<Relation> {
    let columns = rel.columns().clone();
    let mut seen: HashSet<Tuple> = HashSet::new();
    let mut out: Vec<Tuple> = Vec::new();
    for tuple in rel.rows()? {
        if seen.insert(tuple.clone()) {
            out.push(tuple.clone());
        }
    }
    Relation::materialized(columns, out)
}

/// Map one subquery execution's result rows onto spliced tuples.
fn splice_results(
    binding: &BindForm,
    input: &[Value],
    sub_result: Relation,
) -> Result<Vec<Tuple>> {
    let arity = sub_result.columns().len();
    let expected = binding.symbols().len();
    if arity != expected {
        return Err(QueryError::Validation(format!(
            "subquery returns {arity} column(s) but binding form {binding} expects {expected}"
        )));
    }
    let rows = sub_result.rows()?;
    let spliced = |row: &Tuple| -> Tuple {
        let mut out: Tuple = input.to_vec();
        out.extend(row.iter().cloned());
        out
    };
    Ok(match binding {
        BindForm::Scalar(_) | BindForm::Relation(_) => rows.iter().map(spliced).collect(),
        // a tuple binding destructures a single result row
        BindForm::Tuple(_) => rows.first().map(|r| spliced(r)).into_iter().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_relation_shape() {
        let rel = unit_relation();
        assert_eq!(rel.columns().len(), 0);
        assert_eq!(rel.size(), Some(1));
    }

    #[test]
    fn test_distinct_preserves_first_occurrence() {
        let rel = Relation::materialized(
            Columns::new(vec![Symbol::new("?a")]).expect("columns"),
            vec![
                vec![Value::Int64(2)],
                vec![Value::Int64(1)],
                vec![Value::Int64(2)],
            ],
        )
        .expect("relation");
        let out = distinct(rel).expect("distinct");
        assert_eq!(
            out.rows().expect("rows"),
            &[vec![Value::Int64(2)], vec![Value::Int64(1)]]
        );
    }

    #[test]
    fn test_splice_scalar_binding() {
        let sub = Relation::materialized(
            Columns::new(vec![Symbol::new("?mh")]).expect("columns"),
            vec![vec![Value::Float64(155.0)]],
        )
        .expect("relation");
        let rows = splice_results(
            &BindForm::Scalar(Symbol::new("?mh")),
            &[Value::identity("aapl")],
            sub,
        )
        .expect("splice");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 2);
    }

    #[test]
    fn test_splice_arity_mismatch() {
        let sub = Relation::materialized(
            Columns::new(vec![Symbol::new("?a"), Symbol::new("?b")]).expect("columns"),
            vec![],
        )
        .expect("relation");
        assert!(splice_results(&BindForm::Scalar(Symbol::new("?x")), &[], sub).is_err());
    }
}
