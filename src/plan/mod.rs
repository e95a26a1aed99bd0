//! # Query Planner
//!
//! Compiles a parsed query into an ordered plan of phases. The pipeline:
//!
//! 1. **Normalization** — every referenced function is validated against the
//!    registry, find/order-by variables are checked against the bindable set,
//!    and duplicate output columns are rejected.
//! 2. **Pattern ordering** — per-pattern cardinality estimates (bound
//!    positions, constant-attribute bonus, statistics when available) drive a
//!    greedy order in which every pattern shares a variable with the
//!    accumulated binding set whenever possible.
//! 3. **Predicate pushdown** — variable–constant comparisons and
//!    time-component extractions over a pattern's V variable move into the
//!    matcher as storage constraints; year/month/day equalities compose into
//!    a contiguous time range.
//! 4. **Placement** — each remaining predicate, expression, and subquery runs
//!    immediately after the pattern that binds the last variable it needs.
//! 5. **Phasing** — ordered patterns split into phases at connectivity
//!    boundaries (and at the configured width, when set).
//! 6. **Aggregation & ordering** — a final implicit phase groups by the
//!    non-aggregated find variables and applies `:order-by`.

use crate::context::QueryContext;
use crate::error::{QueryError, Result};
use crate::matcher::constraints::{StorageConstraint, TimeComponent};
use crate::query::ast::{
    Clause, CompareOp, Expression, FindElem, InputSpec, OrderSpec, Pattern, PatternElem,
    Predicate, Query, Subquery, Symbol, Term,
};
use crate::query::registry;
use crate::stats::Statistics;
use crate::value::Value;
use chrono::{TimeZone, Utc};
use serde_json::json;
use std::fmt;

/// Knobs controlling plan construction.
#[derive(Debug, Clone)]
pub struct PlannerOptions {
    /// Rewrite correlated subqueries into joins over decorrelated realizations
    pub decorrelate_subqueries: bool,
    /// Dispatch decorrelated subquery inputs across a worker pool
    pub parallel_decorrelation: bool,
    /// Worker count for parallel decorrelation; 0 picks a default from
    /// available parallelism
    pub subquery_workers: usize,
    /// Maximum patterns per phase; 0 = unlimited
    pub max_phase_patterns: usize,
    /// Aggregation inputs at or above this size stream instead of
    /// materializing group state per tuple vector
    pub streaming_aggregation_threshold: usize,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        PlannerOptions {
            decorrelate_subqueries: true,
            parallel_decorrelation: true,
            subquery_workers: 0,
            max_phase_patterns: 0,
            streaming_aggregation_threshold: 1024,
        }
    }
}

/// A pattern with its pushed constraints and cardinality estimate.
#[derive(Debug, Clone)]
pub struct PlannedPattern {
    pub pattern: Pattern,
    pub constraints: Vec<StorageConstraint>,
    pub estimate: usize,
}

/// A subquery with its decorrelation decision.
#[derive(Debug, Clone)]
pub struct PlannedSubquery {
    pub subquery: Subquery,
    pub decorrelate: bool,
    pub parallel: bool,
}

/// A non-pattern step placed at a specific point in the plan.
#[derive(Debug, Clone)]
pub enum PlanStep {
    Filter(Predicate),
    Bind(Expression),
    Subquery(PlannedSubquery),
}

impl fmt::Display for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanStep::Filter(p) => write!(f, "filter {p}"),
            PlanStep::Bind(e) => write!(f, "bind {e}"),
            PlanStep::Subquery(s) => {
                write!(f, "subquery {}", s.subquery)?;
                if s.decorrelate {
                    write!(f, " decorrelated")?;
                    if s.parallel {
                        write!(f, " parallel")?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// One pattern realization plus the steps that run right after it joins.
#[derive(Debug, Clone)]
pub struct PlanUnit {
    pub pattern: PlannedPattern,
    pub steps: Vec<PlanStep>,
}

/// A unit of work producing one joined relation.
#[derive(Debug, Clone, Default)]
pub struct Phase {
    pub units: Vec<PlanUnit>,
}

/// The compiled plan.
#[derive(Debug, Clone)]
pub struct Plan {
    pub inputs: Vec<InputSpec>,
    /// Steps satisfiable from the input bindings alone
    pub input_steps: Vec<PlanStep>,
    pub phases: Vec<Phase>,
    /// Steps that run after every phase (e.g. `missing` checks)
    pub final_steps: Vec<PlanStep>,
    pub find: Vec<FindElem>,
    pub order_by: Vec<OrderSpec>,
    /// Aggregates may stream; the executor applies the size threshold
    pub streaming_aggregation: bool,
    pub options: PlannerOptions,
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "plan:")?;
        if !self.inputs.is_empty() {
            write!(f, "  inputs:")?;
            for spec in &self.inputs {
                write!(f, " {spec}")?;
            }
            writeln!(f)?;
        }
        for step in &self.input_steps {
            writeln!(f, "  {step}")?;
        }
        for (i, phase) in self.phases.iter().enumerate() {
            writeln!(f, "  phase {i}:")?;
            for unit in &phase.units {
                write!(f, "    {} est={}", unit.pattern.pattern, unit.pattern.estimate)?;
                for constraint in &unit.pattern.constraints {
                    write!(f, " push {constraint}")?;
                }
                writeln!(f)?;
                for step in &unit.steps {
                    writeln!(f, "      {step}")?;
                }
            }
        }
        for step in &self.final_steps {
            writeln!(f, "  {step}")?;
        }
        let aggregates: Vec<String> = self
            .find
            .iter()
            .filter_map(|elem| match elem {
                FindElem::Aggregate(agg, s) => Some(format!("({} {s})", agg.as_str())),
                FindElem::Var(_) => None,
            })
            .collect();
        if !aggregates.is_empty() {
            writeln!(f, "  aggregate: {}", aggregates.join(" "))?;
        }
        if !self.order_by.is_empty() {
            let specs: Vec<String> = self.order_by.iter().map(ToString::to_string).collect();
            writeln!(f, "  order-by: {}", specs.join(" "))?;
        }
        Ok(())
    }
}

impl Plan {
    /// Symbols of the final result columns, in find order.
    pub fn result_columns(&self) -> Vec<Symbol> {
        self.find.iter().map(|e| e.symbol().clone()).collect()
    }
}

/// Compiles queries into plans.
pub struct Planner<'a> {
    options: PlannerOptions,
    stats: Option<&'a Statistics>,
}

impl<'a> Planner<'a> {
    pub fn new(options: PlannerOptions) -> Self {
        Planner {
            options,
            stats: None,
        }
    }

    pub fn with_stats(options: PlannerOptions, stats: &'a Statistics) -> Self {
        Planner {
            options,
            stats: Some(stats),
        }
    }

    /// Compile a query. Emits `query/plan-created` on the context's sink.
    pub fn plan(&self, query: &Query, ctx: &QueryContext) -> Result<Plan> {
        self.validate(query)?;

        let mut patterns: Vec<Pattern> = Vec::new();
        let mut steps: Vec<PlanStep> = Vec::new();
        for clause in &query.where_clauses {
            match clause {
                Clause::Pattern(p) => patterns.push(p.clone()),
                Clause::Predicate(p) => steps.push(PlanStep::Filter(p.clone())),
                Clause::Expression(e) => steps.push(PlanStep::Bind(e.clone())),
                Clause::Subquery(s) => steps.push(PlanStep::Subquery(PlannedSubquery {
                    subquery: s.clone(),
                    decorrelate: self.options.decorrelate_subqueries,
                    parallel: self.options.parallel_decorrelation,
                })),
            }
        }

        let input_syms = input_symbols(&query.inputs);
        let ordered = self.order_patterns(patterns, &input_syms);
        let (mut planned, steps) = self.push_predicates(ordered, steps);
        for unit in &mut planned {
            unit.pattern.constraints =
                compose_time_ranges(std::mem::take(&mut unit.pattern.constraints));
        }

        let (input_steps, placed, final_steps) =
            place_steps(&planned, steps, &input_syms)?;

        let phases = self.build_phases(planned, placed);

        let plan = Plan {
            inputs: query.inputs.clone(),
            input_steps,
            phases,
            final_steps,
            find: query.find.clone(),
            order_by: query.order_by.clone(),
            // safe to stream when every aggregate tolerates arrival order
            streaming_aggregation: query.has_aggregates()
                && query.find.iter().all(|elem| match elem {
                    FindElem::Aggregate(agg, _) => agg.is_order_insensitive(),
                    FindElem::Var(_) => true,
                }),
            options: self.options.clone(),
        };

        if ctx.instrumented() {
            ctx.emit(
                "query/plan-created",
                vec![
                    ("plan", json!(plan.to_string())),
                    ("phases", json!(plan.phases.len())),
                ],
            );
        }
        Ok(plan)
    }

    /// Normalization-time validation: registry lookups, arity, bindable
    /// find/order-by variables, duplicate columns.
    fn validate(&self, query: &Query) -> Result<()> {
        for clause in &query.where_clauses {
            match clause {
                Clause::Pattern(p) => {
                    if p.elems.len() != 3 && p.elems.len() != 4 {
                        return Err(QueryError::Validation(format!(
                            "data pattern has {} positions, expected 3 or 4",
                            p.elems.len()
                        )));
                    }
                }
                Clause::Predicate(p) => validate_predicate(p)?,
                Clause::Expression(e) => {
                    registry::validate_call(&e.name, e.args.len())?;
                    for arg in &e.args {
                        validate_term(arg)?;
                    }
                }
                Clause::Subquery(s) => {
                    self.validate(&s.query)?;
                    for input in &s.inputs {
                        validate_term(input)?;
                    }
                }
            }
        }

        let bound = query.bound_variables();
        for elem in &query.find {
            let sym = elem.symbol();
            if !bound.contains(sym) {
                return Err(QueryError::Validation(format!(
                    "find variable {sym} is never bound"
                )));
            }
        }
        let find_syms: Vec<&Symbol> = query.find.iter().map(FindElem::symbol).collect();
        for (i, sym) in find_syms.iter().enumerate() {
            if find_syms[..i].contains(sym) {
                return Err(QueryError::Validation(format!(
                    "duplicate column {sym} in find"
                )));
            }
        }
        for spec in &query.order_by {
            if !find_syms.contains(&&spec.symbol) {
                return Err(QueryError::Validation(format!(
                    "order-by variable {} is not a find column",
                    spec.symbol
                )));
            }
        }
        Ok(())
    }

    /// Greedy selectivity ordering. Every pattern shares a variable with the
    /// accumulated binding set whenever possible; Cartesian steps only when
    /// unavoidable.
    fn order_patterns(&self, mut patterns: Vec<Pattern>, input_syms: &[Symbol]) -> Vec<Pattern> {
        let mut bound: Vec<Symbol> = input_syms.to_vec();
        let mut ordered = Vec::with_capacity(patterns.len());

        while !patterns.is_empty() {
            let connected: Vec<usize> = (0..patterns.len())
                .filter(|&i| {
                    patterns[i]
                        .variables()
                        .iter()
                        .any(|v| bound.contains(v))
                })
                .collect();
            let candidates = if connected.is_empty() {
                (0..patterns.len()).collect()
            } else {
                connected
            };

            let best = candidates
                .into_iter()
                .min_by_key(|&i| self.estimate(&patterns[i], &bound))
                .expect("nonempty candidates");

            let pattern = patterns.remove(best);
            for var in pattern.variables() {
                if !bound.contains(&var) {
                    bound.push(var);
                }
            }
            ordered.push(pattern);
        }
        ordered
    }

    /// Cardinality estimate: statistics (or a heuristic) for the attribute,
    /// scaled down per bound position. A constant attribute is far more
    /// selective than a variable one.
    fn estimate(&self, pattern: &Pattern, bound: &[Symbol]) -> usize {
        use crate::datom::Position;

        let base = match pattern.elem(Position::A) {
            Some(PatternElem::Constant(Value::Keyword(kw))) => match self.stats {
                Some(stats) => stats.estimate_attribute(kw),
                None => 100,
            },
            _ => 10_000,
        };

        let bound_positions = [Position::E, Position::V, Position::T]
            .iter()
            .filter(|pos| match pattern.elem(**pos) {
                Some(PatternElem::Constant(_)) => true,
                Some(PatternElem::Variable(sym)) => bound.contains(sym),
                _ => false,
            })
            .count() as u32;

        (base / 20usize.saturating_pow(bound_positions)).max(1)
    }

    /// Move eligible filters into the matcher as storage constraints.
    fn push_predicates(
        &self,
        ordered: Vec<Pattern>,
        steps: Vec<PlanStep>,
    ) -> (Vec<PlanUnit>, Vec<PlanStep>) {
        let mut units: Vec<PlanUnit> = ordered
            .into_iter()
            .map(|pattern| {
                let bound: Vec<Symbol> = Vec::new();
                let estimate = self.estimate(&pattern, &bound);
                PlanUnit {
                    pattern: PlannedPattern {
                        pattern,
                        constraints: Vec::new(),
                        estimate,
                    },
                    steps: Vec::new(),
                }
            })
            .collect();

        let mut remaining = Vec::new();
        for step in steps {
            let pushed = match &step {
                PlanStep::Filter(pred) => match pushable_constraint(pred) {
                    Some((sym, constraint)) => {
                        v_position_pattern(&mut units, &sym).map(|target| {
                            target.pattern.constraints.push(constraint);
                        })
                    }
                    None => None,
                },
                _ => None,
            };
            if pushed.is_none() {
                remaining.push(step);
            }
        }
        (units, remaining)
    }

    /// Group ordered patterns into phases at connectivity boundaries and at
    /// the configured width.
    fn build_phases(&self, units: Vec<PlanUnit>, placed: Vec<Vec<PlanStep>>) -> Vec<Phase> {
        let mut phases: Vec<Phase> = Vec::new();
        let mut current = Phase::default();
        let mut current_vars: Vec<Symbol> = Vec::new();

        for (mut unit, steps) in units.into_iter().zip(placed) {
            unit.steps = steps;
            let vars = unit.pattern.pattern.variables();
            let connected = current_vars.is_empty()
                || vars.iter().any(|v| current_vars.contains(v))
                || !unit.steps.is_empty();
            let width_exceeded = self.options.max_phase_patterns > 0
                && current.units.len() >= self.options.max_phase_patterns;

            if !current.units.is_empty() && (!connected || width_exceeded) {
                phases.push(std::mem::take(&mut current));
                current_vars.clear();
            }
            for v in vars {
                if !current_vars.contains(&v) {
                    current_vars.push(v);
                }
            }
            // steps may bind further variables visible to later patterns
            for step in &unit.steps {
                match step {
                    PlanStep::Bind(e) => current_vars.push(e.binding.clone()),
                    PlanStep::Subquery(s) => {
                        current_vars.extend(s.subquery.binding.symbols().iter().cloned());
                    }
                    PlanStep::Filter(_) => {}
                }
            }
            current.units.push(unit);
        }
        if !current.units.is_empty() {
            phases.push(current);
        }
        phases
    }
}

fn validate_predicate(p: &Predicate) -> Result<()> {
    match p {
        Predicate::Compare { terms, .. } => {
            if terms.len() < 2 {
                return Err(QueryError::Validation(
                    "comparison requires at least two terms".to_string(),
                ));
            }
            for term in terms {
                validate_term(term)?;
            }
            Ok(())
        }
        Predicate::Ground(syms) | Predicate::Missing(syms) => {
            if syms.is_empty() {
                return Err(QueryError::Validation(
                    "ground/missing require at least one variable".to_string(),
                ));
            }
            Ok(())
        }
        Predicate::Call { name, args } => {
            registry::validate_call(name, args.len())?;
            for arg in args {
                validate_term(arg)?;
            }
            Ok(())
        }
    }
}

fn validate_term(term: &Term) -> Result<()> {
    if let Term::Call { name, args } = term {
        registry::validate_call(name, args.len())?;
        for arg in args {
            validate_term(arg)?;
        }
    }
    Ok(())
}

fn input_symbols(inputs: &[InputSpec]) -> Vec<Symbol> {
    let mut out = Vec::new();
    for spec in inputs {
        match spec {
            InputSpec::Database => {}
            InputSpec::Scalar(s) | InputSpec::Collection(s) => out.push(s.clone()),
            InputSpec::Tuple(syms) | InputSpec::Relation(syms) => out.extend(syms.iter().cloned()),
        }
    }
    out
}

fn flip(op: CompareOp) -> CompareOp {
    match op {
        CompareOp::Lt => CompareOp::Gt,
        CompareOp::Le => CompareOp::Ge,
        CompareOp::Gt => CompareOp::Lt,
        CompareOp::Ge => CompareOp::Le,
        CompareOp::Eq | CompareOp::Ne => op,
    }
}

/// `can_push_to_storage`: two-term variable–constant comparisons, directly or
/// through a time-component extraction.
fn pushable_constraint(pred: &Predicate) -> Option<(Symbol, StorageConstraint)> {
    let Predicate::Compare { op, terms } = pred else {
        return None;
    };
    let [left, right] = terms.as_slice() else {
        return None;
    };

    let oriented = match (left, right) {
        (Term::Variable(v), Term::Constant(c)) => Some((v.clone(), *op, c.clone(), None)),
        (Term::Constant(c), Term::Variable(v)) => Some((v.clone(), flip(*op), c.clone(), None)),
        (Term::Call { name, args }, Term::Constant(c)) => {
            component_call(name, args).map(|(comp, v)| (v, *op, c.clone(), Some(comp)))
        }
        (Term::Constant(c), Term::Call { name, args }) => {
            component_call(name, args).map(|(comp, v)| (v, flip(*op), c.clone(), Some(comp)))
        }
        _ => None,
    }?;

    match oriented {
        (sym, op, value, None) => Some((sym, StorageConstraint::Compare { op, value })),
        (sym, op, Value::Int64(value), Some(component)) => Some((
            sym,
            StorageConstraint::TimeComponentCompare { component, op, value },
        )),
        _ => None,
    }
}

fn component_call(name: &str, args: &[Term]) -> Option<(TimeComponent, Symbol)> {
    let component = TimeComponent::parse(name)?;
    match args {
        [Term::Variable(v)] => Some((component, v.clone())),
        _ => None,
    }
}

/// The first ordered pattern carrying `sym` as its V-position variable.
fn v_position_pattern<'u>(units: &'u mut [PlanUnit], sym: &Symbol) -> Option<&'u mut PlanUnit> {
    use crate::datom::Position;
    units.iter_mut().find(|unit| {
        matches!(
            unit.pattern.pattern.elem(Position::V),
            Some(PatternElem::Variable(v)) if v == sym
        )
    })
}

/// Compose year/month/day equality constraints into one contiguous time
/// range; a day or month alone stays a per-datom component check.
fn compose_time_ranges(constraints: Vec<StorageConstraint>) -> Vec<StorageConstraint> {
    let eq_component = |constraints: &[StorageConstraint], wanted: TimeComponent| {
        constraints.iter().find_map(|c| match c {
            StorageConstraint::TimeComponentCompare {
                component,
                op: CompareOp::Eq,
                value,
            } if *component == wanted => Some(*value),
            _ => None,
        })
    };

    let Some(year) = eq_component(&constraints, TimeComponent::Year) else {
        return constraints;
    };
    let month = eq_component(&constraints, TimeComponent::Month);
    let day = eq_component(&constraints, TimeComponent::Day);

    let range = match (month, day) {
        (Some(m), Some(d)) => Utc
            .with_ymd_and_hms(year as i32, m as u32, d as u32, 0, 0, 0)
            .single()
            .map(|start| (start, start + chrono::Duration::days(1))),
        (Some(m), None) => {
            let start = Utc.with_ymd_and_hms(year as i32, m as u32, 1, 0, 0, 0).single();
            let end = if m == 12 {
                Utc.with_ymd_and_hms(year as i32 + 1, 1, 1, 0, 0, 0).single()
            } else {
                Utc.with_ymd_and_hms(year as i32, m as u32 + 1, 1, 0, 0, 0).single()
            };
            start.zip(end)
        }
        (None, _) => {
            let start = Utc.with_ymd_and_hms(year as i32, 1, 1, 0, 0, 0).single();
            let end = Utc.with_ymd_and_hms(year as i32 + 1, 1, 1, 0, 0, 0).single();
            start.zip(end)
        }
    };
    let Some((start, end)) = range else {
        return constraints;
    };

    let composed: Vec<TimeComponent> = match (month, day) {
        (Some(_), Some(_)) => vec![TimeComponent::Year, TimeComponent::Month, TimeComponent::Day],
        (Some(_), None) => vec![TimeComponent::Year, TimeComponent::Month],
        (None, _) => vec![TimeComponent::Year],
    };

    let mut out: Vec<StorageConstraint> = constraints
        .into_iter()
        .filter(|c| {
            !matches!(c, StorageConstraint::TimeComponentCompare {
                component,
                op: CompareOp::Eq,
                ..
            } if composed.contains(component))
        })
        .collect();
    out.push(StorageConstraint::TimeRange {
        start: Some(start),
        end: Some(end),
    });
    out
}

/// Place each step after the pattern binding the last variable it requires.
/// Returns (input steps, per-pattern steps, final steps).
fn place_steps(
    units: &[PlanUnit],
    steps: Vec<PlanStep>,
    input_syms: &[Symbol],
) -> Result<(Vec<PlanStep>, Vec<Vec<PlanStep>>, Vec<PlanStep>)> {
    let mut input_steps = Vec::new();
    let mut placed: Vec<Vec<PlanStep>> = vec![Vec::new(); units.len()];
    let mut final_steps = Vec::new();

    let mut bound: Vec<Symbol> = input_syms.to_vec();
    let mut pending: Vec<PlanStep> = steps;

    // Steps satisfiable from inputs alone run before any pattern
    let mut progressed = true;
    while progressed {
        progressed = false;
        let mut rest = Vec::new();
        for step in pending {
            if placement_ready(&step, &bound) {
                bind_step_outputs(&step, &mut bound);
                input_steps.push(step);
                progressed = true;
            } else {
                rest.push(step);
            }
        }
        pending = rest;
    }

    for (i, unit) in units.iter().enumerate() {
        for var in unit.pattern.pattern.variables() {
            if !bound.contains(&var) {
                bound.push(var);
            }
        }
        let mut progressed = true;
        while progressed {
            progressed = false;
            let mut rest = Vec::new();
            for step in pending {
                if placement_ready(&step, &bound) {
                    bind_step_outputs(&step, &mut bound);
                    placed[i].push(step);
                    progressed = true;
                } else {
                    rest.push(step);
                }
            }
            pending = rest;
        }
    }

    for step in pending {
        match &step {
            // missing/ground over never-bound variables run at the end,
            // where "unbound" is the final word
            PlanStep::Filter(Predicate::Missing(_)) | PlanStep::Filter(Predicate::Ground(_)) => {
                final_steps.push(step);
            }
            PlanStep::Filter(p) => {
                let unresolved = p
                    .required()
                    .into_iter()
                    .find(|s| !bound.contains(s))
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_default();
                return Err(QueryError::Validation(format!(
                    "predicate {p} references variable ?{} that no clause binds",
                    unresolved.trim_start_matches('?')
                )));
            }
            PlanStep::Bind(e) => {
                return Err(QueryError::Validation(format!(
                    "expression {e} references a variable that no clause binds"
                )));
            }
            PlanStep::Subquery(s) => {
                return Err(QueryError::Validation(format!(
                    "subquery {} references a variable that no clause binds",
                    s.subquery
                )));
            }
        }
    }

    Ok((input_steps, placed, final_steps))
}

fn placement_ready(step: &PlanStep, bound: &[Symbol]) -> bool {
    let required: Vec<Symbol> = match step {
        PlanStep::Filter(Predicate::Ground(syms)) => syms.clone(),
        PlanStep::Filter(Predicate::Missing(_)) => return false, // always final
        PlanStep::Filter(p) => p.required(),
        PlanStep::Bind(e) => e.required(),
        PlanStep::Subquery(s) => {
            let mut out = Vec::new();
            for term in &s.subquery.inputs {
                term.variables(&mut out);
            }
            out
        }
    };
    required.iter().all(|s| bound.contains(s))
}

fn bind_step_outputs(step: &PlanStep, bound: &mut Vec<Symbol>) {
    match step {
        PlanStep::Bind(e) => {
            if !bound.contains(&e.binding) {
                bound.push(e.binding.clone());
            }
        }
        PlanStep::Subquery(s) => {
            for sym in s.subquery.binding.symbols() {
                if !bound.contains(sym) {
                    bound.push(sym.clone());
                }
            }
        }
        PlanStep::Filter(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse_query;

    fn plan_of(src: &str) -> Plan {
        let query = parse_query(src).expect("parse");
        Planner::new(PlannerOptions::default())
            .plan(&query, &QueryContext::new())
            .expect("plan")
    }

    #[test]
    fn test_unknown_function_fails_at_plan_time() {
        let query = parse_query("[:find ?x :where [?x :a ?v] [(frob ?v)]]").expect("parse");
        let err = Planner::new(PlannerOptions::default())
            .plan(&query, &QueryContext::new())
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
        assert!(err.to_string().contains("frob"));
    }

    #[test]
    fn test_wrong_arity_fails_at_plan_time() {
        let query = parse_query("[:find ?x :where [?x :a ?v] [(= (day ?v ?v) 2)]]").expect("parse");
        assert!(Planner::new(PlannerOptions::default())
            .plan(&query, &QueryContext::new())
            .is_err());
    }

    #[test]
    fn test_unbound_find_variable_rejected() {
        let query = parse_query("[:find ?missing :where [?e :a ?v]]").expect("parse");
        let err = Planner::new(PlannerOptions::default())
            .plan(&query, &QueryContext::new())
            .unwrap_err();
        assert!(err.to_string().contains("?missing"));
    }

    #[test]
    fn test_selective_pattern_ordered_first() {
        // The ticker lookup (constant V) should run before the price scans
        let plan = plan_of(
            "[:find (max ?h) :where [?p :price/symbol ?s] [?p :price/high ?h] [?s :symbol/ticker \"AAPL\"]]",
        );
        let first = &plan.phases[0].units[0].pattern.pattern;
        assert!(first.to_string().contains(":symbol/ticker"));
    }

    #[test]
    fn test_predicate_placed_after_binding_pattern() {
        let plan = plan_of(
            "[:find ?n :where [?e :user/name ?n] [?e :user/age ?a] [(> ?a ?a)]]",
        );
        // the filter lands on the unit whose pattern binds ?a
        let with_filter: Vec<&PlanUnit> = plan
            .phases
            .iter()
            .flat_map(|ph| &ph.units)
            .filter(|u| !u.steps.is_empty())
            .collect();
        assert_eq!(with_filter.len(), 1);
        assert!(with_filter[0].pattern.pattern.to_string().contains(":user/age"));
    }

    #[test]
    fn test_var_const_comparison_pushed_to_storage() {
        let plan = plan_of("[:find ?n :where [?e :user/name ?n] [?e :user/age ?a] [(> ?a 26)]]");
        let constrained: Vec<&PlannedPattern> = plan
            .phases
            .iter()
            .flat_map(|ph| &ph.units)
            .map(|u| &u.pattern)
            .filter(|p| !p.constraints.is_empty())
            .collect();
        assert_eq!(constrained.len(), 1);
        assert!(constrained[0].pattern.to_string().contains(":user/age"));
        // and no residual filter step remains
        let residual_filters = plan
            .phases
            .iter()
            .flat_map(|ph| &ph.units)
            .flat_map(|u| &u.steps)
            .filter(|s| matches!(s, PlanStep::Filter(_)))
            .count();
        assert_eq!(residual_filters, 0);
    }

    #[test]
    fn test_day_extraction_pushed_as_component_constraint() {
        let plan = plan_of("[:find ?e :where [?e :t ?t] [(= (day ?t) 2)]]");
        let constraints = &plan.phases[0].units[0].pattern.constraints;
        assert_eq!(constraints.len(), 1);
        assert!(matches!(
            constraints[0],
            StorageConstraint::TimeComponentCompare {
                component: TimeComponent::Day,
                op: CompareOp::Eq,
                value: 2
            }
        ));
    }

    #[test]
    fn test_ymd_equalities_compose_into_time_range() {
        let plan = plan_of(
            "[:find ?e :where [?e :t ?t] [(= (year ?t) 2025)] [(= (month ?t) 6)] [(= (day ?t) 2)]]",
        );
        let constraints = &plan.phases[0].units[0].pattern.constraints;
        assert_eq!(constraints.len(), 1);
        match &constraints[0] {
            StorageConstraint::TimeRange { start, end } => {
                assert_eq!(start.expect("start").to_rfc3339(), "2025-06-02T00:00:00+00:00");
                assert_eq!(end.expect("end").to_rfc3339(), "2025-06-03T00:00:00+00:00");
            }
            other => panic!("expected time range, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_runs_last() {
        let plan = plan_of("[:find ?e :where [?e :a ?v] [(missing ?zzz)]]");
        assert_eq!(plan.final_steps.len(), 1);
    }

    #[test]
    fn test_plan_display_mentions_phases() {
        let plan = plan_of("[:find ?n :where [?e :user/name ?n]]");
        let rendered = plan.to_string();
        assert!(rendered.contains("phase 0"));
        assert!(rendered.contains(":user/name"));
    }

    #[test]
    fn test_plan_created_event() {
        use crate::events::{CollectingSink, EventSink};
        use std::sync::Arc;

        let sink = Arc::new(CollectingSink::new());
        let ctx = QueryContext::with_sink(Arc::clone(&sink) as Arc<dyn EventSink>);
        let query = parse_query("[:find ?n :where [?e :user/name ?n]]").expect("parse");
        Planner::new(PlannerOptions::default())
            .plan(&query, &ctx)
            .expect("plan");
        assert_eq!(sink.count("query/plan-created"), 1);
    }
}
