//! # Query AST
//!
//! Parsed representation of a query: find elements, input specs, where
//! clauses (data patterns, predicates, expression bindings, subqueries), and
//! order-by specs. Clauses are tagged sum types dispatched by pattern match.
//!
//! `Display` renders the surface syntax back out; for any query `q`,
//! `q.to_string()` re-parses to an equivalent AST.

use crate::datom::Position;
use crate::value::Value;
use std::fmt;

/// A symbol from the query surface. Symbols starting with `?` denote
/// variables.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Symbol(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// By convention any symbol starting with `?` is a query variable.
    pub fn is_variable(&self) -> bool {
        self.0.starts_with('?')
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::new(s)
    }
}

/// One element of a data pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternElem {
    Constant(Value),
    Variable(Symbol),
    /// Anonymous position, written `_`
    Blank,
}

impl PatternElem {
    pub fn as_variable(&self) -> Option<&Symbol> {
        match self {
            PatternElem::Variable(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<&Value> {
        match self {
            PatternElem::Constant(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for PatternElem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternElem::Constant(v) => write!(f, "{v}"),
            PatternElem::Variable(s) => write!(f, "{s}"),
            PatternElem::Blank => write!(f, "_"),
        }
    }
}

/// A data pattern over `(E, A, V)` or `(E, A, V, T)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub elems: Vec<PatternElem>,
}

impl Pattern {
    pub fn new(elems: Vec<PatternElem>) -> Self {
        Pattern { elems }
    }

    /// The element at a datom position, if the pattern covers it.
    pub fn elem(&self, position: Position) -> Option<&PatternElem> {
        let idx = match position {
            Position::E => 0,
            Position::A => 1,
            Position::V => 2,
            Position::T => 3,
        };
        self.elems.get(idx)
    }

    /// Variables in pattern position order (E, A, V, T).
    pub fn variables(&self) -> Vec<Symbol> {
        self.elems
            .iter()
            .filter_map(PatternElem::as_variable)
            .cloned()
            .collect()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, elem) in self.elems.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{elem}")?;
        }
        write!(f, "]")
    }
}

/// An argument term: a constant, a variable, or a nested function call
/// (e.g. `(day ?t)` inside a comparison).
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Constant(Value),
    Variable(Symbol),
    Call { name: String, args: Vec<Term> },
    /// `$` — the database itself; valid only in subquery input position
    Database,
}

impl Term {
    /// Variables referenced by this term, recursively.
    pub fn variables(&self, out: &mut Vec<Symbol>) {
        match self {
            Term::Constant(_) | Term::Database => {}
            Term::Variable(s) => {
                if !out.contains(s) {
                    out.push(s.clone());
                }
            }
            Term::Call { args, .. } => {
                for arg in args {
                    arg.variables(out);
                }
            }
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Constant(v) => write!(f, "{v}"),
            Term::Variable(s) => write!(f, "{s}"),
            Term::Database => write!(f, "$"),
            Term::Call { name, args } => {
                write!(f, "({name}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Comparison operators over the value ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "=" => Some(CompareOp::Eq),
            "!=" => Some(CompareOp::Ne),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Ge),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// A filtering predicate clause `[(<op> <term>+)]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Comparison; with more than two terms every adjacent pair must hold
    Compare { op: CompareOp, terms: Vec<Term> },
    /// Passes when all listed variables are bound
    Ground(Vec<Symbol>),
    /// Passes when none of the listed variables are bound
    Missing(Vec<Symbol>),
    /// Registered boolean function, e.g. `(str/starts-with? ?s "A")`
    Call { name: String, args: Vec<Term> },
}

impl Predicate {
    /// Variables this predicate requires from its input tuple.
    pub fn required(&self) -> Vec<Symbol> {
        let mut out = Vec::new();
        match self {
            Predicate::Compare { terms, .. } | Predicate::Call { args: terms, .. } => {
                for term in terms {
                    term.variables(&mut out);
                }
            }
            Predicate::Ground(syms) | Predicate::Missing(syms) => {
                // ground/missing test bindability; they never fail to resolve
                let _ = syms;
            }
        }
        out
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Compare { op, terms } => {
                write!(f, "[({}", op.as_str())?;
                for term in terms {
                    write!(f, " {term}")?;
                }
                write!(f, ")]")
            }
            Predicate::Ground(syms) => {
                write!(f, "[(ground")?;
                for s in syms {
                    write!(f, " {s}")?;
                }
                write!(f, ")]")
            }
            Predicate::Missing(syms) => {
                write!(f, "[(missing")?;
                for s in syms {
                    write!(f, " {s}")?;
                }
                write!(f, ")]")
            }
            Predicate::Call { name, args } => {
                write!(f, "[({name}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                write!(f, ")]")
            }
        }
    }
}

/// An expression clause `[(<fn> <term>*) ?binding]`: evaluates the function
/// per tuple and appends the result under a new column.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub name: String,
    pub args: Vec<Term>,
    pub binding: Symbol,
}

impl Expression {
    pub fn required(&self) -> Vec<Symbol> {
        let mut out = Vec::new();
        for arg in &self.args {
            arg.variables(&mut out);
        }
        out
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[({}", self.name)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        write!(f, ") {}]", self.binding)
    }
}

/// Binding form for subquery results.
#[derive(Debug, Clone, PartialEq)]
pub enum BindForm {
    /// `?c` — single scalar
    Scalar(Symbol),
    /// `[[?a ?b]]` — single tuple
    Tuple(Vec<Symbol>),
    /// `[[?a ?b] ...]` — full relation
    Relation(Vec<Symbol>),
}

impl BindForm {
    pub fn symbols(&self) -> &[Symbol] {
        match self {
            BindForm::Scalar(s) => std::slice::from_ref(s),
            BindForm::Tuple(syms) | BindForm::Relation(syms) => syms,
        }
    }
}

impl fmt::Display for BindForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindForm::Scalar(s) => write!(f, "{s}"),
            BindForm::Tuple(syms) => {
                write!(f, "[[")?;
                for (i, s) in syms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{s}")?;
                }
                write!(f, "]]")
            }
            BindForm::Relation(syms) => {
                write!(f, "[[")?;
                for (i, s) in syms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{s}")?;
                }
                write!(f, "] ...]")
            }
        }
    }
}

/// A subquery clause `[(q <query> <inputs>*) <binding>]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Subquery {
    pub query: Box<Query>,
    pub inputs: Vec<Term>,
    pub binding: BindForm,
}

impl fmt::Display for Subquery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[(q {}", self.query)?;
        for input in &self.inputs {
            write!(f, " {input}")?;
        }
        write!(f, ") {}]", self.binding)
    }
}

/// A `:where` clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Pattern(Pattern),
    Predicate(Predicate),
    Expression(Expression),
    Subquery(Subquery),
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::Pattern(p) => write!(f, "{p}"),
            Clause::Predicate(p) => write!(f, "{p}"),
            Clause::Expression(e) => write!(f, "{e}"),
            Clause::Subquery(s) => write!(f, "{s}"),
        }
    }
}

/// Aggregate functions usable in find position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "count" => Some(AggregateFn::Count),
            "sum" => Some(AggregateFn::Sum),
            "avg" => Some(AggregateFn::Avg),
            "min" => Some(AggregateFn::Min),
            "max" => Some(AggregateFn::Max),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFn::Count => "count",
            AggregateFn::Sum => "sum",
            AggregateFn::Avg => "avg",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
        }
    }

    /// Commutative-associative aggregates tolerate any arrival order, which
    /// makes them streamable regardless of input order.
    pub fn is_order_insensitive(&self) -> bool {
        true
    }
}

/// One element of the `:find` vector.
#[derive(Debug, Clone, PartialEq)]
pub enum FindElem {
    Var(Symbol),
    Aggregate(AggregateFn, Symbol),
}

impl FindElem {
    pub fn symbol(&self) -> &Symbol {
        match self {
            FindElem::Var(s) | FindElem::Aggregate(_, s) => s,
        }
    }
}

impl fmt::Display for FindElem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindElem::Var(s) => write!(f, "{s}"),
            FindElem::Aggregate(agg, s) => write!(f, "({} {s})", agg.as_str()),
        }
    }
}

/// One element of the `:in` vector.
#[derive(Debug, Clone, PartialEq)]
pub enum InputSpec {
    /// `$` — the database
    Database,
    /// `?x` — a scalar
    Scalar(Symbol),
    /// `[?x ...]` — a collection of scalars
    Collection(Symbol),
    /// `[[?x ?y]]` — a single tuple
    Tuple(Vec<Symbol>),
    /// `[[?x ?y] ...]` — a full relation
    Relation(Vec<Symbol>),
}

impl fmt::Display for InputSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSpec::Database => write!(f, "$"),
            InputSpec::Scalar(s) => write!(f, "{s}"),
            InputSpec::Collection(s) => write!(f, "[{s} ...]"),
            InputSpec::Tuple(syms) => {
                write!(f, "[[")?;
                for (i, s) in syms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{s}")?;
                }
                write!(f, "]]")
            }
            InputSpec::Relation(syms) => {
                write!(f, "[[")?;
                for (i, s) in syms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{s}")?;
                }
                write!(f, "] ...]")
            }
        }
    }
}

/// Sort direction for an order-by spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// One order-by spec: `?x` (ascending) or `(desc ?x)` / `(asc ?x)`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpec {
    pub symbol: Symbol,
    pub direction: Direction,
}

impl fmt::Display for OrderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Asc => write!(f, "{}", self.symbol),
            Direction::Desc => write!(f, "(desc {})", self.symbol),
        }
    }
}

/// A complete parsed query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub find: Vec<FindElem>,
    pub inputs: Vec<InputSpec>,
    pub where_clauses: Vec<Clause>,
    pub order_by: Vec<OrderSpec>,
}

impl Query {
    /// True when any find element aggregates.
    pub fn has_aggregates(&self) -> bool {
        self.find
            .iter()
            .any(|f| matches!(f, FindElem::Aggregate(_, _)))
    }

    /// Variables bound by data patterns and expression/subquery bindings.
    pub fn bound_variables(&self) -> Vec<Symbol> {
        let mut out = Vec::new();
        let mut push = |s: &Symbol| {
            if !out.contains(s) {
                out.push(s.clone());
            }
        };
        for spec in &self.inputs {
            match spec {
                InputSpec::Database => {}
                InputSpec::Scalar(s) | InputSpec::Collection(s) => push(s),
                InputSpec::Tuple(syms) | InputSpec::Relation(syms) => {
                    syms.iter().for_each(&mut push);
                }
            }
        }
        for clause in &self.where_clauses {
            match clause {
                Clause::Pattern(p) => p.variables().iter().for_each(&mut push),
                Clause::Expression(e) => push(&e.binding),
                Clause::Subquery(s) => s.binding.symbols().iter().for_each(&mut push),
                Clause::Predicate(_) => {}
            }
        }
        out
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[:find")?;
        for elem in &self.find {
            write!(f, " {elem}")?;
        }
        if !self.inputs.is_empty() {
            write!(f, " :in")?;
            for spec in &self.inputs {
                write!(f, " {spec}")?;
            }
        }
        write!(f, " :where")?;
        for clause in &self.where_clauses {
            write!(f, " {clause}")?;
        }
        if !self.order_by.is_empty() {
            write!(f, " :order-by [")?;
            for (i, spec) in self.order_by.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{spec}")?;
            }
            write!(f, "]")?;
        }
        write!(f, "]")
    }
}
