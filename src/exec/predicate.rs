//! Predicate Evaluation
//!
//! Applies a filtering predicate to one tuple. Comparison chains hold iff
//! every adjacent pair holds; comparisons across incomparable variants are
//! false, never a panic. A comparison or function call that references a
//! symbol absent from the input columns is a resolution error; `ground` and
//! `missing` are the two predicates that test bindability itself.

use crate::error::{QueryError, Result};
use crate::exec::functions::eval_call;
use crate::query::ast::{CompareOp, Predicate, Symbol, Term};
use crate::relation::{Columns, Tuple};
use crate::value::Value;
use std::cmp::Ordering;

/// Resolve a term to a value against one tuple.
pub fn resolve_term(term: &Term, columns: &Columns, tuple: &Tuple) -> Result<Value> {
    match term {
        Term::Constant(v) => Ok(v.clone()),
        Term::Variable(sym) => resolve_symbol(sym, columns, tuple),
        Term::Call { name, args } => {
            let resolved: Vec<Value> = args
                .iter()
                .map(|arg| resolve_term(arg, columns, tuple))
                .collect::<Result<_>>()?;
            eval_call(name, &resolved)
        }
        Term::Database => Err(QueryError::Validation(
            "$ is only valid as a subquery input".to_string(),
        )),
    }
}

fn resolve_symbol(sym: &Symbol, columns: &Columns, tuple: &Tuple) -> Result<Value> {
    columns
        .index_of(sym)
        .map(|i| tuple[i].clone())
        .ok_or_else(|| QueryError::Resolution(sym.as_str().to_string()))
}

pub(crate) fn op_holds(op: CompareOp, ord: Option<Ordering>) -> bool {
    match ord {
        None => false,
        Some(ord) => match op {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        },
    }
}

/// Evaluate a predicate against one tuple.
pub fn eval_predicate(pred: &Predicate, columns: &Columns, tuple: &Tuple) -> Result<bool> {
    match pred {
        Predicate::Compare { op, terms } => {
            let values: Vec<Value> = terms
                .iter()
                .map(|t| resolve_term(t, columns, tuple))
                .collect::<Result<_>>()?;
            Ok(values
                .windows(2)
                .all(|pair| op_holds(*op, pair[0].compare(&pair[1]))))
        }
        Predicate::Ground(syms) => Ok(syms.iter().all(|s| columns.contains(s))),
        Predicate::Missing(syms) => Ok(!syms.iter().any(|s| columns.contains(s))),
        Predicate::Call { name, args } => {
            let resolved: Vec<Value> = args
                .iter()
                .map(|arg| resolve_term(arg, columns, tuple))
                .collect::<Result<_>>()?;
            match eval_call(name, &resolved)? {
                Value::Bool(b) => Ok(b),
                other => Err(QueryError::Type {
                    expected: "bool",
                    got: other.type_tag(),
                }),
            }
        }
    }
}
