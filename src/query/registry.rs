//! Function Registry
//!
//! Maps function-name strings to validator records. Every function referenced
//! by a predicate or expression clause must be registered; an unknown name or
//! a wrong arity is a plan-time validation error, reported before any storage
//! access.

use crate::error::{QueryError, Result};

/// How the planner may treat calls to a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// Boolean test usable in predicate position
    Predicate,
    /// Value-producing function usable in expression position
    Scalar,
    /// Scalar extraction of one component of a time value; comparisons
    /// against constants are candidates for storage pushdown
    TimeComponent,
}

/// Validator record for a registered function.
#[derive(Debug, Clone, Copy)]
pub struct FunctionDef {
    pub name: &'static str,
    pub kind: FunctionKind,
    pub min_arity: usize,
    /// `None` = variadic
    pub max_arity: Option<usize>,
}

/// The registry. Initialized at process start, never mutated.
static REGISTRY: &[FunctionDef] = &[
    // String predicates
    FunctionDef { name: "str/starts-with?", kind: FunctionKind::Predicate, min_arity: 2, max_arity: Some(2) },
    FunctionDef { name: "str/ends-with?", kind: FunctionKind::Predicate, min_arity: 2, max_arity: Some(2) },
    FunctionDef { name: "str/contains?", kind: FunctionKind::Predicate, min_arity: 2, max_arity: Some(2) },
    // Time components
    FunctionDef { name: "year", kind: FunctionKind::TimeComponent, min_arity: 1, max_arity: Some(1) },
    FunctionDef { name: "month", kind: FunctionKind::TimeComponent, min_arity: 1, max_arity: Some(1) },
    FunctionDef { name: "day", kind: FunctionKind::TimeComponent, min_arity: 1, max_arity: Some(1) },
    FunctionDef { name: "hour", kind: FunctionKind::TimeComponent, min_arity: 1, max_arity: Some(1) },
    FunctionDef { name: "minute", kind: FunctionKind::TimeComponent, min_arity: 1, max_arity: Some(1) },
    FunctionDef { name: "second", kind: FunctionKind::TimeComponent, min_arity: 1, max_arity: Some(1) },
    FunctionDef { name: "same-date?", kind: FunctionKind::Predicate, min_arity: 2, max_arity: Some(2) },
    // Expression functions
    FunctionDef { name: "+", kind: FunctionKind::Scalar, min_arity: 2, max_arity: None },
    FunctionDef { name: "-", kind: FunctionKind::Scalar, min_arity: 2, max_arity: None },
    FunctionDef { name: "*", kind: FunctionKind::Scalar, min_arity: 2, max_arity: None },
    FunctionDef { name: "/", kind: FunctionKind::Scalar, min_arity: 2, max_arity: None },
    FunctionDef { name: "str", kind: FunctionKind::Scalar, min_arity: 1, max_arity: None },
    FunctionDef { name: "identity", kind: FunctionKind::Scalar, min_arity: 1, max_arity: Some(1) },
    FunctionDef { name: "ground", kind: FunctionKind::Scalar, min_arity: 1, max_arity: Some(1) },
    FunctionDef { name: "and", kind: FunctionKind::Scalar, min_arity: 2, max_arity: None },
];

/// Look up a function by name.
pub fn lookup(name: &str) -> Option<&'static FunctionDef> {
    REGISTRY.iter().find(|def| def.name == name)
}

/// Validate a call site: the name must be registered and the arity in range.
pub fn validate_call(name: &str, arity: usize) -> Result<&'static FunctionDef> {
    let def = lookup(name)
        .ok_or_else(|| QueryError::Validation(format!("unknown function '{name}'")))?;
    if arity < def.min_arity || def.max_arity.is_some_and(|max| arity > max) {
        let expected = match def.max_arity {
            Some(max) if max == def.min_arity => format!("{max}"),
            Some(max) => format!("{}..{}", def.min_arity, max),
            None => format!("{}+", def.min_arity),
        };
        return Err(QueryError::Validation(format!(
            "function '{name}' expects {expected} argument(s), got {arity}"
        )));
    }
    Ok(def)
}
