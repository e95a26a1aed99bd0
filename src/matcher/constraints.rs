//! Storage-Pushed Constraints
//!
//! Predicates the planner proves can run inside the matcher, against each
//! decoded datom, before tuple construction. A pushed constraint must drop
//! exactly the tuples its post-realization counterpart would drop, so its
//! semantics mirror predicate evaluation: incomparable value comparisons are
//! false, and a time-component check of a non-time value is a type error.

use crate::error::{QueryError, Result};
use crate::query::ast::CompareOp;
use crate::value::Value;
use chrono::{DateTime, Datelike, Timelike, Utc};
use std::cmp::Ordering;
use std::fmt;

/// A calendar/clock component of a time value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeComponent {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl TimeComponent {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "year" => Some(TimeComponent::Year),
            "month" => Some(TimeComponent::Month),
            "day" => Some(TimeComponent::Day),
            "hour" => Some(TimeComponent::Hour),
            "minute" => Some(TimeComponent::Minute),
            "second" => Some(TimeComponent::Second),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeComponent::Year => "year",
            TimeComponent::Month => "month",
            TimeComponent::Day => "day",
            TimeComponent::Hour => "hour",
            TimeComponent::Minute => "minute",
            TimeComponent::Second => "second",
        }
    }

    /// Extract this component from a UTC instant.
    pub fn extract(&self, t: &DateTime<Utc>) -> i64 {
        match self {
            TimeComponent::Year => i64::from(t.year()),
            TimeComponent::Month => i64::from(t.month()),
            TimeComponent::Day => i64::from(t.day()),
            TimeComponent::Hour => i64::from(t.hour()),
            TimeComponent::Minute => i64::from(t.minute()),
            TimeComponent::Second => i64::from(t.second()),
        }
    }
}

/// A constraint evaluated against the decoded V component during a scan.
#[derive(Debug, Clone)]
pub enum StorageConstraint {
    /// `V <op> constant` under predicate comparison semantics
    Compare { op: CompareOp, value: Value },
    /// V is a time within `[start, end)`; either bound may be open
    TimeRange {
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
    /// `<component>(V) <op> constant`; V must be a time value
    TimeComponentCompare {
        component: TimeComponent,
        op: CompareOp,
        value: i64,
    },
}

fn op_holds(op: CompareOp, ord: Option<Ordering>) -> bool {
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

impl StorageConstraint {
    /// Does the decoded V component satisfy this constraint?
    pub fn matches(&self, v: &Value) -> Result<bool> {
        match self {
            StorageConstraint::Compare { op, value } => Ok(op_holds(*op, v.compare(value))),
            StorageConstraint::TimeRange { start, end } => match v {
                Value::Time(t) => {
                    Ok(start.is_none_or(|s| *t >= s) && end.is_none_or(|e| *t < e))
                }
                _ => Ok(false),
            },
            StorageConstraint::TimeComponentCompare { component, op, value } => match v {
                Value::Time(t) => {
                    Ok(op_holds(*op, Some(component.extract(t).cmp(value))))
                }
                other => Err(QueryError::Type {
                    expected: "time",
                    got: other.type_tag(),
                }),
            },
        }
    }
}

impl fmt::Display for StorageConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageConstraint::Compare { op, value } => write!(f, "(v {} {value})", op.as_str()),
            StorageConstraint::TimeRange { start, end } => {
                write!(f, "(v in [")?;
                match start {
                    Some(s) => write!(f, "{s}")?,
                    None => write!(f, "..")?,
                }
                write!(f, ", ")?;
                match end {
                    Some(e) => write!(f, "{e}")?,
                    None => write!(f, "..")?,
                }
                write!(f, "))")
            }
            StorageConstraint::TimeComponentCompare { component, op, value } => {
                write!(f, "(({} v) {} {value})", component.as_str(), op.as_str())
            }
        }
    }
}
