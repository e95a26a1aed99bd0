//! # Value Type System
//!
//! Core value types for the EAV store: strings, 64-bit integers and floats,
//! booleans, nanosecond UTC timestamps, byte arrays, namespaced keywords, and
//! content-addressed identities.
//!
//! A total ordering is defined across all variants (variant rank first, then
//! payload) so values can serve as ordered index-key components, aggregate
//! inputs, and sort keys. Predicate comparison is a separate, semantic
//! operation ([`Value::compare`]) that mixes the numeric variants and reports
//! incomparable pairs instead of ordering them by rank.
//!
//! ## Usage
//!
//! ```rust
//! use tetradb::value::Value;
//!
//! let name = Value::from("Alice");
//! let age = Value::Int64(30);
//! let attr = Value::keyword(":user/name").unwrap();
//! assert!(name < attr || attr < name);
//! ```

pub mod identity;
pub mod intern;
pub mod keyword;

pub use identity::{Identity, HASH_LEN};
pub use keyword::Keyword;

use chrono::{DateTime, SecondsFormat, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A typed value stored in the V position of a datom (and, for identities
/// and keywords, in the E and A positions).
#[derive(Clone)]
pub enum Value {
    Bool(bool),
    Int64(i64),
    Float64(f64),
    /// Nanosecond-precision UTC instant
    Time(DateTime<Utc>),
    String(String),
    Bytes(Vec<u8>),
    Keyword(Arc<Keyword>),
    Identity(Arc<Identity>),
}

impl Value {
    /// Intern a keyword literal such as `:user/name`.
    pub fn keyword(text: &str) -> Option<Value> {
        Keyword::parse(text).map(Value::Keyword)
    }

    /// Mint an identity from a source string.
    pub fn identity(name: &str) -> Value {
        Value::Identity(Identity::from_name(name))
    }

    /// Variant rank used by the total order and the key codec.
    ///
    /// The codec writes this as the key tag byte, so byte order in storage
    /// agrees with `Ord` on `Value`.
    pub fn variant_rank(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Int64(_) => 1,
            Value::Float64(_) => 2,
            Value::Time(_) => 3,
            Value::String(_) => 4,
            Value::Bytes(_) => 5,
            Value::Keyword(_) => 6,
            Value::Identity(_) => 7,
        }
    }

    /// Human-readable type tag for error reporting.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int64(_) => "int",
            Value::Float64(_) => "float",
            Value::Time(_) => "time",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Keyword(_) => "keyword",
            Value::Identity(_) => "identity",
        }
    }

    /// Semantic comparison for predicates.
    ///
    /// Same-variant values compare by payload; `Int64` and `Float64` compare
    /// numerically across variants. Every other cross-variant pair is
    /// incomparable and yields `None` (predicates treat that as false rather
    /// than panicking).
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int64(a), Value::Float64(b)) => Some((*a as f64).total_cmp(b)),
            (Value::Float64(a), Value::Int64(b)) => Some(a.total_cmp(&(*b as f64))),
            (a, b) if a.variant_rank() == b.variant_rank() => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// True when this value is a numeric variant.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int64(_) | Value::Float64(_))
    }

    /// Numeric payload as `f64`, if numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(i) => Some(*i as f64),
            Value::Float64(f) => Some(*f),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            // total_cmp semantics keep Eq consistent with Ord for floats
            (Value::Float64(a), Value::Float64(b)) => a.total_cmp(b) == Ordering::Equal,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Keyword(a), Value::Keyword(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::Identity(a), Value::Identity(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int64(a), Value::Int64(b)) => a.cmp(b),
            (Value::Float64(a), Value::Float64(b)) => a.total_cmp(b),
            (Value::Time(a), Value::Time(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Keyword(a), Value::Keyword(b)) => a.cmp(b),
            (Value::Identity(a), Value::Identity(b)) => a.cmp(b),
            (a, b) => a.variant_rank().cmp(&b.variant_rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.variant_rank().hash(state);
        match self {
            Value::Bool(b) => b.hash(state),
            Value::Int64(i) => i.hash(state),
            Value::Float64(f) => f.to_bits().hash(state),
            Value::Time(t) => t.hash(state),
            Value::String(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Keyword(k) => k.hash(state),
            Value::Identity(i) => i.hash(state),
        }
    }
}

impl fmt::Display for Value {
    /// Renders in the surface-syntax literal grammar, so printed constants
    /// re-parse to equal values.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int64(i) => write!(f, "{i}"),
            Value::Float64(v) => write!(f, "{v:?}"),
            Value::Time(t) => write!(
                f,
                "#inst \"{}\"",
                t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
            ),
            Value::String(s) => {
                write!(f, "\"")?;
                for c in s.chars() {
                    match c {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\r' => write!(f, "\\r")?,
                        '\t' => write!(f, "\\t")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            Value::Bytes(b) => write!(f, "#bytes \"{}\"", hex::encode(b)),
            Value::Keyword(k) => write!(f, "{k}"),
            Value::Identity(i) => write!(f, "#id \"{}\"", hex::encode(i.as_ref().hash())),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int64(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float64(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Time(t)
    }
}

impl From<Arc<Identity>> for Value {
    fn from(i: Arc<Identity>) -> Self {
        Value::Identity(i)
    }
}

impl From<Arc<Keyword>> for Value {
    fn from(k: Arc<Keyword>) -> Self {
        Value::Keyword(k)
    }
}
