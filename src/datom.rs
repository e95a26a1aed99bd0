//! Datoms
//!
//! A [`Datom`] is the atomic immutable fact of the store: an entity identity,
//! a keyword attribute, a typed value, and the transaction that asserted it.
//! Transaction ids are allocated monotonically by the database and never
//! reused.

use crate::value::{Identity, Keyword, Value};
use std::fmt;
use std::sync::Arc;

/// The atomic fact `(E, A, V, Tx)`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Datom {
    /// Entity identity
    pub e: Arc<Identity>,
    /// Attribute keyword
    pub a: Arc<Keyword>,
    /// Value
    pub v: Value,
    /// Asserting transaction id (strictly monotonic)
    pub tx: u64,
}

impl Datom {
    pub fn new(e: Arc<Identity>, a: Arc<Keyword>, v: Value, tx: u64) -> Self {
        Datom { e, a, v, tx }
    }

    /// The component at a datom position, as a [`Value`].
    pub fn component(&self, position: Position) -> Value {
        match position {
            Position::E => Value::Identity(Arc::clone(&self.e)),
            Position::A => Value::Keyword(Arc::clone(&self.a)),
            Position::V => self.v.clone(),
            Position::T => Value::Int64(self.tx as i64),
        }
    }
}

impl fmt::Debug for Datom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {} {} {}]", self.e, self.a, self.v, self.tx)
    }
}

/// A position within a datom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Position {
    E,
    A,
    V,
    T,
}

impl Position {
    /// Positions in pattern order.
    pub const ALL: [Position; 4] = [Position::E, Position::A, Position::V, Position::T];

    pub fn label(&self) -> &'static str {
        match self {
            Position::E => "e",
            Position::A => "a",
            Position::V => "v",
            Position::T => "t",
        }
    }
}
