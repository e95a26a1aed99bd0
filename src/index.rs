//! # Index Permutations & Key Codec
//!
//! Datoms are stored under four covering indexes, each a permutation of the
//! `(E, A, V)` components with the transaction id fixed as the final key
//! segment. Keys are self-describing byte strings: every component carries a
//! tag byte (the value's variant rank) followed by an order-preserving
//! payload, so a range scan decodes complete datoms from keys alone, without
//! touching stored values.
//!
//! ## Ordering discipline
//!
//! Byte order of encoded keys agrees with [`Value`]'s total order:
//! - integers and timestamps are big-endian with the sign bit flipped,
//! - floats use the IEEE total-order transform,
//! - strings, bytes, and keywords are NUL-escaped (`0x00` becomes
//!   `0x00 0xFF`) and terminated by `0x00 0x01`, so prefixes sort first,
//! - identities are their fixed 20-byte digest.
//!
//! A prefix of bound components therefore delimits one contiguous key range,
//! which is what the pattern matcher scans.

use crate::datom::{Datom, Position};
use crate::error::{QueryError, Result};
use crate::value::{Identity, Keyword, Value, HASH_LEN};
use std::fmt;

/// The four index permutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Index {
    /// Entity, attribute, value: entity-centric lookup
    Eavt,
    /// Attribute, entity, value: attribute scans grouped by entity
    Aevt,
    /// Attribute, value, entity: attribute-value lookup
    Avet,
    /// Value, attribute, entity: reverse (value-first) lookup
    Vaet,
}

impl Index {
    pub const ALL: [Index; 4] = [Index::Eavt, Index::Aevt, Index::Avet, Index::Vaet];

    /// Key component order for this index; `T` is always the implicit fourth.
    pub fn positions(&self) -> [Position; 3] {
        match self {
            Index::Eavt => [Position::E, Position::A, Position::V],
            Index::Aevt => [Position::A, Position::E, Position::V],
            Index::Avet => [Position::A, Position::V, Position::E],
            Index::Vaet => [Position::V, Position::A, Position::E],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Index::Eavt => "eavt",
            Index::Aevt => "aevt",
            Index::Avet => "avet",
            Index::Vaet => "vaet",
        }
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

const ESCAPE: u8 = 0x00;
const ESCAPED_NUL: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;

fn write_escaped(bytes: &[u8], out: &mut Vec<u8>) {
    for &b in bytes {
        out.push(b);
        if b == ESCAPE {
            out.push(ESCAPED_NUL);
        }
    }
    out.push(ESCAPE);
    out.push(TERMINATOR);
}

fn read_escaped(bytes: &[u8]) -> Result<(Vec<u8>, usize)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == ESCAPE {
            match bytes.get(i + 1) {
                Some(&TERMINATOR) => return Ok((out, i + 2)),
                Some(&ESCAPED_NUL) => {
                    out.push(ESCAPE);
                    i += 2;
                }
                _ => return Err(malformed("bad escape sequence")),
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Err(malformed("unterminated byte segment"))
}

fn malformed(detail: &str) -> QueryError {
    QueryError::Internal(format!("malformed index key: {detail}"))
}

/// Sign-flip transform: big-endian order of the result matches `i64` order.
fn order_i64(v: i64) -> [u8; 8] {
    ((v as u64) ^ (1 << 63)).to_be_bytes()
}

fn unorder_i64(bytes: [u8; 8]) -> i64 {
    (u64::from_be_bytes(bytes) ^ (1 << 63)) as i64
}

/// IEEE total-order transform for `f64` bit patterns.
fn order_f64(v: f64) -> [u8; 8] {
    let bits = v.to_bits();
    let ordered = if bits & (1 << 63) != 0 {
        !bits
    } else {
        bits | (1 << 63)
    };
    ordered.to_be_bytes()
}

fn unorder_f64(bytes: [u8; 8]) -> f64 {
    let ordered = u64::from_be_bytes(bytes);
    let bits = if ordered & (1 << 63) != 0 {
        ordered ^ (1 << 63)
    } else {
        !ordered
    };
    f64::from_bits(bits)
}

/// Append one value component (tag byte + order-preserving payload).
pub fn encode_value(value: &Value, out: &mut Vec<u8>) -> Result<()> {
    out.push(value.variant_rank());
    match value {
        Value::Bool(b) => out.push(u8::from(*b)),
        Value::Int64(i) => out.extend_from_slice(&order_i64(*i)),
        Value::Float64(f) => out.extend_from_slice(&order_f64(*f)),
        Value::Time(t) => {
            let nanos = t.timestamp_nanos_opt().ok_or_else(|| {
                QueryError::Internal(format!("time value out of encodable range: {t}"))
            })?;
            out.extend_from_slice(&order_i64(nanos));
        }
        Value::String(s) => write_escaped(s.as_bytes(), out),
        Value::Bytes(b) => write_escaped(b, out),
        Value::Keyword(k) => write_escaped(k.canonical().as_bytes(), out),
        Value::Identity(i) => out.extend_from_slice(i.hash()),
    }
    Ok(())
}

/// Decode one value component, returning the value and bytes consumed.
pub fn decode_value(bytes: &[u8]) -> Result<(Value, usize)> {
    let tag = *bytes.first().ok_or_else(|| malformed("empty component"))?;
    let rest = &bytes[1..];
    let take = |n: usize| -> Result<&[u8]> {
        rest.get(..n).ok_or_else(|| malformed("truncated component"))
    };
    match tag {
        0 => {
            let b = take(1)?[0];
            Ok((Value::Bool(b != 0), 2))
        }
        1 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(take(8)?);
            Ok((Value::Int64(unorder_i64(buf)), 9))
        }
        2 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(take(8)?);
            Ok((Value::Float64(unorder_f64(buf)), 9))
        }
        3 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(take(8)?);
            let t = chrono::DateTime::from_timestamp_nanos(unorder_i64(buf));
            Ok((Value::Time(t), 9))
        }
        4 => {
            let (raw, used) = read_escaped(rest)?;
            let s = String::from_utf8(raw).map_err(|_| malformed("non-utf8 string"))?;
            Ok((Value::String(s), 1 + used))
        }
        5 => {
            let (raw, used) = read_escaped(rest)?;
            Ok((Value::Bytes(raw), 1 + used))
        }
        6 => {
            let (raw, used) = read_escaped(rest)?;
            let s = String::from_utf8(raw).map_err(|_| malformed("non-utf8 keyword"))?;
            let kw = Keyword::parse(&s).ok_or_else(|| malformed("invalid keyword form"))?;
            Ok((Value::Keyword(kw), 1 + used))
        }
        7 => {
            let mut hash = [0u8; HASH_LEN];
            hash.copy_from_slice(take(HASH_LEN)?);
            Ok((Value::Identity(Identity::from_hash(hash)), 1 + HASH_LEN))
        }
        other => Err(malformed(&format!("unknown component tag {other}"))),
    }
}

/// Encode a datom into its key for the given index.
pub fn encode_key(index: Index, datom: &Datom) -> Result<Vec<u8>> {
    let mut key = Vec::with_capacity(64);
    for position in index.positions() {
        encode_value(&datom.component(position), &mut key)?;
    }
    key.extend_from_slice(&datom.tx.to_be_bytes());
    Ok(key)
}

/// Decode a key back into the datom it encodes.
pub fn decode_key(index: Index, key: &[u8]) -> Result<Datom> {
    let mut e = None;
    let mut a = None;
    let mut v = None;
    let mut offset = 0;

    for position in index.positions() {
        let (value, used) = decode_value(&key[offset..])?;
        offset += used;
        match position {
            Position::E => match value {
                Value::Identity(id) => e = Some(id),
                other => {
                    return Err(malformed(&format!(
                        "E component is {}, expected identity",
                        other.type_tag()
                    )))
                }
            },
            Position::A => match value {
                Value::Keyword(kw) => a = Some(kw),
                other => {
                    return Err(malformed(&format!(
                        "A component is {}, expected keyword",
                        other.type_tag()
                    )))
                }
            },
            Position::V => v = Some(value),
            Position::T => unreachable!("T is never a permuted component"),
        }
    }

    let tx_bytes = key
        .get(offset..offset + 8)
        .ok_or_else(|| malformed("missing tx segment"))?;
    if key.len() != offset + 8 {
        return Err(malformed("trailing bytes after tx segment"));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(tx_bytes);

    Ok(Datom {
        e: e.ok_or_else(|| malformed("missing E component"))?,
        a: a.ok_or_else(|| malformed("missing A component"))?,
        v: v.ok_or_else(|| malformed("missing V component"))?,
        tx: u64::from_be_bytes(buf),
    })
}

/// Encode the bound prefix of an index key (at most three components).
pub fn encode_prefix(index: Index, bound: &[Value]) -> Result<Vec<u8>> {
    debug_assert!(bound.len() <= index.positions().len());
    let mut prefix = Vec::with_capacity(48);
    for value in bound {
        encode_value(value, &mut prefix)?;
    }
    Ok(prefix)
}

/// Encode the `[start, end)` key range covering all keys with the bound
/// prefix. An empty `end` means "to the end of the index".
pub fn encode_prefix_range(index: Index, bound: &[Value]) -> Result<(Vec<u8>, Vec<u8>)> {
    let start = encode_prefix(index, bound)?;
    let end = successor(&start);
    Ok((start, end))
}

/// The smallest byte string greater than every string with this prefix.
/// Empty result means unbounded.
pub fn successor(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(&last) = end.last() {
        if last == 0xFF {
            end.pop();
        } else {
            *end.last_mut().expect("nonempty") = last + 1;
            return end;
        }
    }
    Vec::new()
}
