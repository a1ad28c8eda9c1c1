//! Keep-policies and stage buffers.
//!
//! A keep-policy decides which accumulated values a stage retains and how
//! the retained values are presented downstream. A count of zero resolves
//! to a scalar (the single retained value), anything else to a list.
//!
//! `First(0)` and `Last(0)` are deliberately asymmetric: the former keeps
//! the earliest value forever, the latter keeps replacing it with the newest.

use crate::pipeline::packet::Value;
use std::collections::BTreeMap;

/// Buffer-update rule for keep, hold and group stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keep {
    /// Retain the first `n` values, ignore the rest. `First(0)` retains one.
    First(usize),
    /// Retain the newest `n` values. `Last(0)` retains one, replaced in place.
    Last(usize),
    /// Retain everything.
    All,
}

impl Default for Keep {
    fn default() -> Self {
        Keep::Last(0)
    }
}

impl Keep {
    /// Merge `value` into `buffer` according to this policy.
    pub fn merge(self, buffer: &mut Vec<Value>, value: Value) {
        match self {
            Keep::Last(0) => {
                if buffer.is_empty() {
                    buffer.push(value);
                } else {
                    buffer[0] = value;
                }
            }
            Keep::Last(n) => {
                buffer.push(value);
                while buffer.len() > n {
                    buffer.remove(0);
                }
            }
            Keep::First(n) => {
                if buffer.is_empty() || buffer.len() < n {
                    buffer.push(value);
                }
            }
            Keep::All => buffer.push(value),
        }
    }

    /// Whether the resolved view is a single value rather than a list.
    pub fn is_scalar(self) -> bool {
        matches!(self, Keep::First(0) | Keep::Last(0))
    }

    /// Outgoing view of `buffer`: the first value for scalar policies
    /// (`Null` when empty), otherwise the whole sequence.
    pub fn resolve(self, buffer: &[Value]) -> Value {
        if self.is_scalar() {
            buffer.first().cloned().unwrap_or_default()
        } else {
            Value::List(buffer.to_vec())
        }
    }
}

/// Accumulated state of a buffering stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Buffer {
    /// Used by keep and hold stages.
    Flat(Vec<Value>),
    /// Used by group stages: one sub-buffer per key.
    Keyed(BTreeMap<String, Vec<Value>>),
}

impl Default for Buffer {
    fn default() -> Self {
        Buffer::Flat(Vec::new())
    }
}

impl Buffer {
    pub fn keyed() -> Self {
        Buffer::Keyed(BTreeMap::new())
    }

    /// Total number of buffered values across all keys.
    pub fn len(&self) -> usize {
        match self {
            Buffer::Flat(values) => values.len(),
            Buffer::Keyed(groups) => groups.values().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_flat(&self) -> Option<&[Value]> {
        match self {
            Buffer::Flat(values) => Some(values),
            Buffer::Keyed(_) => None,
        }
    }

    pub fn as_keyed(&self) -> Option<&BTreeMap<String, Vec<Value>>> {
        match self {
            Buffer::Keyed(groups) => Some(groups),
            Buffer::Flat(_) => None,
        }
    }

    /// Merge into the flat buffer, converting a keyed buffer if needed.
    pub fn merge(&mut self, keep: Keep, value: Value) {
        if let Buffer::Keyed(_) = self {
            *self = Buffer::Flat(Vec::new());
        }
        if let Buffer::Flat(values) = self {
            keep.merge(values, value);
        }
    }

    /// Merge into the sub-buffer for `key`, converting a flat buffer if needed.
    pub fn merge_keyed(&mut self, keep: Keep, key: String, value: Value) {
        if let Buffer::Flat(_) = self {
            *self = Buffer::keyed();
        }
        if let Buffer::Keyed(groups) = self {
            keep.merge(groups.entry(key).or_default(), value);
        }
    }

    /// Resolve the whole buffer: a flat buffer resolves directly, a keyed
    /// buffer resolves every key independently into a map.
    pub fn resolve(&self, keep: Keep) -> Value {
        match self {
            Buffer::Flat(values) => keep.resolve(values),
            Buffer::Keyed(groups) => Value::Map(
                groups
                    .iter()
                    .map(|(k, values)| (k.clone(), keep.resolve(values)))
                    .collect(),
            ),
        }
    }

    /// Drop all buffered values, keeping the buffer's shape.
    pub fn reset(&mut self) {
        match self {
            Buffer::Flat(values) => values.clear(),
            Buffer::Keyed(groups) => groups.clear(),
        }
    }
}
