// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! `Changes`: the immutable `PortId -> Value` mapping carried by `Input` and
//! `Output` messages.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::PortId;

/// A value placed on a port.
///
/// Restricted to variants that are both comparable and hashable, matching
/// the data model's requirement that a `Value` support delta compression
/// (equality) and act as a map key where needed. Notably no floating point
/// variant: `f64` is neither `Eq` nor `Hash`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// An immutable `PortId -> Value` mapping. The empty `Changes` denotes "no
/// change".
pub type Changes = BTreeMap<PortId, Value>;

/// Merge `new` into `base`, new values overwriting old ones at the port
/// level (shallow merge, as used to accumulate `device_inputs` across
/// ticks).
pub fn merge(base: &mut Changes, new: &Changes) {
    for (port, value) in new {
        base.insert(port.clone(), value.clone());
    }
}

/// The subset of `candidate` whose entries differ from `baseline` (absent,
/// or present with a different value). Used for output delta compression.
#[must_use]
pub fn delta(baseline: &Changes, candidate: &Changes) -> Changes {
    candidate
        .iter()
        .filter(|(port, value)| baseline.get(*port) != Some(*value))
        .map(|(port, value)| (port.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str) -> PortId {
        PortId::new(name).unwrap()
    }

    #[test]
    fn merge_overwrites_at_port_level() {
        let mut base: Changes = [(port("a"), Value::Int(1)), (port("b"), Value::Int(2))]
            .into_iter()
            .collect();
        let new: Changes = [(port("b"), Value::Int(3))].into_iter().collect();
        merge(&mut base, &new);
        assert_eq!(base.get(&port("a")), Some(&Value::Int(1)));
        assert_eq!(base.get(&port("b")), Some(&Value::Int(3)));
    }

    #[test]
    fn delta_drops_unchanged_ports() {
        let baseline: Changes = [(port("p"), Value::Int(42))].into_iter().collect();
        let same: Changes = [(port("p"), Value::Int(42))].into_iter().collect();
        assert!(delta(&baseline, &same).is_empty());

        let changed: Changes = [(port("p"), Value::Int(43))].into_iter().collect();
        assert_eq!(delta(&baseline, &changed).get(&port("p")), Some(&Value::Int(43)));
    }
}
