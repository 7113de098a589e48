// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The static connection graph: [`Wiring`] and its [`InverseWiring`].
//!
//! `Wiring` is the form a configuration naturally produces (for each source
//! component, which downstream ports does each of its output ports feed).
//! `InverseWiring` is the form the event router actually wants (for each
//! sink port, which single upstream port feeds it) and is also the form
//! that a [`SlaveScheduler`](tickit_engine) extends with its synthetic
//! `expose` bindings.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::TickitError;
use crate::ids::{ComponentId, ComponentPort, PortId};

/// `ComponentId -> { PortId -> { downstream ComponentPort } }`.
///
/// The outer key is the *source* component; the inner map takes each of its
/// output ports to the set of downstream input endpoints it feeds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Wiring(pub HashMap<ComponentId, HashMap<PortId, HashSet<ComponentPort>>>);

impl Wiring {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `source.port` feeds `sink`.
    pub fn connect(&mut self, source: ComponentId, port: PortId, sink: ComponentPort) {
        self.0
            .entry(source)
            .or_default()
            .entry(port)
            .or_default()
            .insert(sink);
    }

    /// The union of every component referenced as a source or a sink.
    #[must_use]
    pub fn components(&self) -> BTreeSet<ComponentId> {
        let mut out = BTreeSet::new();
        for (source, ports) in &self.0 {
            out.insert(source.clone());
            for sinks in ports.values() {
                for sink in sinks {
                    out.insert(sink.component.clone());
                }
            }
        }
        out
    }
}

/// `sink ComponentPort -> upstream ComponentPort`.
///
/// An input port has at most one upstream source, so the sink side is a
/// plain key (no set needed).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InverseWiring(pub HashMap<ComponentPort, ComponentPort>);

impl InverseWiring {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `sink` to be fed by `source`. Fails if `sink` is already bound
    /// (an input port may have at most one upstream source).
    pub fn bind(&mut self, sink: ComponentPort, source: ComponentPort) -> Result<(), TickitError> {
        if let Some(existing) = self.0.get(&sink) {
            return Err(TickitError::config(format!(
                "{sink} already bound to {existing}, cannot also bind to {source}"
            )));
        }
        self.0.insert(sink, source);
        Ok(())
    }

    #[must_use]
    pub fn components(&self) -> BTreeSet<ComponentId> {
        let mut out = BTreeSet::new();
        for (sink, source) in &self.0 {
            out.insert(sink.component.clone());
            out.insert(source.component.clone());
        }
        out
    }
}

impl TryFrom<Wiring> for InverseWiring {
    type Error = TickitError;

    fn try_from(wiring: Wiring) -> Result<Self, Self::Error> {
        let mut inverse = InverseWiring::new();
        for (source, ports) in wiring.0 {
            for (port, sinks) in ports {
                let upstream = ComponentPort::new(source.clone(), port);
                for sink in sinks {
                    inverse.bind(sink, upstream.clone())?;
                }
            }
        }
        Ok(inverse)
    }
}

impl From<&InverseWiring> for Wiring {
    fn from(inverse: &InverseWiring) -> Self {
        let mut wiring = Wiring::new();
        for (sink, source) in &inverse.0 {
            wiring.connect(source.component.clone(), source.port.clone(), sink.clone());
        }
        wiring
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(s: &str) -> ComponentId {
        ComponentId::new(s).unwrap()
    }
    fn pid(s: &str) -> PortId {
        PortId::new(s).unwrap()
    }

    #[test]
    fn wiring_inverts_cleanly() {
        let mut wiring = Wiring::new();
        wiring.connect(cid("src"), pid("value"), ComponentPort::new(cid("sink"), pid("in")));

        let inverse = InverseWiring::try_from(wiring.clone()).unwrap();
        assert_eq!(
            inverse.0.get(&ComponentPort::new(cid("sink"), pid("in"))),
            Some(&ComponentPort::new(cid("src"), pid("value")))
        );

        let back: Wiring = (&inverse).into();
        assert_eq!(back, wiring);
    }

    #[test]
    fn duplicate_sink_binding_is_rejected() {
        let mut wiring = Wiring::new();
        wiring.connect(cid("a"), pid("out"), ComponentPort::new(cid("sink"), pid("in")));
        wiring.connect(cid("b"), pid("out"), ComponentPort::new(cid("sink"), pid("in")));

        assert!(InverseWiring::try_from(wiring).is_err());
    }

    #[test]
    fn components_is_union_of_sources_and_sinks() {
        let mut wiring = Wiring::new();
        wiring.connect(cid("a"), pid("out"), ComponentPort::new(cid("b"), pid("in")));
        wiring.connect(cid("b"), pid("out"), ComponentPort::new(cid("c"), pid("in")));

        let components = wiring.components();
        assert_eq!(
            components,
            [cid("a"), cid("b"), cid("c")].into_iter().collect()
        );
    }
}
