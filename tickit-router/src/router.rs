// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use log::debug;
use tickit_core::{ComponentId, Output, TickitError, Wiring, wiring::InverseWiring};
use tickit_core::{Changes, Input};

/// Forward/inverse component dependency graphs derived from a `Wiring`, plus
/// the routing function from one component's `Output` to the `Input`s of
/// its dependants.
///
/// Construction fails with [`TickitError::ConfigError`] if the wiring
/// contains a directed cycle; cycle detection is a construction-time
/// responsibility so that the ticker never has to worry about it.
pub struct EventRouter {
    forward: Wiring,
    /// For each component, the components that directly depend on its
    /// outputs (fan-out).
    component_tree: HashMap<ComponentId, HashSet<ComponentId>>,
    /// For each component, the components it directly depends on (fan-in).
    inverse_component_tree: HashMap<ComponentId, HashSet<ComponentId>>,
    components: BTreeSet<ComponentId>,
}

impl EventRouter {
    /// Derive a router from an `InverseWiring`. Fails on a dangling graph
    /// cycle; dangling ports are not themselves an error here (a port with
    /// no downstream binding simply never routes anywhere).
    pub fn new(inverse: &InverseWiring) -> Result<Self, TickitError> {
        let forward: Wiring = inverse.into();
        let components = inverse.components();

        let mut component_tree: HashMap<ComponentId, HashSet<ComponentId>> = HashMap::new();
        let mut inverse_component_tree: HashMap<ComponentId, HashSet<ComponentId>> = HashMap::new();
        for c in &components {
            component_tree.entry(c.clone()).or_default();
            inverse_component_tree.entry(c.clone()).or_default();
        }
        for (sink, source) in &inverse.0 {
            component_tree
                .entry(source.component.clone())
                .or_default()
                .insert(sink.component.clone());
            inverse_component_tree
                .entry(sink.component.clone())
                .or_default()
                .insert(source.component.clone());
        }

        let router = Self {
            forward,
            component_tree,
            inverse_component_tree,
            components,
        };
        router.check_acyclic()?;
        Ok(router)
    }

    /// Kahn's algorithm: repeatedly remove components with no remaining
    /// unresolved upstream dependency. If any component is never removed,
    /// the graph has a cycle.
    fn check_acyclic(&self) -> Result<(), TickitError> {
        let mut indegree: HashMap<ComponentId, usize> = self
            .components
            .iter()
            .map(|c| (c.clone(), self.inverse_component_tree[c].len()))
            .collect();
        let mut queue: VecDeque<ComponentId> = indegree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(c, _)| c.clone())
            .collect();

        let mut visited = 0usize;
        while let Some(c) = queue.pop_front() {
            visited += 1;
            for dependant in &self.component_tree[&c] {
                let degree = indegree.get_mut(dependant).expect("known component");
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(dependant.clone());
                }
            }
        }

        if visited != self.components.len() {
            return Err(TickitError::config(
                "wiring contains a cycle: not every component has a fully-resolved upstream",
            ));
        }
        Ok(())
    }

    /// The union of every component referenced by the wiring.
    #[must_use]
    pub fn components(&self) -> &BTreeSet<ComponentId> {
        &self.components
    }

    /// The components `c` directly depends on (fan-in). Empty if `c` is
    /// unknown to the router.
    #[must_use]
    pub fn inverse_component_tree(&self, c: &ComponentId) -> HashSet<ComponentId> {
        self.inverse_component_tree.get(c).cloned().unwrap_or_default()
    }

    /// The components that directly depend on `c`'s outputs (fan-out).
    /// Empty if `c` is unknown to the router.
    #[must_use]
    pub fn component_tree(&self, c: &ComponentId) -> HashSet<ComponentId> {
        self.component_tree.get(c).cloned().unwrap_or_default()
    }

    /// The transitive closure of `component_tree` starting at `c`,
    /// including `c` itself. Terminates because cycles were rejected at
    /// construction.
    #[must_use]
    pub fn dependants(&self, c: &ComponentId) -> HashSet<ComponentId> {
        let mut seen = HashSet::new();
        let mut stack = vec![c.clone()];
        seen.insert(c.clone());
        while let Some(cur) = stack.pop() {
            if let Some(next) = self.component_tree.get(&cur) {
                for n in next {
                    if seen.insert(n.clone()) {
                        stack.push(n.clone());
                    }
                }
            }
        }
        seen
    }

    /// Route a component's `Output` into the `Input`s of its dependants.
    ///
    /// For each changed output port, one `Input` is produced per downstream
    /// `ComponentPort`, carrying only that port. An `Output` with empty
    /// `changes` yields no inputs. Multiple routed `Input`s that target the
    /// same component are not merged here; the ticker collates them by
    /// `(target, time)` when it builds the component's next update.
    #[must_use]
    pub fn route(&self, output: &Output) -> Vec<Input> {
        let Some(ports) = self.forward.0.get(&output.source) else {
            return Vec::new();
        };

        let mut routed = Vec::new();
        for (port, value) in &output.changes {
            let Some(sinks) = ports.get(port) else {
                continue;
            };
            for sink in sinks {
                debug!("route {}.{port} -> {sink}", output.source);
                let mut changes = Changes::new();
                changes.insert(sink.port.clone(), value.clone());
                routed.push(Input {
                    target: sink.component.clone(),
                    time: output.time,
                    changes,
                });
            }
        }
        routed
    }
}

#[cfg(test)]
mod tests {
    use tickit_core::{ComponentPort, PortId, SimTime, Value};

    use super::*;

    fn cid(s: &str) -> ComponentId {
        ComponentId::new(s).unwrap()
    }
    fn pid(s: &str) -> PortId {
        PortId::new(s).unwrap()
    }

    fn diamond() -> InverseWiring {
        // A -> B, A -> C, B -> D, C -> D
        let mut wiring = Wiring::new();
        wiring.connect(cid("a"), pid("out"), ComponentPort::new(cid("b"), pid("in")));
        wiring.connect(cid("a"), pid("out"), ComponentPort::new(cid("c"), pid("in")));
        wiring.connect(cid("b"), pid("out"), ComponentPort::new(cid("d"), pid("in1")));
        wiring.connect(cid("c"), pid("out"), ComponentPort::new(cid("d"), pid("in2")));
        InverseWiring::try_from(wiring).unwrap()
    }

    #[test]
    fn dependants_includes_self_and_transitive_fanout() {
        let router = EventRouter::new(&diamond()).unwrap();
        let deps = router.dependants(&cid("a"));
        assert_eq!(
            deps,
            [cid("a"), cid("b"), cid("c"), cid("d")].into_iter().collect()
        );
        assert_eq!(router.dependants(&cid("d")), [cid("d")].into_iter().collect());
    }

    #[test]
    fn route_produces_one_input_per_downstream_port() {
        let router = EventRouter::new(&diamond()).unwrap();
        let output = Output {
            source: cid("a"),
            time: SimTime::ZERO,
            changes: [(pid("out"), Value::Int(42))].into_iter().collect(),
            call_at: None,
        };
        let mut inputs = router.route(&output);
        inputs.sort_by(|a, b| a.target.cmp(&b.target));
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].target, cid("b"));
        assert_eq!(inputs[0].changes.get(&pid("in")), Some(&Value::Int(42)));
        assert_eq!(inputs[1].target, cid("c"));
    }

    #[test]
    fn route_with_no_changes_yields_no_inputs() {
        let router = EventRouter::new(&diamond()).unwrap();
        let output = Output {
            source: cid("a"),
            time: SimTime::ZERO,
            changes: Changes::new(),
            call_at: None,
        };
        assert!(router.route(&output).is_empty());
    }

    #[test]
    fn cyclic_wiring_is_rejected() {
        let mut wiring = Wiring::new();
        wiring.connect(cid("a"), pid("out"), ComponentPort::new(cid("b"), pid("in")));
        wiring.connect(cid("b"), pid("out"), ComponentPort::new(cid("a"), pid("in")));
        let inverse = InverseWiring::try_from(wiring).unwrap();

        assert!(matches!(
            EventRouter::new(&inverse),
            Err(TickitError::ConfigError(_))
        ));
    }

    #[test]
    fn self_loop_is_rejected_as_a_cycle() {
        let mut wiring = Wiring::new();
        wiring.connect(cid("a"), pid("out"), ComponentPort::new(cid("a"), pid("in")));
        let inverse = InverseWiring::try_from(wiring).unwrap();
        assert!(EventRouter::new(&inverse).is_err());
    }

    #[test]
    fn components_accessor_is_union_of_sources_and_sinks() {
        let router = EventRouter::new(&diamond()).unwrap();
        assert_eq!(
            router.components().clone(),
            [cid("a"), cid("b"), cid("c"), cid("d")].into_iter().collect()
        );
    }
}
