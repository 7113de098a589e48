// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Resolves one simulated instant by driving components in dependency
//! order.
//!
//! The ticker is eager: as soon as a component's upstream is resolved it is
//! scheduled, which maximises in-tick parallelism without needing an
//! up-front topological sort. Collating inputs only by exact time match
//! guarantees that a stale output from a previous tick cannot contaminate
//! the current one.
//!
//! Deliberately synchronous and side-effect free beyond its own state: the
//! scheduler drives it by calling [`Ticker::begin`] then feeding back every
//! [`Output`] it observes through [`Ticker::propagate`], publishing
//! whichever `Input`s each call returns.

use std::collections::HashSet;
use std::sync::Arc;

use tickit_core::{ComponentId, Input, Output, TickitError};
use tickit_router::EventRouter;

pub struct Ticker {
    router: Arc<EventRouter>,
    time: tickit_core::SimTime,
    /// Components still awaiting an `Output` this tick.
    to_update: HashSet<ComponentId>,
    /// Subset of `to_update` already sent an `Input` this tick.
    dispatched: HashSet<ComponentId>,
    /// Routed `Input`s pending collation, accumulated across the tick.
    inputs: Vec<Input>,
    finished: bool,
    /// Whether `begin` has ever been called. The very first tick is
    /// allowed to see `call_at == time`; every later one must not.
    first_tick_taken: bool,
    /// Set for the duration of the tick `begin` just started, if that was
    /// the first tick this `Ticker` has ever run.
    is_initial_tick: bool,
}

impl Ticker {
    #[must_use]
    pub fn new(router: Arc<EventRouter>) -> Self {
        Self {
            router,
            time: tickit_core::SimTime::ZERO,
            to_update: HashSet::new(),
            dispatched: HashSet::new(),
            inputs: Vec::new(),
            finished: true,
            first_tick_taken: false,
            is_initial_tick: false,
        }
    }

    #[must_use]
    pub fn time(&self) -> tickit_core::SimTime {
        self.time
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Reset per-tick state and return the `Input`s for every component
    /// whose dependencies are already resolved (usually just the roots
    /// themselves, since roots are assumed to have no unresolved upstream
    /// within this tick unless one root depends on another).
    pub fn begin(&mut self, time: tickit_core::SimTime, roots: &HashSet<ComponentId>) -> Vec<Input> {
        self.time = time;
        self.inputs.clear();
        self.dispatched.clear();
        self.is_initial_tick = !self.first_tick_taken;
        self.first_tick_taken = true;
        self.to_update = roots.iter().flat_map(|r| self.router.dependants(r)).collect();
        self.finished = self.to_update.is_empty();
        if self.finished {
            return Vec::new();
        }
        self.ready_inputs()
    }

    /// Record an `Output` from a component driven this tick, route it to
    /// its dependants, and return the `Input`s for whichever components
    /// just became ready as a result.
    pub fn propagate(&mut self, output: Output) -> Result<Vec<Input>, TickitError> {
        if !self.to_update.contains(&output.source) {
            return Err(TickitError::protocol(format!(
                "{} published an Output but was not awaited this tick",
                output.source
            )));
        }
        if output.time != self.time {
            return Err(TickitError::protocol(format!(
                "{} published an Output at {} but the tick is at {}",
                output.source, output.time, self.time
            )));
        }
        if let Some(call_at) = output.call_at {
            let permitted = if self.is_initial_tick { call_at >= self.time } else { call_at > self.time };
            if !permitted {
                return Err(TickitError::protocol(format!(
                    "{} requested call_at {} which does not follow tick time {}",
                    output.source, call_at, self.time
                )));
            }
        }

        self.to_update.remove(&output.source);
        self.dispatched.remove(&output.source);
        self.inputs.extend(self.router.route(&output));

        if self.to_update.is_empty() {
            self.finished = true;
            return Ok(Vec::new());
        }
        Ok(self.ready_inputs())
    }

    /// Dispatch every component in `to_update` whose fan-in does not
    /// intersect `to_update` (i.e. has no unresolved upstream) and has not
    /// already been dispatched this tick.
    fn ready_inputs(&mut self) -> Vec<Input> {
        let mut ready: Vec<ComponentId> = self
            .to_update
            .iter()
            .filter(|c| !self.dispatched.contains(*c))
            .filter(|c| self.router.inverse_component_tree(c).is_disjoint(&self.to_update))
            .cloned()
            .collect();
        ready.sort();

        let mut out = Vec::with_capacity(ready.len());
        for component in ready.drain(..) {
            self.dispatched.insert(component.clone());
            let changes = self.collate(&component);
            out.push(Input {
                target: component,
                time: self.time,
                changes,
            });
        }
        out
    }

    /// Collate every pending routed `Input` whose `target` and `time`
    /// match into a single merged `Changes` map.
    fn collate(&self, target: &ComponentId) -> tickit_core::Changes {
        let mut changes = tickit_core::Changes::new();
        for input in &self.inputs {
            if &input.target == target && input.time == self.time {
                tickit_core::changes::merge(&mut changes, &input.changes);
            }
        }
        changes
    }
}
