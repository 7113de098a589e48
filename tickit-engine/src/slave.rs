// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Embeds a whole sub-simulation behind a single [`Device`](crate::component::Device).
//!
//! A `SlaveScheduler` reuses the same [`Ticker`]/[`EventRouter`] pair the
//! master uses, but its internal components are plain synchronous
//! [`Device`]s driven by direct calls rather than bus round-trips — the
//! embedding device's own `update` must not suspend, so neither can
//! anything inside it. Two synthetic components stand in for the
//! boundary: `external` (a source whose output is whatever `Changes` the
//! parent tick delivered this instant) and `expose` (a sink that collects
//! whichever internal ports the configuration designates as the slave's
//! visible output).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tickit_core::wiring::InverseWiring;
use tickit_core::{Changes, ComponentId, ComponentPort, Input, Output, PortId, SimTime, TickitError, Wiring};
use tickit_router::EventRouter;

use crate::component::{Device, InterruptHandle};
use crate::ticker::Ticker;
use crate::wakeup::SlaveWakeupQueue;

/// A callback a `SlaveScheduler` uses to re-raise an interrupt to whatever
/// embeds it — a [`ComponentRuntime`](crate::component::ComponentRuntime)
/// if this slave sits directly under the master, or another
/// `SlaveScheduler` if it is nested more than one level deep.
///
/// No shared pointer back to the parent: the slave only ever sees this one
/// typed callback, supplied at construction.
#[async_trait]
pub trait Raiser: Send + Sync {
    async fn raise(&self) -> Result<(), TickitError>;
}

#[async_trait]
impl Raiser for InterruptHandle {
    async fn raise(&self) -> Result<(), TickitError> {
        InterruptHandle::raise(self).await
    }
}

pub struct SlaveScheduler<R: Raiser> {
    router: Arc<EventRouter>,
    ticker: Ticker,
    wakeups: SlaveWakeupQueue,
    interrupts: HashSet<ComponentId>,
    devices: HashMap<ComponentId, Box<dyn Device>>,
    device_inputs: HashMap<ComponentId, Changes>,
    previous_outputs: HashMap<ComponentId, Changes>,
    pending_input: Changes,
    output_changes: Changes,
    raise_interrupt: R,
}

impl<R: Raiser> SlaveScheduler<R> {
    /// Build from an already-inverted wiring (sink -> source). `expose`
    /// names, for each exposed output port, the internal port that
    /// supplies it.
    pub fn new(
        mut internal_wiring: InverseWiring,
        expose: HashMap<PortId, ComponentPort>,
        devices: HashMap<ComponentId, Box<dyn Device>>,
        raise_interrupt: R,
    ) -> Result<Self, TickitError> {
        for (output_port, source) in expose {
            internal_wiring.bind(ComponentPort::new(ComponentId::expose(), output_port), source)?;
        }
        let router = Arc::new(EventRouter::new(&internal_wiring)?);
        Ok(Self {
            ticker: Ticker::new(router.clone()),
            router,
            wakeups: SlaveWakeupQueue::new(),
            interrupts: HashSet::new(),
            devices,
            device_inputs: HashMap::new(),
            previous_outputs: HashMap::new(),
            pending_input: Changes::new(),
            output_changes: Changes::new(),
            raise_interrupt,
        })
    }

    /// As [`SlaveScheduler::new`], but accepts a forward `Wiring` and
    /// inverts it first.
    pub fn from_wiring(
        wiring: Wiring,
        expose: HashMap<PortId, ComponentPort>,
        devices: HashMap<ComponentId, Box<dyn Device>>,
        raise_interrupt: R,
    ) -> Result<Self, TickitError> {
        Self::new(InverseWiring::try_from(wiring)?, expose, devices, raise_interrupt)
    }

    #[must_use]
    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    /// Record a local interrupt and propagate it to whatever embeds this
    /// scheduler, so an adapter buried arbitrarily deep in nested
    /// sub-simulations can still wake the whole hierarchy.
    pub async fn schedule_interrupt(&mut self, source: ComponentId) -> Result<(), TickitError> {
        self.interrupts.insert(source);
        self.raise_interrupt.raise().await
    }

    /// Resolve one parent-visible instant: `changes` is whatever the
    /// parent delivered to this slave this tick. Returns the `Changes`
    /// collected on `expose` and, if any internal wakeups remain, the
    /// nanoseconds until the next one is due.
    pub fn on_tick(&mut self, time: SimTime, changes: Changes) -> Result<(Changes, Option<u64>), TickitError> {
        self.pending_input = changes;
        self.output_changes = Changes::new();

        let mut roots: HashSet<ComponentId> = self.interrupts.drain().collect();
        for (_, component) in self.wakeups.drain_before(time) {
            roots.insert(component);
        }
        roots.insert(ComponentId::external());

        let ready = self.ticker.begin(time, &roots);
        self.drive(ready)?;

        let call_in = self.wakeups.peek_min().map(|when| when.as_nanos().saturating_sub(time.as_nanos()));
        Ok((self.output_changes.clone(), call_in))
    }

    fn drive(&mut self, mut ready: Vec<Input>) -> Result<(), TickitError> {
        while !ready.is_empty() {
            let mut next_round = Vec::new();
            for input in ready {
                let output = self.resolve(input);
                if let Some(at) = output.call_at {
                    self.wakeups.add(output.source.clone(), at);
                }
                next_round.extend(self.ticker.propagate(output)?);
            }
            ready = next_round;
        }
        Ok(())
    }

    /// Answer one routed `Input`, intercepting the two synthetic
    /// components and otherwise driving the real device directly.
    fn resolve(&mut self, input: Input) -> Output {
        if input.target == ComponentId::external() {
            return Output {
                source: ComponentId::external(),
                time: input.time,
                changes: self.pending_input.clone(),
                call_at: None,
            };
        }
        if input.target == ComponentId::expose() {
            tickit_core::changes::merge(&mut self.output_changes, &input.changes);
            return Output {
                source: ComponentId::expose(),
                time: input.time,
                changes: Changes::new(),
                call_at: None,
            };
        }

        let accumulated = self.device_inputs.entry(input.target.clone()).or_default();
        tickit_core::changes::merge(accumulated, &input.changes);
        let device = self
            .devices
            .get_mut(&input.target)
            .expect("router only routes to components with a registered device");
        let update = device.update(input.time, accumulated);

        let previous = self.previous_outputs.entry(input.target.clone()).or_default();
        let delta = tickit_core::changes::delta(previous, &update.outputs);
        *previous = update.outputs;

        Output {
            source: input.target,
            time: input.time,
            changes: delta,
            call_at: update.call_at,
        }
    }
}
