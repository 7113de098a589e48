// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The master scheduler: the top-level driver of simulated time.
//!
//! Owns the global `sim_time` and the wall-clock pacing. Fans in every
//! component's output topic into a single stream, drives the ticker to
//! resolve each instant, and between ticks races a wall-clock sleep for the
//! next scheduled wakeup against whatever arrives on the bus (an
//! `Interrupt` pre-empts the sleep with no simulated-time jump; a
//! `ComponentException` starts global shutdown).
//!
//! Interrupts arriving while a tick is still in flight are not given any
//! special mid-tick treatment — `schedule_interrupt` just overwrites the
//! component's wakeup at the *current* `sim_time`, same as any `call_at`
//! update, so it naturally surfaces as the next root once the in-flight
//! tick finishes. See `DESIGN.md` for why this was chosen over a mid-tick
//! coalescing scheme.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tickit_bus::{Bus, Consumer, Producer, input_topic, output_topic, produce_with_retry};
use tickit_core::{ComponentId, Message, SimTime, StopComponent, TickitError};
use tickit_router::EventRouter;
use tokio::sync::mpsc;

use crate::ticker::Ticker;
use crate::wakeup::MasterWakeupQueue;

const SHUTDOWN_ACK_TIMEOUT: Duration = Duration::from_secs(5);
const SUBSCRIBE_RETRY_ATTEMPTS: u32 = 3;

/// Drives the simulation to completion or until a fatal error occurs.
pub struct MasterScheduler {
    router: Arc<EventRouter>,
    bus: Arc<dyn Bus>,
    /// Simulated nanoseconds elapsed per wall-clock nanosecond.
    simulation_speed: f64,
}

impl MasterScheduler {
    #[must_use]
    pub fn new(router: Arc<EventRouter>, bus: Arc<dyn Bus>, simulation_speed: f64) -> Self {
        Self {
            router,
            bus,
            simulation_speed,
        }
    }

    /// Run the simulation to completion. Returns `Ok(())` if every component
    /// exhausts its wakeups and the bus goes quiet, or the originating
    /// `TickitError` if a component raised a fatal exception.
    pub async fn run(&self) -> Result<(), TickitError> {
        let components = self.router.components().clone();
        let mut bus_rx = self.fan_in_outputs(&components).await?;

        let mut sim_time = SimTime::ZERO;
        let mut wakeups = MasterWakeupQueue::new();
        let mut ticker = Ticker::new(self.router.clone());

        let roots: HashSet<ComponentId> = components.iter().cloned().collect();
        let inputs = ticker.begin(sim_time, &roots);
        self.dispatch(inputs).await?;
        if let Err(err) = self.drain_tick(&mut ticker, &mut bus_rx, &mut wakeups).await {
            self.shutdown(&components, &err).await;
            return Err(err);
        }

        loop {
            match wakeups.first() {
                None => {
                    // Nothing scheduled: wait indefinitely for an
                    // interrupt or an exception.
                    let Some(message) = bus_rx.recv().await else {
                        return Ok(());
                    };
                    if let Err(err) = self.handle_idle_message(message, sim_time, &mut wakeups) {
                        self.shutdown(&components, &err).await;
                        return Err(err);
                    }
                }
                Some(when) => {
                    let delay = sim_time.wall_delay(when, self.simulation_speed);
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {
                            sim_time = when;
                            let roots: HashSet<ComponentId> = wakeups.pop_due(when).into_iter().collect();
                            let inputs = ticker.begin(sim_time, &roots);
                            self.dispatch(inputs).await?;
                            if let Err(err) = self.drain_tick(&mut ticker, &mut bus_rx, &mut wakeups).await {
                                self.shutdown(&components, &err).await;
                                return Err(err);
                            }
                        }
                        message = bus_rx.recv() => {
                            let Some(message) = message else { return Ok(()) };
                            if let Err(err) = self.handle_idle_message(message, sim_time, &mut wakeups) {
                                self.shutdown(&components, &err).await;
                                return Err(err);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Handle one message observed while idle (no tick in flight): an
    /// `Interrupt` schedules an immediate wakeup and, if nothing else is
    /// in flight, is driven right away; a `ComponentException` is fatal.
    /// An `Output` observed while idle would be a protocol violation (no
    /// component should be publishing outside a tick) and is treated as
    /// one.
    fn handle_idle_message(&self, message: Message, sim_time: SimTime, wakeups: &mut MasterWakeupQueue) -> Result<(), TickitError> {
        match message {
            Message::Interrupt(interrupt) => {
                wakeups.add(interrupt.source, sim_time);
                Ok(())
            }
            Message::Exception(exception) => Err(TickitError::device_failure(exception.source.to_string(), exception.error)),
            Message::Output(output) => Err(TickitError::protocol(format!(
                "{} published an Output while no tick was in flight",
                output.source
            ))),
            other => {
                log::warn!("master ignoring unexpected message while idle: {other:?}");
                Ok(())
            }
        }
    }

    /// Drive the ticker to completion, consuming `Output`/`Interrupt`/
    /// `ComponentException` messages from the fan-in receiver until
    /// `to_update` is empty.
    async fn drain_tick(
        &self,
        ticker: &mut Ticker,
        bus_rx: &mut mpsc::Receiver<Message>,
        wakeups: &mut MasterWakeupQueue,
    ) -> Result<(), TickitError> {
        while !ticker.is_finished() {
            let message = bus_rx
                .recv()
                .await
                .ok_or_else(|| TickitError::bus("output fan-in closed mid-tick"))?;
            match message {
                Message::Output(output) => {
                    if let Some(call_at) = output.call_at {
                        wakeups.add(output.source.clone(), call_at);
                    }
                    let source = output.source.clone();
                    let next = ticker.propagate(output).map_err(|err| {
                        log::error!("protocol violation from {source}: {err}");
                        err
                    })?;
                    self.dispatch(next).await?;
                }
                Message::Interrupt(interrupt) => {
                    wakeups.add(interrupt.source, ticker.time());
                }
                Message::Exception(exception) => {
                    return Err(TickitError::device_failure(exception.source.to_string(), exception.error));
                }
                other => {
                    log::warn!("master ignoring unexpected message mid-tick: {other:?}");
                }
            }
        }
        Ok(())
    }

    async fn dispatch(&self, inputs: Vec<tickit_core::Input>) -> Result<(), TickitError> {
        for input in inputs {
            let topic = input_topic(&input.target);
            produce_with_retry(self.bus.as_ref(), &topic, Message::Input(input), SUBSCRIBE_RETRY_ATTEMPTS).await?;
        }
        Ok(())
    }

    /// Broadcast `StopComponent` to every component and wait (bounded) for
    /// the sends to land before returning. Best-effort: a slow or wedged
    /// component does not prevent the master from surfacing `err`.
    async fn shutdown(&self, components: &std::collections::BTreeSet<ComponentId>, err: &TickitError) {
        log::error!("simulation shutting down: {err}");
        let sends = components.iter().map(|c| {
            let topic = input_topic(c);
            async move {
                if let Err(send_err) = self.bus.produce(&topic, Message::Stop(StopComponent)).await {
                    log::warn!("failed to deliver StopComponent to {c}: {send_err}");
                }
            }
        });
        let _ = tokio::time::timeout(SHUTDOWN_ACK_TIMEOUT, futures::future::join_all(sends)).await;
    }

    /// Subscribe to every component's output topic and merge them into a
    /// single ordered stream via an mpsc fan-in. Per-topic ordering is
    /// preserved because each subscription is drained by its own task in
    /// a tight loop; ordering *across* components is not guaranteed
    /// (matching the bus contract, which only orders within one topic).
    async fn fan_in_outputs(&self, components: &std::collections::BTreeSet<ComponentId>) -> Result<mpsc::Receiver<Message>, TickitError> {
        let (tx, rx) = mpsc::channel(1024);
        for component in components {
            let topic = output_topic(component);
            let mut subscription = self.bus.subscribe(&topic).await?;
            let tx = tx.clone();
            let component = component.clone();
            tokio::spawn(async move {
                loop {
                    match subscription.recv().await {
                        Ok(message) => {
                            if tx.send(message).await.is_err() {
                                return;
                            }
                        }
                        Err(err) => {
                            log::error!("fan-in subscription for {component} failed: {err}");
                            return;
                        }
                    }
                }
            });
        }
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tickit_bus::InMemoryBus;
    use tickit_core::{ComponentPort, Input, Output, PortId, Value, Wiring, wiring::InverseWiring};

    use super::*;
    use crate::component::{ComponentRuntime, Device, DeviceUpdate, NoAdapter};

    fn cid(s: &str) -> ComponentId {
        ComponentId::new(s).unwrap()
    }
    fn pid(s: &str) -> PortId {
        PortId::new(s).unwrap()
    }

    struct ConstantSource {
        value: i64,
    }
    impl Device for ConstantSource {
        fn update(&mut self, _time: SimTime, _inputs: &tickit_core::Changes) -> DeviceUpdate {
            let mut out = tickit_core::Changes::new();
            out.insert(pid("value"), Value::Int(self.value));
            DeviceUpdate::new(out)
        }
    }

    struct Recorder {
        seen: Arc<std::sync::Mutex<Option<Value>>>,
    }
    impl Device for Recorder {
        fn update(&mut self, _time: SimTime, inputs: &tickit_core::Changes) -> DeviceUpdate {
            if let Some(v) = inputs.get(&pid("in")) {
                *self.seen.lock().unwrap() = Some(v.clone());
            }
            DeviceUpdate::new(tickit_core::Changes::new())
        }
    }

    #[tokio::test]
    async fn source_to_sink_resolves_on_initial_tick() {
        let mut wiring = Wiring::new();
        wiring.connect(cid("src"), pid("value"), ComponentPort::new(cid("sink"), pid("in")));
        let router = Arc::new(EventRouter::new(&InverseWiring::try_from(wiring).unwrap()).unwrap());

        let bus: Arc<dyn Bus> = Arc::new(InMemoryBus::new());
        let seen = Arc::new(std::sync::Mutex::new(None));

        let src_runtime = ComponentRuntime::new(cid("src"), ConstantSource { value: 42 }, bus.clone());
        let sink_runtime = ComponentRuntime::new(
            cid("sink"),
            Recorder { seen: seen.clone() },
            bus.clone(),
        );
        tokio::spawn(src_runtime.run_single(NoAdapter));
        tokio::spawn(sink_runtime.run_single(NoAdapter));
        // Let both runtimes finish subscribing before the master starts
        // publishing; a real deployment wires topics up before traffic
        // starts flowing.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let master = MasterScheduler::new(router, bus.clone(), 1.0);
        let result = tokio::time::timeout(Duration::from_millis(200), master.run()).await;
        assert!(result.is_err(), "master has no wakeups so it should idle, not exit");

        assert_eq!(*seen.lock().unwrap(), Some(Value::Int(42)));
    }

    #[test]
    fn dependency_completeness_is_exercised_by_drain_tick() {
        // drain_tick relies on Ticker's own invariant (tested exhaustively
        // in ticker.rs); this is a type-level smoke test that the master
        // module wires Input/Output/ComponentId the same way.
        let input = Input {
            target: cid("a"),
            time: SimTime::ZERO,
            changes: tickit_core::Changes::new(),
        };
        let output = Output {
            source: cid("a"),
            time: SimTime::ZERO,
            changes: tickit_core::Changes::new(),
            call_at: None,
        };
        assert_eq!(input.target, output.source);
    }
}
