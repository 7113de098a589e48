// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The component lifecycle contract and its bus-driven runtime.
//!
//! A [`Device`] is plain, synchronous state: it must not suspend, block, or
//! otherwise escape `update`. An [`Adapter`] is the part of a component
//! allowed to touch the outside world (sockets, files, wall-clock timers);
//! it runs in its own task and only ever talks to the device through the
//! bus, same as any other subscriber would.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tickit_core::{Changes, ComponentException, ComponentId, Input, Message, Output, SimTime, StopComponent, TickitError};
use tickit_bus::{Bus, Consumer, Producer, input_topic, output_topic, produce_with_retry};

/// How long a component waits, at startup, for every attached adapter's
/// [`Adapter::wait_until_ready`] to settle before giving up.
const ADAPTER_READY_TIMEOUT: Duration = Duration::from_secs(5);

/// What a device returns from one call to [`Device::update`].
pub struct DeviceUpdate {
    /// The full set of output changes the device currently holds (not yet
    /// delta-compressed against the previous tick; the runtime does that).
    pub outputs: Changes,
    /// Request a wakeup at an absolute `SimTime`. Must be strictly greater
    /// than the time just ticked, except on the initial tick at
    /// `SimTime::ZERO`.
    pub call_at: Option<SimTime>,
}

impl DeviceUpdate {
    #[must_use]
    pub fn new(outputs: Changes) -> Self {
        Self { outputs, call_at: None }
    }

    #[must_use]
    pub fn with_call_at(mut self, at: SimTime) -> Self {
        self.call_at = Some(at);
        self
    }
}

/// The synchronous half of a component: pure state transition, no I/O.
///
/// `update` is called once per tick with the cumulative `Changes` the
/// device has accumulated on its input ports since the last call (see the
/// runtime's `device_inputs` bookkeeping below) and must return promptly.
pub trait Device: Send {
    fn update(&mut self, time: SimTime, inputs: &Changes) -> DeviceUpdate;
}

impl Device for Box<dyn Device> {
    fn update(&mut self, time: SimTime, inputs: &Changes) -> DeviceUpdate {
        (**self).update(time, inputs)
    }
}

/// The asynchronous half of a component: anything that needs to touch the
/// outside world. Optional — a pure device can leave this as the default
/// no-op implementation. A component may attach any number of adapters
/// (spec: "a device and optionally a list of adapters"), each driven by
/// its own `run_forever` task and each notified after every tick.
///
/// Methods take `&self`, not `&mut self`: an adapter's `run_forever` task
/// runs concurrently with `after_update`/`wait_until_ready` calls made
/// from the component's device loop for as long as the component lives,
/// so the two can't take turns owning a single `&mut`. An adapter with
/// its own mutable state reaches for `tokio::sync::Mutex` or an atomic
/// internally, the same way any other `Send + Sync` handle shared across
/// tasks would.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Runs for the lifetime of the component, typically driving an
    /// external I/O source and raising interrupts through `raise`.
    /// Returning `Ok(())` or `Err` both end the adapter task; a returned
    /// error is an [`TickitError::AdapterFailure`] and does not affect the
    /// device.
    async fn run_forever(&self, raise: InterruptHandle) -> Result<(), TickitError> {
        let _ = raise;
        std::future::pending().await
    }

    /// Called after each `device.update`, with the output the tick just
    /// produced. Default is a no-op.
    async fn after_update(&self, _output: &Output) {}

    /// Blocks until the adapter considers itself ready to proceed, bounded
    /// by `timeout`. Default is immediately ready.
    async fn wait_until_ready(&self, _timeout: Duration) -> Result<(), TickitError> {
        Ok(())
    }
}

fn describe_panic(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "device panicked with a non-string payload".to_string()
    }
}

/// A no-op adapter for devices that need none.
pub struct NoAdapter;

#[async_trait]
impl Adapter for NoAdapter {}

/// Handle an [`Adapter`] uses to request an immediate re-tick of its
/// component from within `run_forever`.
#[derive(Clone)]
pub struct InterruptHandle {
    bus: Arc<dyn Bus>,
    source: ComponentId,
}

impl InterruptHandle {
    /// Interrupts cross the bus on the component's *output* topic, same as
    /// the master subscribes to for `Output`/`ComponentException` — there
    /// is exactly one channel the master listens to per component.
    pub async fn raise(&self) -> Result<(), TickitError> {
        let topic = output_topic(&self.source);
        produce_with_retry(
            self.bus.as_ref(),
            &topic,
            Message::Interrupt(tickit_core::Interrupt {
                source: self.source.clone(),
            }),
            3,
        )
        .await
    }
}

/// Drives one component's bus loop for the lifetime of the simulation:
/// subscribes to the component's input topic, accumulates `Changes` across
/// ticks, calls `device.update` once per `Input`, delta-compresses the
/// result against the previous tick's outputs, and publishes an `Output`.
///
/// Runs the adapter concurrently in the same task set; a device failure or
/// protocol violation is converted into a `ComponentException` and
/// published so the scheduler can shut the simulation down.
pub struct ComponentRuntime<D: Device> {
    id: ComponentId,
    device: D,
    bus: Arc<dyn Bus>,
    /// Cumulative changes accumulated on input ports since the device's
    /// last call, per the "inputs persist until overwritten" semantics.
    device_inputs: Changes,
    /// The previous tick's full output set, for delta compression.
    previous_outputs: Changes,
    /// Attached adapters, set once at the start of `run`. Shared (not
    /// owned exclusively) because each also has a `run_forever` task
    /// alive for the component's whole lifetime.
    adapters: Vec<Arc<dyn Adapter>>,
}

impl<D: Device> ComponentRuntime<D> {
    #[must_use]
    pub fn new(id: ComponentId, device: D, bus: Arc<dyn Bus>) -> Self {
        Self {
            id,
            device,
            bus,
            device_inputs: Changes::new(),
            previous_outputs: Changes::new(),
            adapters: Vec::new(),
        }
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            bus: self.bus.clone(),
            source: self.id.clone(),
        }
    }

    /// Convenience for the common single-adapter (or no-adapter) case,
    /// e.g. `runtime.run_single(NoAdapter)`.
    pub async fn run_single(self, adapter: impl Adapter + 'static) -> Result<(), TickitError> {
        self.run(vec![Arc::new(adapter)]).await
    }

    /// Run the component's bus loop until a `StopComponent` arrives or a
    /// fatal error occurs. Every adapter is given its `wait_until_ready`
    /// bound at startup before any are spawned, then each runs its own
    /// `run_forever` task concurrently with the device loop for as long
    /// as the component lives.
    pub async fn run(mut self, adapters: Vec<Arc<dyn Adapter>>) -> Result<(), TickitError> {
        for adapter in &adapters {
            tokio::time::timeout(ADAPTER_READY_TIMEOUT, adapter.wait_until_ready(ADAPTER_READY_TIMEOUT))
                .await
                .map_err(|_| TickitError::timeout(format!("{} adapter did not become ready in time", self.id)))??;
        }
        self.adapters = adapters;

        let input_topic = input_topic(&self.id);
        let output_topic = output_topic(&self.id);
        let mut inputs = self.bus.subscribe(&input_topic).await?;

        let interrupt_handle = self.interrupt_handle();
        let mut adapter_tasks = tokio::task::JoinSet::new();
        for adapter in &self.adapters {
            let adapter = adapter.clone();
            let raise = interrupt_handle.clone();
            adapter_tasks.spawn(async move { adapter.run_forever(raise).await });
        }

        loop {
            tokio::select! {
                message = inputs.recv() => {
                    match message? {
                        Message::Input(input) => {
                            if let Err(err) = self.handle_input(input, &output_topic).await {
                                self.publish_exception(&err).await;
                                return Err(err);
                            }
                        }
                        Message::Stop(StopComponent) => {
                            adapter_tasks.abort_all();
                            return Ok(());
                        }
                        other => {
                            log::warn!("{} received unexpected message on its input topic: {other:?}", self.id);
                        }
                    }
                }
                joined = adapter_tasks.join_next(), if !adapter_tasks.is_empty() => {
                    // An adapter exiting is not fatal to the device; the
                    // others (if any) and the bus loop keep running.
                    if let Some(Ok(Err(err))) = joined {
                        log::warn!("{} adapter stopped: {err}", self.id);
                    }
                }
            }
        }
    }

    async fn handle_input(&mut self, input: Input, output_topic: &str) -> Result<(), TickitError> {
        if input.target != self.id {
            return Err(TickitError::protocol(format!(
                "{} received an Input addressed to {}",
                self.id, input.target
            )));
        }
        tickit_core::changes::merge(&mut self.device_inputs, &input.changes);

        let device = &mut self.device;
        let device_inputs = &self.device_inputs;
        let update = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| device.update(input.time, device_inputs)))
            .map_err(|panic| TickitError::device_failure(self.id.to_string(), describe_panic(&panic)))?;
        let delta = tickit_core::changes::delta(&self.previous_outputs, &update.outputs);
        self.previous_outputs = update.outputs;

        let output = Output {
            source: self.id.clone(),
            time: input.time,
            changes: delta,
            call_at: update.call_at,
        };
        produce_with_retry(self.bus.as_ref(), output_topic, Message::Output(output.clone()), 3).await?;

        for adapter in &self.adapters {
            adapter.after_update(&output).await;
        }
        Ok(())
    }

    async fn publish_exception(&self, err: &TickitError) {
        let exception = ComponentException {
            source: self.id.clone(),
            error: err.to_string(),
            traceback: None,
        };
        let topic = output_topic(&self.id);
        let _ = produce_with_retry(self.bus.as_ref(), &topic, Message::Exception(exception), 3).await;
    }
}
