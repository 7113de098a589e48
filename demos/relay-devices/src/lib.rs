// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

#![doc(test(attr(warn(unused))))]

//! A handful of small worked-example [`Device`] implementations, wired up
//! through a [`DeviceRegistry`] so a config file can reference them by
//! name without the CLI needing to know any concrete device types at
//! compile time beyond this crate.
//!
//! None of these devices need an [`Adapter`](tickit_engine::Adapter): they
//! are driven entirely by the bus, which is the common case this crate
//! demonstrates.

use serde::Deserialize;
use tickit_core::{Changes, PortId, SimTime, TickitError, Value};
use tickit_engine::{Device, DeviceRegistry, DeviceUpdate};

fn parse_params<T: for<'de> Deserialize<'de>>(params: &serde_json::Value) -> Result<T, TickitError> {
    serde_json::from_value(params.clone()).map_err(|err| TickitError::config(format!("bad device params: {err}")))
}

fn default_in() -> PortId {
    PortId::new("in").expect("'in' is a valid port id")
}

fn default_out() -> PortId {
    PortId::new("out").expect("'out' is a valid port id")
}

/// Emits a fixed `value` on `port` once, the first time it is ticked (the
/// initial tick, since it has no input ports to be woken by). A stand-in
/// for a sensor whose reading never changes.
#[derive(Deserialize)]
struct SourceParams {
    #[serde(default = "default_out")]
    port: PortId,
    value: Value,
}

struct Source {
    port: PortId,
    value: Value,
}

impl Device for Source {
    fn update(&mut self, _time: SimTime, _inputs: &Changes) -> DeviceUpdate {
        let mut outputs = Changes::new();
        outputs.insert(self.port.clone(), self.value.clone());
        DeviceUpdate::new(outputs)
    }
}

/// Logs whatever arrives on `port` and produces no output of its own. A
/// stand-in for a display, logger, or other terminal component.
#[derive(Deserialize)]
struct SinkParams {
    #[serde(default = "default_in")]
    port: PortId,
}

struct Sink {
    port: PortId,
}

impl Device for Sink {
    fn update(&mut self, time: SimTime, inputs: &Changes) -> DeviceUpdate {
        if let Some(value) = inputs.get(&self.port) {
            log::info!("sink observed {value} on {} at {time}", self.port);
        }
        DeviceUpdate::new(Changes::new())
    }
}

/// Forwards whatever arrives on `input_port` to `output_port` unchanged. A
/// stand-in for a wire or a level-shifting buffer.
#[derive(Deserialize)]
struct RelayParams {
    #[serde(default = "default_in")]
    input_port: PortId,
    #[serde(default = "default_out")]
    output_port: PortId,
}

struct Relay {
    input_port: PortId,
    output_port: PortId,
}

impl Device for Relay {
    fn update(&mut self, _time: SimTime, inputs: &Changes) -> DeviceUpdate {
        let mut outputs = Changes::new();
        if let Some(value) = inputs.get(&self.input_port) {
            outputs.insert(self.output_port.clone(), value.clone());
        }
        DeviceUpdate::new(outputs)
    }
}

/// Emits an incrementing counter on `port` every `interval_ns`, starting at
/// the initial tick. A stand-in for a periodic timer or heartbeat.
#[derive(Deserialize)]
struct ClockParams {
    interval_ns: u64,
    #[serde(default = "default_out")]
    port: PortId,
}

struct Clock {
    interval_ns: u64,
    port: PortId,
    ticks: i64,
}

impl Device for Clock {
    fn update(&mut self, time: SimTime, _inputs: &Changes) -> DeviceUpdate {
        let mut outputs = Changes::new();
        outputs.insert(self.port.clone(), Value::Int(self.ticks));
        self.ticks += 1;
        DeviceUpdate::new(outputs).with_call_at(time + self.interval_ns)
    }
}

/// Register every device in this crate under its `relay_devices::*` name.
pub fn register(registry: &mut DeviceRegistry) {
    registry.register("relay_devices::Source", |params: &serde_json::Value| {
        let params: SourceParams = parse_params(params)?;
        Ok(Box::new(Source {
            port: params.port,
            value: params.value,
        }) as Box<dyn Device>)
    });
    registry.register("relay_devices::Sink", |params: &serde_json::Value| {
        let params: SinkParams = parse_params(params)?;
        Ok(Box::new(Sink { port: params.port }) as Box<dyn Device>)
    });
    registry.register("relay_devices::Relay", |params: &serde_json::Value| {
        let params: RelayParams = parse_params(params)?;
        Ok(Box::new(Relay {
            input_port: params.input_port,
            output_port: params.output_port,
        }) as Box<dyn Device>)
    });
    registry.register("relay_devices::Clock", |params: &serde_json::Value| {
        let params: ClockParams = parse_params(params)?;
        Ok(Box::new(Clock {
            interval_ns: params.interval_ns,
            port: params.port,
            ticks: 0,
        }) as Box<dyn Device>)
    });
}
