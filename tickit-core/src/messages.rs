// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The bus message types.
//!
//! [`Message`] is the tagged sum that actually crosses the bus; pattern
//! matching on it at the consumer is meant to be exhaustive, there is no
//! reflection or downcasting anywhere in this crate.

use serde::{Deserialize, Serialize};

use crate::changes::Changes;
use crate::ids::ComponentId;
use crate::time::SimTime;

/// Sent by the scheduler to a component's input topic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub target: ComponentId,
    pub time: SimTime,
    pub changes: Changes,
}

/// Published by a component on its output topic after `device.update`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub source: ComponentId,
    pub time: SimTime,
    pub changes: Changes,

    /// Requests a wakeup of `source` at absolute time `call_at`. Must be
    /// strictly greater than `time`, except on the initial tick at
    /// `SimTime::ZERO` where `call_at == time` is also permitted.
    pub call_at: Option<SimTime>,
}

/// Published by an adapter to request an immediate re-tick of `source`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interrupt {
    pub source: ComponentId,
}

/// Fatal to the simulation. Published by a component runtime when
/// `device.update` raises, or synthesised by the scheduler when it detects
/// a protocol violation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentException {
    pub source: ComponentId,
    pub error: String,
    pub traceback: Option<String>,
}

/// Causes a component's runtime to exit cleanly. Carries no fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopComponent;

/// The tagged union of everything that can cross the bus.
///
/// Serialises with an explicit `kind` discriminator (`input` / `output` /
/// `interrupt` / `exception` / `stop`) so that the reference JSON encoding
/// matches the bus topic naming convention bit-exactly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Message {
    Input(Input),
    Output(Output),
    Interrupt(Interrupt),
    Exception(ComponentException),
    Stop(StopComponent),
}

impl Message {
    #[must_use]
    pub fn source(&self) -> Option<&ComponentId> {
        match self {
            Message::Input(i) => Some(&i.target),
            Message::Output(o) => Some(&o.source),
            Message::Interrupt(i) => Some(&i.source),
            Message::Exception(e) => Some(&e.source),
            Message::Stop(_) => None,
        }
    }
}

impl From<Input> for Message {
    fn from(m: Input) -> Self {
        Message::Input(m)
    }
}

impl From<Output> for Message {
    fn from(m: Output) -> Self {
        Message::Output(m)
    }
}

impl From<Interrupt> for Message {
    fn from(m: Interrupt) -> Self {
        Message::Interrupt(m)
    }
}

impl From<ComponentException> for Message {
    fn from(m: ComponentException) -> Self {
        Message::Exception(m)
    }
}

impl From<StopComponent> for Message {
    fn from(m: StopComponent) -> Self {
        Message::Stop(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trips_with_kind_discriminator() {
        let input = Message::Input(Input {
            target: ComponentId::new("sink").unwrap(),
            time: SimTime::ZERO,
            changes: Changes::new(),
        });
        let json = serde_json::to_string(&input).unwrap();
        assert!(json.contains("\"kind\":\"input\""));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, input);
    }
}
