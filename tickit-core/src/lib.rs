// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

#![doc(test(attr(warn(unused))))]

//! `tickit-core` - shared data model for the Tickit tick engine.
//!
//! This crate has no opinion on routing, ticking, or scheduling; it just
//! defines the vocabulary those layers (`tickit-router`, `tickit-engine`)
//! share: component and port identifiers, the `Wiring` / `InverseWiring`
//! connection graph, simulated time, `Changes`, and the bus [`Message`]
//! sum.

pub mod changes;
pub mod error;
pub mod ids;
pub mod messages;
pub mod time;

pub use changes::{Changes, Value};
pub use error::{TickitError, TickitResult};
pub use ids::{ComponentId, ComponentPort, PortId};
pub use messages::{ComponentException, Input, Interrupt, Message, Output, StopComponent};
pub use time::SimTime;

pub mod wiring;
pub use wiring::{InverseWiring, Wiring};
