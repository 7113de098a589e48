// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

#![doc(test(attr(warn(unused))))]

//! The Tickit tick engine: resolves one simulated instant at a time
//! ([`ticker`]), tracks who wants to be woken and when ([`wakeup`]), gives
//! components somewhere to live ([`component`]), and drives the whole
//! thing forward in time, either as the top-level
//! [`MasterScheduler`](master::MasterScheduler) or embedded as one device
//! via [`SlaveScheduler`](slave::SlaveScheduler).

pub mod component;
pub mod master;
pub mod registry;
pub mod slave;
pub mod ticker;
pub mod wakeup;

pub use component::{Adapter, ComponentRuntime, Device, DeviceUpdate, InterruptHandle, NoAdapter};
pub use master::MasterScheduler;
pub use registry::{DeviceFactory, DeviceRegistry};
pub use slave::{Raiser, SlaveScheduler};
pub use ticker::Ticker;
pub use wakeup::{MasterWakeupQueue, SlaveWakeupQueue};
