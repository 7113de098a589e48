// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

#![doc(test(attr(warn(unused))))]

//! The bus abstraction the scheduler and components communicate through.
//!
//! Two implementations are expected in a real deployment: the in-process
//! [`memory::InMemoryBus`] (the default, used for single-process
//! simulations and exercised throughout this crate's tests) and a
//! distributed broker for multi-host deployments. Only the
//! [`Producer`]/[`Consumer`] contract is specified here; a distributed
//! implementation is an external collaborator, out of scope for this
//! crate.

mod memory;
mod topics;

use async_trait::async_trait;
use tickit_core::{Message, TickitResult};

pub use memory::InMemoryBus;
pub use topics::{input_topic, output_topic};

/// Publishes messages to a named topic.
///
/// At-least-once delivery to all current subscribers; ordering is
/// preserved per `(producer, topic)` pair.
#[async_trait]
pub trait Producer: Send + Sync {
    async fn produce(&self, topic: &str, message: Message) -> TickitResult<()>;
}

/// A single subscription to one topic. Messages are delivered in arrival
/// order.
#[async_trait]
pub trait Subscription: Send {
    async fn recv(&mut self) -> TickitResult<Message>;
}

/// Creates subscriptions to named topics.
#[async_trait]
pub trait Consumer: Send + Sync {
    async fn subscribe(&self, topic: &str) -> TickitResult<Box<dyn Subscription>>;
}

/// The full bus contract: something that can both produce and be
/// subscribed to.
pub trait Bus: Producer + Consumer {}
impl<T: Producer + Consumer> Bus for T {}

/// Publish `message` to `topic`, retrying with exponential backoff up to
/// `max_attempts` times before giving up with [`TickitError::BusFailure`]
/// (the caller is then expected to demote this into a
/// `ComponentException`, per the error propagation policy).
///
/// [`TickitError::BusFailure`]: tickit_core::TickitError::BusFailure
pub async fn produce_with_retry(
    producer: &dyn Producer,
    topic: &str,
    message: Message,
    max_attempts: u32,
) -> TickitResult<()> {
    let mut attempt = 0;
    loop {
        match producer.produce(topic, message.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt + 1 < max_attempts => {
                attempt += 1;
                log::warn!("bus produce to {topic} failed (attempt {attempt}): {e}");
                tokio::time::sleep(std::time::Duration::from_millis(10 * 2u64.pow(attempt))).await;
            }
            Err(e) => return Err(e),
        }
    }
}
