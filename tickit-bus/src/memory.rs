// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! The default in-process broker: one `tokio::sync::broadcast` channel per
//! topic, held behind a shared map so any task holding a clone of the
//! [`InMemoryBus`] can produce to, or subscribe to, any topic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tickit_core::{Message, TickitError, TickitResult};
use tokio::sync::broadcast;

use crate::{Consumer, Producer, Subscription};

const CHANNEL_CAPACITY: usize = 1024;

struct Topics {
    channels: Mutex<HashMap<String, broadcast::Sender<Message>>>,
}

impl Topics {
    fn sender_for(&self, topic: &str) -> broadcast::Sender<Message> {
        let mut channels = self.channels.lock().expect("topics mutex poisoned");
        channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

/// An in-process publish/subscribe broker. Cheap to clone: every clone
/// shares the same topic table.
#[derive(Clone)]
pub struct InMemoryBus {
    topics: Arc<Topics>,
}

impl InMemoryBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            topics: Arc::new(Topics {
                channels: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Producer for InMemoryBus {
    async fn produce(&self, topic: &str, message: Message) -> TickitResult<()> {
        let sender = self.topics.sender_for(topic);
        // `send` only errors when there are no receivers; dropping a
        // message nobody is listening for is not a delivery failure.
        let _ = sender.send(message);
        Ok(())
    }
}

#[async_trait]
impl Consumer for InMemoryBus {
    async fn subscribe(&self, topic: &str) -> TickitResult<Box<dyn Subscription>> {
        let receiver = self.topics.sender_for(topic).subscribe();
        Ok(Box::new(BroadcastSubscription { receiver }))
    }
}

struct BroadcastSubscription {
    receiver: broadcast::Receiver<Message>,
}

#[async_trait]
impl Subscription for BroadcastSubscription {
    async fn recv(&mut self) -> TickitResult<Message> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Ok(message),
                // A slow subscriber missed messages; surface it as a bus
                // failure rather than silently skipping ahead, since
                // ordering guarantees would otherwise be violated.
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    return Err(TickitError::bus(format!("subscriber lagged, missed {missed} messages")));
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(TickitError::bus("topic closed, no producers remain"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tickit_core::{ComponentId, StopComponent};

    use super::*;

    #[tokio::test]
    async fn subscriber_receives_produced_message() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("topic").await.unwrap();

        bus.produce("topic", Message::Stop(StopComponent)).await.unwrap();

        assert_eq!(sub.recv().await.unwrap(), Message::Stop(StopComponent));
    }

    #[tokio::test]
    async fn ordering_preserved_per_topic() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("topic").await.unwrap();

        for i in 0..5u64 {
            let interrupt = tickit_core::Interrupt {
                source: ComponentId::new(format!("c{i}")).unwrap(),
            };
            bus.produce("topic", Message::Interrupt(interrupt)).await.unwrap();
        }

        for i in 0..5u64 {
            let Message::Interrupt(interrupt) = sub.recv().await.unwrap() else {
                panic!("expected interrupt");
            };
            assert_eq!(interrupt.source, ComponentId::new(format!("c{i}")).unwrap());
        }
    }

    #[tokio::test]
    async fn independent_topics_do_not_cross_talk() {
        let bus = InMemoryBus::new();
        let mut sub_a = bus.subscribe("a").await.unwrap();
        let mut sub_b = bus.subscribe("b").await.unwrap();

        bus.produce(
            "a",
            Message::Interrupt(tickit_core::Interrupt {
                source: ComponentId::new("only-a").unwrap(),
            }),
        )
        .await
        .unwrap();

        let Message::Interrupt(got) = sub_a.recv().await.unwrap() else {
            panic!("expected interrupt")
        };
        assert_eq!(got.source, ComponentId::new("only-a").unwrap());

        // `b` never received anything; confirm by racing against a timeout.
        let result = tokio::time::timeout(std::time::Duration::from_millis(50), sub_b.recv()).await;
        assert!(result.is_err(), "topic b should not have received a's message");
    }
}
