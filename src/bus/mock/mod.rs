//! Mock event bus implementation for testing.
//!
//! Records every call with its arguments, serves pre-loaded events, and can
//! be told to fail any single operation.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BusError, EventBusPublisher, EventBusSubscriber, EventStream, Result};
use crate::messages::Event;

/// Bus operation, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusOperation {
    Publish,
    Subscribe,
    Pull,
    Stream,
    Acknowledge,
}

/// A recorded call on the mock bus.
#[derive(Debug, Clone, PartialEq)]
pub enum BusCall {
    Publish { channel: String, event: Event },
    Subscribe { channel: String },
    Pull { max_messages: usize },
    Stream,
    Acknowledge { message_id: String },
}

/// Mock event bus for testing.
///
/// `pull` hands out the loaded events in order, at most `max_messages` at a
/// time. `stream` emits all loaded events and then ends.
#[derive(Default)]
pub struct MockEventBus {
    calls: RwLock<Vec<BusCall>>,
    events: RwLock<Vec<Event>>,
    failures: RwLock<Vec<(BusOperation, String)>>,
}

impl MockEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock pre-loaded with events to deliver.
    pub fn with_events(events: Vec<Event>) -> Self {
        Self {
            events: RwLock::new(events),
            ..Self::default()
        }
    }

    /// Make every call to `operation` fail with the given message.
    pub async fn fail_on(&self, operation: BusOperation, message: impl Into<String>) {
        self.failures.write().await.push((operation, message.into()));
    }

    pub async fn load_events(&self, events: Vec<Event>) {
        self.events.write().await.extend(events);
    }

    pub async fn calls(&self) -> Vec<BusCall> {
        self.calls.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// Events passed to `publish`, with their channel, in call order.
    pub async fn published(&self) -> Vec<(String, Event)> {
        self.calls
            .read()
            .await
            .iter()
            .filter_map(|call| match call {
                BusCall::Publish { channel, event } => Some((channel.clone(), event.clone())),
                _ => None,
            })
            .collect()
    }

    /// Last channel passed to `subscribe`.
    pub async fn subscribed_channel(&self) -> Option<String> {
        self.calls
            .read()
            .await
            .iter()
            .rev()
            .find_map(|call| match call {
                BusCall::Subscribe { channel } => Some(channel.clone()),
                _ => None,
            })
    }

    async fn record(&self, call: BusCall) {
        self.calls.write().await.push(call);
    }

    async fn check_failure(&self, operation: BusOperation) -> Result<()> {
        let failures = self.failures.read().await;
        match failures.iter().find(|(op, _)| *op == operation) {
            Some((_, message)) => Err(BusError::Other(message.clone().into())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl EventBusPublisher for MockEventBus {
    async fn publish(&self, channel: &str, event: &Event) -> Result<()> {
        self.record(BusCall::Publish {
            channel: channel.to_string(),
            event: event.clone(),
        })
        .await;
        self.check_failure(BusOperation::Publish).await
    }
}

#[async_trait]
impl EventBusSubscriber for MockEventBus {
    async fn subscribe(&self, channel: &str) -> Result<()> {
        self.record(BusCall::Subscribe {
            channel: channel.to_string(),
        })
        .await;
        self.check_failure(BusOperation::Subscribe).await
    }

    async fn pull(&self, max_messages: usize) -> Result<Vec<Event>> {
        self.record(BusCall::Pull { max_messages }).await;
        self.check_failure(BusOperation::Pull).await?;

        let mut events = self.events.write().await;
        let take = max_messages.min(events.len());
        Ok(events.drain(..take).collect())
    }

    async fn stream(&self) -> Result<EventStream> {
        self.record(BusCall::Stream).await;
        self.check_failure(BusOperation::Stream).await?;

        let events = std::mem::take(&mut *self.events.write().await);
        let (tx, rx) = tokio::sync::mpsc::channel(events.len().max(1));
        tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx)))
    }

    async fn acknowledge(&self, message_id: &str) -> Result<()> {
        self.record(BusCall::Acknowledge {
            message_id: message_id.to_string(),
        })
        .await;
        self.check_failure(BusOperation::Acknowledge).await
    }
}
