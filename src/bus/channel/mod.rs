//! In-memory channel-based event bus for standalone mode.
//!
//! Keeps one FIFO queue per named channel inside the process. Ideal for
//! local development and testing without external dependencies.
//!
//! Delivery is at-least-once: pulled or streamed events stay in flight until
//! acknowledged, and [`ChannelEventBus::requeue_unacknowledged`] puts them
//! back at the head of their channel.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, info};

use super::{BusError, EventBusPublisher, EventBusSubscriber, EventStream, Result};
use crate::messages::Event;

/// Per-channel queue state.
#[derive(Default)]
struct Topic {
    /// Events waiting for delivery, with their assigned message id.
    pending: VecDeque<(u64, Event)>,
    /// Delivered but not yet acknowledged, keyed by message id.
    in_flight: HashMap<String, (u64, Event)>,
    /// Last assigned message id. Ids start at 1.
    last_message_id: u64,
}

impl Topic {
    fn enqueue(&mut self, event: Event) -> u64 {
        self.last_message_id += 1;
        self.pending.push_back((self.last_message_id, event));
        self.last_message_id
    }

    fn deliver_next(&mut self) -> Option<Event> {
        let (seq, event) = self.pending.pop_front()?;
        let message_id = seq.to_string();
        // Ids from an upstream bus do not key this topic's in-flight map.
        let delivered = event.with_message_id(message_id.clone());
        self.in_flight.insert(message_id, (seq, delivered.clone()));
        Some(delivered)
    }
}

/// State shared by every handle of one bus.
#[derive(Default)]
struct Broker {
    topics: Mutex<HashMap<String, Topic>>,
    /// Wakes streams when events arrive or the bus closes.
    notify: Notify,
    closed: AtomicBool,
}

impl Broker {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn next_event(&self, channel: &str) -> Option<Event> {
        let mut topics = self.topics.lock().await;
        topics.get_mut(channel).and_then(Topic::deliver_next)
    }
}

/// In-memory event bus with named channels.
///
/// Clones of the same bus (via [`ChannelEventBus::subscriber_handle`]) share
/// the channels but each keeps its own subscription.
pub struct ChannelEventBus {
    broker: Arc<Broker>,
    /// Channel this handle is bound to.
    subscription: RwLock<Option<String>>,
}

impl Default for ChannelEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelEventBus {
    /// Create a new channel event bus.
    pub fn new() -> Self {
        info!("Channel event bus initialized");

        Self {
            broker: Arc::new(Broker::default()),
            subscription: RwLock::new(None),
        }
    }

    /// Create a new handle on the same channels with no subscription.
    ///
    /// Handles subscribed to the same channel compete for its events.
    pub fn subscriber_handle(&self) -> Self {
        Self {
            broker: self.broker.clone(),
            subscription: RwLock::new(None),
        }
    }

    /// Channel this handle is subscribed to.
    pub async fn subscription(&self) -> Option<String> {
        self.subscription.read().await.clone()
    }

    /// Number of events waiting for delivery on a channel.
    pub async fn pending_count(&self, channel: &str) -> usize {
        let topics = self.broker.topics.lock().await;
        topics.get(channel).map_or(0, |t| t.pending.len())
    }

    /// Number of delivered, unacknowledged events on a channel.
    pub async fn in_flight_count(&self, channel: &str) -> usize {
        let topics = self.broker.topics.lock().await;
        topics.get(channel).map_or(0, |t| t.in_flight.len())
    }

    /// Put every unacknowledged event of the subscribed channel back at the
    /// head of the queue, oldest first. Returns how many were requeued.
    pub async fn requeue_unacknowledged(&self) -> Result<usize> {
        let channel = self.bound_channel().await?;
        let requeued = {
            let mut topics = self.broker.topics.lock().await;
            let topic = topics.entry(channel.clone()).or_default();

            let mut in_flight: Vec<(u64, Event)> =
                topic.in_flight.drain().map(|(_, entry)| entry).collect();
            in_flight.sort_by_key(|(seq, _)| *seq);
            let count = in_flight.len();
            for entry in in_flight.into_iter().rev() {
                topic.pending.push_front(entry);
            }
            count
        };

        if requeued > 0 {
            self.broker.notify.notify_waiters();
        }
        debug!(channel = %channel, requeued, "Requeued unacknowledged events");
        Ok(requeued)
    }

    /// Close the bus. Open streams end after delivering what is already queued, and
    /// later operations fail with [`BusError::Closed`].
    pub fn close(&self) {
        self.broker.closed.store(true, Ordering::SeqCst);
        self.broker.notify.notify_waiters();
        info!("Channel event bus closed");
    }

    async fn bound_channel(&self) -> Result<String> {
        self.subscription
            .read()
            .await
            .clone()
            .ok_or(BusError::NotSubscribed)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.broker.is_closed() {
            return Err(BusError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl EventBusPublisher for ChannelEventBus {
    #[tracing::instrument(name = "bus.publish", skip_all, fields(channel = %channel))]
    async fn publish(&self, channel: &str, event: &Event) -> Result<()> {
        self.ensure_open()?;

        let message_id = {
            let mut topics = self.broker.topics.lock().await;
            topics.entry(channel.to_string()).or_default().enqueue(event.clone())
        };
        self.broker.notify.notify_waiters();

        debug!(
            channel = %channel,
            event_id = %event.header().id(),
            message_id,
            "Published event to channel"
        );
        Ok(())
    }
}

#[async_trait]
impl EventBusSubscriber for ChannelEventBus {
    #[tracing::instrument(name = "bus.subscribe", skip_all, fields(channel = %channel))]
    async fn subscribe(&self, channel: &str) -> Result<()> {
        self.ensure_open()?;
        if channel.is_empty() {
            return Err(BusError::Subscribe("empty channel name".to_string()));
        }

        self.broker
            .topics
            .lock()
            .await
            .entry(channel.to_string())
            .or_default();
        *self.subscription.write().await = Some(channel.to_string());

        info!(channel = %channel, "Subscribed to channel bus");
        Ok(())
    }

    #[tracing::instrument(name = "bus.pull", skip_all, fields(max_messages = max_messages))]
    async fn pull(&self, max_messages: usize) -> Result<Vec<Event>> {
        self.ensure_open()?;
        let channel = self.bound_channel().await?;

        let batch: Vec<Event> = {
            let mut topics = self.broker.topics.lock().await;
            let topic = topics.entry(channel.clone()).or_default();
            std::iter::from_fn(|| topic.deliver_next())
                .take(max_messages)
                .collect()
        };

        debug!(channel = %channel, count = batch.len(), "Pulled events from channel");
        Ok(batch)
    }

    #[tracing::instrument(name = "bus.stream", skip_all)]
    async fn stream(&self) -> Result<EventStream> {
        self.ensure_open()?;
        let channel = self
            .subscription()
            .await
            .ok_or_else(|| BusError::StreamNotReady("no channel subscribed".to_string()))?;

        debug!(channel = %channel, "Opening channel stream");

        let state = (self.broker.clone(), channel);
        let stream = futures::stream::unfold(state, |(broker, channel)| async move {
            loop {
                // Register before checking so a publish in between is not missed.
                let notified = broker.notify.notified();
                if let Some(event) = broker.next_event(&channel).await {
                    drop(notified);
                    return Some((event, (broker, channel)));
                }
                if broker.is_closed() {
                    debug!(channel = %channel, "Channel bus closed, ending stream");
                    return None;
                }
                notified.await;
            }
        });

        Ok(Box::pin(stream))
    }

    #[tracing::instrument(name = "bus.acknowledge", skip_all, fields(message_id = %message_id))]
    async fn acknowledge(&self, message_id: &str) -> Result<()> {
        self.ensure_open()?;
        let channel = self.bound_channel().await?;

        let removed = {
            let mut topics = self.broker.topics.lock().await;
            topics
                .get_mut(&channel)
                .and_then(|t| t.in_flight.remove(message_id))
        };

        match removed {
            Some(_) => {
                debug!(channel = %channel, message_id = %message_id, "Acknowledged message");
                Ok(())
            }
            None => Err(BusError::UnknownMessage(message_id.to_string())),
        }
    }
}
