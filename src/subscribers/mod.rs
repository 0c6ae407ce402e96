//! Subscriber: consumes events from a bound bus channel.
//!
//! A subscriber starts unbound. A successful [`Subscriber::subscribe`] binds
//! it to one channel for the rest of its life; events are then fetched in
//! bounded batches with [`Subscriber::pull`] or as a continuous feed with
//! [`Subscriber::stream`], and acknowledged one by one.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bus::{EventBusSubscriber, EventStream};
use crate::config::SubscriberConfig;
use crate::error::{PubSubError, Result};
use crate::messages::Event;

/// Construction parameters for a [`Subscriber`].
#[derive(Clone)]
pub struct SubscriberSettings {
    pub event_bus: Arc<dyn EventBusSubscriber>,
    /// Batch size requested from the bus on every pull.
    pub messages_per_pull: usize,
}

/// Consumes events through an injected bus.
pub struct Subscriber {
    event_bus: Arc<dyn EventBusSubscriber>,
    channel: Option<String>,
    messages_per_pull: usize,
}

impl Subscriber {
    pub fn new(settings: SubscriberSettings) -> Self {
        Self {
            event_bus: settings.event_bus,
            channel: None,
            messages_per_pull: settings.messages_per_pull,
        }
    }

    /// Build a subscriber with the batch size from configuration.
    pub fn from_config(event_bus: Arc<dyn EventBusSubscriber>, config: &SubscriberConfig) -> Self {
        Self::new(SubscriberSettings {
            event_bus,
            messages_per_pull: config.messages_per_pull,
        })
    }

    /// Build a subscriber from configuration and bind it to the configured
    /// channel, if one is set.
    pub async fn connect(
        event_bus: Arc<dyn EventBusSubscriber>,
        config: &SubscriberConfig,
    ) -> Result<Self> {
        let mut subscriber = Self::from_config(event_bus, config);
        if let Some(channel) = &config.channel {
            subscriber.subscribe(channel).await?;
        }
        Ok(subscriber)
    }

    /// Channel this subscriber is bound to, if any.
    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    pub fn messages_per_pull(&self) -> usize {
        self.messages_per_pull
    }

    /// Bind to a channel.
    ///
    /// An empty name is rejected without contacting the bus. Rebinding an
    /// already bound subscriber is rejected too; build a new subscriber
    /// instead. On bus failure the subscriber stays unbound.
    pub async fn subscribe(&mut self, channel: &str) -> Result<()> {
        if channel.is_empty() {
            return Err(PubSubError::ChannelNameRequired);
        }
        if let Some(bound) = &self.channel {
            return Err(PubSubError::AlreadySubscribed {
                channel: bound.clone(),
            });
        }

        self.event_bus
            .subscribe(channel)
            .await
            .map_err(|source| PubSubError::Subscribe {
                channel: channel.to_string(),
                source,
            })?;

        info!(channel = %channel, "Subscriber bound to channel");
        self.channel = Some(channel.to_string());

        Ok(())
    }

    /// Fetch up to `messages_per_pull` events in a single bus call.
    ///
    /// The batch is returned exactly as the bus produced it; an empty batch
    /// is not an error.
    pub async fn pull(&self) -> Result<Vec<Event>> {
        let events = self
            .event_bus
            .pull(self.messages_per_pull)
            .await
            .map_err(|source| PubSubError::Pull {
                channel: self.channel_name().to_string(),
                source,
            })?;

        debug!(
            channel = %self.channel_name(),
            requested = self.messages_per_pull,
            received = events.len(),
            "Pulled events"
        );
        Ok(events)
    }

    /// Open the bus's delivery stream.
    ///
    /// The stream is handed over untouched: the caller drains it and stops
    /// when it ends. Once ended, call `stream` again to resume.
    pub async fn stream(&self) -> Result<EventStream> {
        self.event_bus
            .stream()
            .await
            .map_err(|source| PubSubError::Stream {
                channel: self.channel_name().to_string(),
                source,
            })
    }

    /// Tell the bus a delivered message was processed.
    pub async fn acknowledge(&self, message_id: &str) -> Result<()> {
        self.event_bus
            .acknowledge(message_id)
            .await
            .map_err(|source| PubSubError::Acknowledge {
                message_id: message_id.to_string(),
                source,
            })
    }

    fn channel_name(&self) -> &str {
        self.channel.as_deref().unwrap_or_default()
    }
}

/// End `stream` as soon as `cancel` fires.
///
/// Events already yielded stay with the caller; the bus side is not closed,
/// only released when the returned stream is dropped.
pub fn until_cancelled(stream: EventStream, cancel: CancellationToken) -> EventStream {
    Box::pin(stream.take_until(cancel.cancelled_owned()))
}
