//! Publisher: pushes events onto named bus channels.

use std::sync::Arc;

use tracing::error;

use crate::bus::EventBusPublisher;
use crate::error::{PubSubError, Result};
use crate::messages::Event;

/// An event and the channel it should go to.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMessage {
    /// Name of the topic or queue.
    pub channel_name: String,
    /// Event to publish.
    pub event: Event,
}

impl EventMessage {
    pub fn new(channel_name: impl Into<String>, event: Event) -> Self {
        Self {
            channel_name: channel_name.into(),
            event,
        }
    }
}

/// Publishes events through an injected bus.
///
/// A single pass-through call per message: no retry, batching, payload
/// validation or deduplication.
#[derive(Clone)]
pub struct Publisher {
    event_bus: Arc<dyn EventBusPublisher>,
}

impl Publisher {
    pub fn new(event_bus: Arc<dyn EventBusPublisher>) -> Self {
        Self { event_bus }
    }

    /// Push the message's event into its channel.
    #[tracing::instrument(name = "publisher.publish", skip_all, fields(channel = %message.channel_name))]
    pub async fn publish(&self, message: &EventMessage) -> Result<()> {
        if let Err(source) = self
            .event_bus
            .publish(&message.channel_name, &message.event)
            .await
        {
            let header = message.event.header();
            error!(
                channel = %message.channel_name,
                event_id = %header.id(),
                domain = %header.domain(),
                event_type = %header.event_type(),
                version = %header.version(),
                application = %header.application(),
                error = %source,
                method = "publishers::Publisher::publish",
                "something went wrong pushing event"
            );
            return Err(PubSubError::Publish { source });
        }

        Ok(())
    }
}
