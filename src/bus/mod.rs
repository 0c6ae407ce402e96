//! Event bus boundary.
//!
//! This module contains:
//! - `EventBusPublisher` / `EventBusSubscriber` traits: the capabilities the
//!   publisher and subscriber need from a transport
//! - `BusError`: errors returned by bus implementations
//! - Bus configuration types
//! - Implementations: Channel (in-process), Mock

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::Deserialize;
use tracing::info;

use crate::messages::Event;

// Implementation modules
#[cfg(feature = "channel")]
pub mod channel;
pub mod mock;

// Re-exports
#[cfg(feature = "channel")]
pub use channel::ChannelEventBus;
pub use mock::MockEventBus;

// ============================================================================
// Traits
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Continuous delivery of events from a bus.
///
/// The stream ends when the bus closes it. Dropping it hands the
/// subscription back to the bus.
pub type EventStream = Pin<Box<dyn Stream<Item = Event> + Send + 'static>>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("No channel subscribed")]
    NotSubscribed,

    #[error("Stream not ready: {0}")]
    StreamNotReady(String),

    #[error("Unknown message id {0:?}")]
    UnknownMessage(String),

    #[error("Bus closed")]
    Closed,

    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Publish side of an event bus.
///
/// Implementations must be safe for concurrent use; the publisher adds no
/// synchronization of its own.
#[async_trait]
pub trait EventBusPublisher: Send + Sync {
    /// Push the event onto the named channel.
    async fn publish(&self, channel: &str, event: &Event) -> Result<()>;
}

/// Subscribe side of an event bus.
///
/// Delivery semantics (at-least-once, ordering, redelivery timing) belong
/// to the implementation.
#[async_trait]
pub trait EventBusSubscriber: Send + Sync {
    /// Bind this bus client to a channel.
    async fn subscribe(&self, channel: &str) -> Result<()>;

    /// Fetch up to `max_messages` events in one call. An empty batch is not
    /// an error.
    async fn pull(&self, max_messages: usize) -> Result<Vec<Event>>;

    /// Open a continuous delivery stream for the subscribed channel.
    async fn stream(&self) -> Result<EventStream>;

    /// Mark a delivered message as processed so it is not redelivered.
    async fn acknowledge(&self, message_id: &str) -> Result<()>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Messaging type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagingType {
    /// In-process channel bus.
    #[default]
    Channel,
}

/// Messaging configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Messaging type discriminator.
    #[serde(rename = "type")]
    pub messaging_type: MessagingType,
}

// ============================================================================
// Factory
// ============================================================================

/// Bus handles for one client: the same transport seen from both sides.
pub struct EventBusHandles {
    pub publisher: Arc<dyn EventBusPublisher>,
    pub subscriber: Arc<dyn EventBusSubscriber>,
}

/// Initialize event bus based on configuration.
///
/// Requires the corresponding feature to be enabled:
/// - Channel: `--features channel` (included in default)
pub fn init_event_bus(
    config: &MessagingConfig,
) -> std::result::Result<EventBusHandles, Box<dyn std::error::Error + Send + Sync>> {
    match config.messaging_type {
        MessagingType::Channel => {
            #[cfg(feature = "channel")]
            {
                let bus = Arc::new(ChannelEventBus::new());
                info!(messaging_type = "channel", "Event bus initialized");
                Ok(EventBusHandles {
                    publisher: bus.clone(),
                    subscriber: bus,
                })
            }

            #[cfg(not(feature = "channel"))]
            {
                Err("Channel bus requires the 'channel' feature. Rebuild with --features channel"
                    .into())
            }
        }
    }
}
