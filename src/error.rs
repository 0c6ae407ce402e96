//! Errors returned by the publisher and subscriber.
//!
//! Every bus failure is wrapped with the operation and the channel name or
//! message id it concerned; the bus error stays reachable through
//! [`std::error::Error::source`].

use crate::bus::BusError;

/// Result type for publisher and subscriber operations.
pub type Result<T> = std::result::Result<T, PubSubError>;

/// Broad classification of a [`PubSubError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected locally, before any bus call.
    Configuration,
    /// The bus returned an error.
    Transport,
    /// The bus had no stream to hand out yet.
    StreamNotReady,
}

#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    #[error("must provide a channel name")]
    ChannelNameRequired,

    #[error("already subscribed to channel {channel:?}")]
    AlreadySubscribed { channel: String },

    #[error("could not publish event: {source}")]
    Publish { source: BusError },

    #[error("unexpected error subscribing to channel {channel:?}: {source}")]
    Subscribe { channel: String, source: BusError },

    #[error("unexpected error pulling messages from {channel:?}: {source}")]
    Pull { channel: String, source: BusError },

    #[error("unexpected error streaming messages from {channel:?}: {source}")]
    Stream { channel: String, source: BusError },

    #[error("unexpected error acknowledging message: {message_id:?}: {source}")]
    Acknowledge { message_id: String, source: BusError },
}

impl PubSubError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PubSubError::ChannelNameRequired | PubSubError::AlreadySubscribed { .. } => {
                ErrorKind::Configuration
            }
            PubSubError::Stream {
                source: BusError::StreamNotReady(_),
                ..
            } => ErrorKind::StreamNotReady,
            _ => ErrorKind::Transport,
        }
    }

    /// The underlying bus error, if this error came from the bus.
    pub fn bus_error(&self) -> Option<&BusError> {
        match self {
            PubSubError::ChannelNameRequired | PubSubError::AlreadySubscribed { .. } => None,
            PubSubError::Publish { source }
            | PubSubError::Subscribe { source, .. }
            | PubSubError::Pull { source, .. }
            | PubSubError::Stream { source, .. }
            | PubSubError::Acknowledge { source, .. } => Some(source),
        }
    }
}
