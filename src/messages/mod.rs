//! Event envelope exchanged between producers and consumers.
//!
//! An [`Event`] is a [`Header`] plus an opaque byte payload. The payload
//! encoding belongs to the callers; the JSON helpers here are conveniences
//! and are never used by the publisher or subscriber themselves.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::warn;

/// Event metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Correlation id, assigned by the producer.
    id: String,
    /// Business domain of the event (e.g. "loans").
    domain: String,
    /// Event kind within the domain.
    event_type: String,
    /// Schema version of the event type.
    version: String,
    /// Name of the producing application.
    application: String,
    /// Bus-assigned id used for acknowledgment. Absent until delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
}

impl Header {
    /// Create a producer-side header. `message_id` stays empty.
    pub fn new(
        id: impl Into<String>,
        domain: impl Into<String>,
        event_type: impl Into<String>,
        version: impl Into<String>,
        application: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            domain: domain.into(),
            event_type: event_type.into(),
            version: version.into(),
            application: application.into(),
            message_id: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    /// Bus-assigned message id, if the event has been delivered.
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }
}

/// An event: header plus opaque payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    header: Header,
    data: Vec<u8>,
}

impl Event {
    pub fn new(header: Header, data: impl Into<Vec<u8>>) -> Self {
        Self {
            header,
            data: data.into(),
        }
    }

    /// Create an event with a JSON-encoded payload.
    pub fn from_json<T: Serialize>(header: Header, payload: &T) -> serde_json::Result<Self> {
        let data = serde_json::to_vec(payload)?;
        Ok(Self::new(header, data))
    }

    /// Decode the payload as JSON.
    pub fn decode_json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.data)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload as a string, if it is valid UTF-8.
    pub fn data_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    /// Shorthand for `header().message_id()`.
    pub fn message_id(&self) -> Option<&str> {
        self.header.message_id()
    }

    /// Stamp the bus-assigned message id on delivery.
    ///
    /// The message id is write-once: an event that already carries one is
    /// returned unchanged.
    pub fn delivered(mut self, message_id: impl Into<String>) -> Self {
        let message_id = message_id.into();
        match &self.header.message_id {
            Some(existing) => {
                warn!(
                    existing = %existing,
                    ignored = %message_id,
                    "Event already carries a message id"
                );
            }
            None => self.header.message_id = Some(message_id),
        }
        self
    }

    /// Replace any message id with the one the delivering bus assigned.
    pub(crate) fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.header.message_id = Some(message_id.into());
        self
    }
}
