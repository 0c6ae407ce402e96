//! Pubsub core - publish/subscribe over pluggable event buses
//!
//! A typed event envelope, a publisher that pushes envelopes onto named
//! channels, and a subscriber that consumes them in bounded batches or as a
//! continuous stream, with explicit per-message acknowledgment. Transports
//! plug in through the traits in [`bus`].

pub mod bus;
pub mod config;
pub mod error;
pub mod messages;
pub mod publishers;
pub mod subscribers;
pub mod utils;

pub use bus::{BusError, EventBusPublisher, EventBusSubscriber, EventStream};
pub use error::{ErrorKind, PubSubError, Result};
pub use messages::{Event, Header};
pub use publishers::{EventMessage, Publisher};
pub use subscribers::{until_cancelled, Subscriber, SubscriberSettings};
