//! Publish/subscribe interface step definitions.

use std::sync::Arc;
use std::time::Duration;

use cucumber::{given, then, when, World};
use futures::StreamExt;
use pubsub_core::bus::mock::{BusCall, BusOperation};
use pubsub_core::bus::MockEventBus;
use pubsub_core::{
    until_cancelled, ErrorKind, Event, EventBusPublisher, EventBusSubscriber, EventMessage,
    EventStream, Header, PubSubError, Publisher, Subscriber, SubscriberSettings,
};
use tokio_util::sync::CancellationToken;

use crate::backend::{create_bus, BusUnderTest};

/// How long a stream step waits for the next event.
const STREAM_WAIT: Duration = Duration::from_secs(2);

/// Test context for publish/subscribe scenarios.
#[derive(World)]
#[world(init = Self::new)]
pub struct PubSubWorld {
    mock: Arc<MockEventBus>,
    backend: Option<BusUnderTest>,
    subscriber: Option<Subscriber>,
    stream: Option<EventStream>,
    pulled: Vec<Event>,
    streamed: Vec<Event>,
    last_error: Option<PubSubError>,
}

impl std::fmt::Debug for PubSubWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubSubWorld")
            .field("backend", &self.backend.is_some())
            .field("channel", &self.subscriber.as_ref().and_then(|s| s.channel()))
            .field("stream_open", &self.stream.is_some())
            .field("pulled", &self.pulled.len())
            .field("streamed", &self.streamed.len())
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl PubSubWorld {
    fn new() -> Self {
        Self {
            mock: Arc::new(MockEventBus::new()),
            backend: None,
            subscriber: None,
            stream: None,
            pulled: Vec::new(),
            streamed: Vec::new(),
            last_error: None,
        }
    }

    fn make_event(id: &str) -> Event {
        Event::new(
            Header::new(id, "loans", "orders", "0.1.0", "core-app"),
            br#"{"a":1}"#.to_vec(),
        )
    }

    fn publisher_bus(&self) -> Arc<dyn EventBusPublisher> {
        match &self.backend {
            Some(backend) => backend.publisher.clone(),
            None => self.mock.clone(),
        }
    }

    fn subscriber_bus(&self) -> Arc<dyn EventBusSubscriber> {
        match &self.backend {
            Some(backend) => backend.subscriber.clone(),
            None => self.mock.clone(),
        }
    }

    fn new_subscriber(&self, messages_per_pull: usize) -> Subscriber {
        Subscriber::new(SubscriberSettings {
            event_bus: self.subscriber_bus(),
            messages_per_pull,
        })
    }

    fn subscriber(&self) -> &Subscriber {
        self.subscriber.as_ref().expect("No subscriber")
    }

    fn record<T>(&mut self, result: Result<T, PubSubError>) -> Option<T> {
        match result {
            Ok(value) => {
                self.last_error = None;
                Some(value)
            }
            Err(e) => {
                self.last_error = Some(e);
                None
            }
        }
    }

    fn parse_operation(operation: &str) -> BusOperation {
        match operation {
            "publish" => BusOperation::Publish,
            "subscribe" => BusOperation::Subscribe,
            "pull" => BusOperation::Pull,
            "stream" => BusOperation::Stream,
            "acknowledge" => BusOperation::Acknowledge,
            other => panic!("Unknown bus operation: {other}"),
        }
    }

    async fn open_stream(&mut self) {
        let stream = self.subscriber().stream().await;
        self.stream = self.record(stream);
    }

    async fn consume_stream(&mut self, cancel_after: Option<usize>) {
        if self.stream.is_none() {
            self.open_stream().await;
        }
        let Some(stream) = self.stream.take() else {
            return;
        };

        let cancel = CancellationToken::new();
        let mut stream = until_cancelled(stream, cancel.clone());
        while let Some(event) = tokio::time::timeout(STREAM_WAIT, stream.next())
            .await
            .expect("Timed out waiting for stream")
        {
            self.streamed.push(event);
            if cancel_after == Some(self.streamed.len()) {
                cancel.cancel();
            }
        }
    }
}

// ==========================================================================
// Background
// ==========================================================================

#[given("a mock event bus")]
async fn given_mock_bus(_world: &mut PubSubWorld) {
    // Mock is initialized via World::new
}

#[given("the configured event bus")]
async fn given_configured_bus(world: &mut PubSubWorld) {
    world.backend = Some(create_bus());
}

#[given(expr = "the bus fails {string} with {string}")]
async fn given_bus_fails(world: &mut PubSubWorld, operation: String, message: String) {
    world
        .mock
        .fail_on(PubSubWorld::parse_operation(&operation), message)
        .await;
}

#[given(expr = "the bus holds event {string} with message id {string}")]
async fn given_bus_holds_event(world: &mut PubSubWorld, id: String, message_id: String) {
    let event = PubSubWorld::make_event(&id).delivered(message_id);
    world.mock.load_events(vec![event]).await;
}

#[given(expr = "a subscriber pulling {int} message(s) per pull")]
async fn given_subscriber(world: &mut PubSubWorld, messages_per_pull: usize) {
    world.subscriber = Some(world.new_subscriber(messages_per_pull));
}

#[given(expr = "a subscriber bound to channel {string}")]
async fn given_bound_subscriber(world: &mut PubSubWorld, channel: String) {
    let mut subscriber = world.new_subscriber(10);
    subscriber
        .subscribe(&channel)
        .await
        .expect("Failed to bind subscriber");
    world.subscriber = Some(subscriber);
}

// ==========================================================================
// Publisher
// ==========================================================================

#[when(expr = "I publish event {string} to channel {string}")]
async fn when_publish(world: &mut PubSubWorld, id: String, channel: String) {
    let publisher = Publisher::new(world.publisher_bus());
    let message = EventMessage::new(channel, PubSubWorld::make_event(&id));
    let result = publisher.publish(&message).await;
    world.record(result);
}

#[when(expr = "{int} events are published to channel {string}")]
async fn when_events_published(world: &mut PubSubWorld, count: usize, channel: String) {
    let publisher = Publisher::new(world.publisher_bus());
    for i in 1..=count {
        let message = EventMessage::new(&channel, PubSubWorld::make_event(&format!("evt-{i}")));
        publisher.publish(&message).await.expect("Publish failed");
    }
}

#[when("the bus is closed")]
async fn when_bus_closed(world: &mut PubSubWorld) {
    world.backend.as_ref().expect("No bus backend").close();
}

// ==========================================================================
// Subscriber
// ==========================================================================

#[when(expr = "I subscribe to channel {string}")]
async fn when_subscribe(world: &mut PubSubWorld, channel: String) {
    let subscriber = world.subscriber.as_mut().expect("No subscriber");
    let result = subscriber.subscribe(&channel).await;
    world.record(result);
}

#[when("I pull")]
async fn when_pull(world: &mut PubSubWorld) {
    let result = world.subscriber().pull().await;
    if let Some(events) = world.record(result) {
        world.pulled = events;
    }
}

#[when(expr = "I acknowledge message {string}")]
async fn when_acknowledge(world: &mut PubSubWorld, message_id: String) {
    let result = world.subscriber().acknowledge(&message_id).await;
    world.record(result);
}

#[when(expr = "I invoke {string}")]
async fn when_invoke(world: &mut PubSubWorld, operation: String) {
    match operation.as_str() {
        "pull" => {
            let result = world.subscriber().pull().await;
            world.record(result);
        }
        "stream" => {
            let result = world.subscriber().stream().await;
            world.record(result);
        }
        "acknowledge" => {
            let result = world.subscriber().acknowledge("42").await;
            world.record(result);
        }
        other => panic!("Cannot invoke {other}"),
    }
}

#[when("I open the stream")]
async fn when_open_stream(world: &mut PubSubWorld) {
    world.open_stream().await;
}

#[when("I consume the stream")]
async fn when_consume_stream(world: &mut PubSubWorld) {
    world.consume_stream(None).await;
}

#[when(expr = "I consume the stream and cancel after {int} events")]
async fn when_consume_stream_and_cancel(world: &mut PubSubWorld, count: usize) {
    world.consume_stream(Some(count)).await;
}

// ==========================================================================
// Assertions
// ==========================================================================

#[then("the operation should succeed")]
async fn then_succeeds(world: &mut PubSubWorld) {
    assert!(
        world.last_error.is_none(),
        "Unexpected error: {:?}",
        world.last_error
    );
}

#[then(expr = "the error should be {string}")]
async fn then_error_is(world: &mut PubSubWorld, expected: String) {
    let err = world.last_error.as_ref().expect("Expected an error");
    assert_eq!(err.to_string(), expected);
}

#[then(expr = "the error kind should be {string}")]
async fn then_error_kind(world: &mut PubSubWorld, kind: String) {
    let expected = match kind.as_str() {
        "configuration" => ErrorKind::Configuration,
        "transport" => ErrorKind::Transport,
        "stream not ready" => ErrorKind::StreamNotReady,
        other => panic!("Unknown error kind: {other}"),
    };
    let err = world.last_error.as_ref().expect("Expected an error");
    assert_eq!(err.kind(), expected);
}

#[then(expr = "the bus should have received event {string} on channel {string}")]
async fn then_bus_received(world: &mut PubSubWorld, id: String, channel: String) {
    let published = world.mock.published().await;
    assert_eq!(published, vec![(channel, PubSubWorld::make_event(&id))]);
}

#[then(expr = "the bus should have received {int} identical publish calls")]
async fn then_identical_publishes(world: &mut PubSubWorld, count: usize) {
    let published = world.mock.published().await;
    assert_eq!(published.len(), count);
    assert!(published.windows(2).all(|pair| pair[0] == pair[1]));
}

#[then("the bus should have received no calls")]
async fn then_no_calls(world: &mut PubSubWorld) {
    assert_eq!(world.mock.call_count().await, 0);
}

#[then(expr = "the bus should have been asked for {int} message(s) per pull")]
async fn then_pull_size(world: &mut PubSubWorld, max_messages: usize) {
    let calls = world.mock.calls().await;
    assert!(calls.contains(&BusCall::Pull { max_messages }));
}

#[then("the subscriber should be unbound")]
async fn then_unbound(world: &mut PubSubWorld) {
    assert_eq!(world.subscriber().channel(), None);
}

#[then(expr = "the subscriber should be bound to {string}")]
async fn then_bound_to(world: &mut PubSubWorld, channel: String) {
    assert_eq!(world.subscriber().channel(), Some(channel.as_str()));
}

#[then(expr = "{int} event(s) should be pulled")]
async fn then_pulled_count(world: &mut PubSubWorld, count: usize) {
    assert_eq!(world.pulled.len(), count);
}

#[then(expr = "pulled event {int} should have message id {string}")]
async fn then_pulled_message_id(world: &mut PubSubWorld, index: usize, message_id: String) {
    let event = &world.pulled[index - 1];
    assert_eq!(event.message_id(), Some(message_id.as_str()));
}

#[then(expr = "{int} events should have been streamed in publish order")]
async fn then_streamed_in_order(world: &mut PubSubWorld, count: usize) {
    let ids: Vec<&str> = world.streamed.iter().map(|e| e.header().id()).collect();
    let expected: Vec<String> = (1..=count).map(|i| format!("evt-{i}")).collect();
    assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());
}
