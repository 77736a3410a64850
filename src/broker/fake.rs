//! In-memory broker used by session tests. Records every call and replays
//! preloaded deliveries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

use crate::broker::{
    BrokerError, Confirmation, ConsumeChannel, DeliveryStream, PublishChannel, RawMessage,
};
use crate::codec::Properties;
use crate::topology::Route;

pub const TEMPORARY_QUEUE: &str = "amq.gen-test";

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CheckQueue(String),
    DeclareTemporary(Duration),
    Bind(String, Route),
    Prefetch(u16, bool),
    Consume(String, String),
    Ack(u64),
    AckAll,
    Cancel(String),
    Publish(Route),
    CloseChannel,
    CloseConnection,
}

#[derive(Debug, Clone)]
pub struct Published {
    pub route: Route,
    pub payload: Vec<u8>,
    pub properties: Properties,
}

#[derive(Default)]
struct State {
    queue_counts: HashMap<String, u32>,
    deliveries: HashMap<String, Vec<RawMessage>>,
    end_streams: bool,
    hold_confirms: bool,
    hang_close: bool,
    held: Vec<oneshot::Sender<Result<(), BrokerError>>>,
    calls: Vec<Call>,
    published: Vec<Published>,
}

#[derive(Clone)]
pub struct FakeBroker {
    state: Arc<Mutex<State>>,
    errors_tx: UnboundedSender<BrokerError>,
    errors_rx: Arc<Mutex<Option<UnboundedReceiver<BrokerError>>>>,
}

impl FakeBroker {
    pub fn new() -> Self {
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(Mutex::new(State::default())),
            errors_tx,
            errors_rx: Arc::new(Mutex::new(Some(errors_rx))),
        }
    }

    pub fn with_queue(self, queue: &str, message_count: u32) -> Self {
        self.state
            .lock()
            .unwrap()
            .queue_counts
            .insert(queue.to_string(), message_count);
        self
    }

    pub fn with_deliveries(self, queue: &str, messages: Vec<RawMessage>) -> Self {
        self.state
            .lock()
            .unwrap()
            .deliveries
            .insert(queue.to_string(), messages);
        self
    }

    /// Subscriptions end after their preloaded deliveries instead of idling.
    pub fn ending_streams(self) -> Self {
        self.state.lock().unwrap().end_streams = true;
        self
    }

    /// Publish confirmations stay pending until `release_confirms`.
    pub fn holding_confirms(self) -> Self {
        self.state.lock().unwrap().hold_confirms = true;
        self
    }

    /// `close_channel` is recorded but never completes.
    pub fn hanging_close(self) -> Self {
        self.state.lock().unwrap().hang_close = true;
        self
    }

    pub fn release_confirms(&self) {
        let held = std::mem::take(&mut self.state.lock().unwrap().held);
        for sender in held {
            let _ = sender.send(Ok(()));
        }
    }

    pub fn reject_confirms(&self) {
        let held = std::mem::take(&mut self.state.lock().unwrap().held);
        for sender in held {
            let _ = sender.send(Err(BrokerError::Nacked));
        }
    }

    pub fn raise_error(&self, message: &str) {
        let _ = self.errors_tx.send(BrokerError::Other(message.to_string()));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn published(&self) -> Vec<Published> {
        self.state.lock().unwrap().published.clone()
    }

    pub fn has_call(&self, call: &Call) -> bool {
        self.calls().contains(call)
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.record(Call::CloseChannel);
        let hang = self.state.lock().unwrap().hang_close;
        if hang {
            futures::future::pending::<()>().await;
        }
        Ok(())
    }

    fn take_errors(&self) -> Option<UnboundedReceiver<BrokerError>> {
        self.errors_rx.lock().unwrap().take()
    }
}

pub fn delivery(queue: &str, delivery_tag: u64, body: &str) -> RawMessage {
    RawMessage {
        queue: queue.to_string(),
        consumer_tag: String::new(),
        delivery_tag,
        redelivered: false,
        exchange: "amq.topic".to_string(),
        routing_key: format!("{queue}.key"),
        properties: Properties {
            content_type: Some("application/json".to_string()),
            ..Properties::default()
        },
        body: body.as_bytes().to_vec(),
    }
}

impl ConsumeChannel for FakeBroker {
    async fn check_queue(&self, queue: &str) -> Result<u32, BrokerError> {
        self.record(Call::CheckQueue(queue.to_string()));
        self.state
            .lock()
            .unwrap()
            .queue_counts
            .get(queue)
            .copied()
            .ok_or_else(|| BrokerError::Other(format!("NOT_FOUND - no queue '{queue}'")))
    }

    async fn declare_temporary_queue(&self, expires: Duration) -> Result<String, BrokerError> {
        self.record(Call::DeclareTemporary(expires));
        Ok(TEMPORARY_QUEUE.to_string())
    }

    async fn bind_queue(&self, queue: &str, route: &Route) -> Result<(), BrokerError> {
        self.record(Call::Bind(queue.to_string(), route.clone()));
        Ok(())
    }

    async fn prefetch(&self, count: u16, global: bool) -> Result<(), BrokerError> {
        self.record(Call::Prefetch(count, global));
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<DeliveryStream, BrokerError> {
        self.record(Call::Consume(queue.to_string(), consumer_tag.to_string()));
        let (messages, end) = {
            let mut state = self.state.lock().unwrap();
            let messages = state.deliveries.remove(queue).unwrap_or_default();
            (messages, state.end_streams)
        };

        let tag = consumer_tag.to_string();
        let head = stream::iter(messages.into_iter().map(move |mut message| {
            message.consumer_tag = tag.clone();
            Ok(message)
        }));
        if end {
            Ok(head.boxed())
        } else {
            Ok(head.chain(stream::pending()).boxed())
        }
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.record(Call::Ack(delivery_tag));
        Ok(())
    }

    async fn ack_all(&self) -> Result<(), BrokerError> {
        self.record(Call::AckAll);
        Ok(())
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<(), BrokerError> {
        self.record(Call::Cancel(consumer_tag.to_string()));
        Ok(())
    }

    async fn close_channel(&self) -> Result<(), BrokerError> {
        self.close().await
    }

    async fn close_connection(&self) -> Result<(), BrokerError> {
        self.record(Call::CloseConnection);
        Ok(())
    }

    fn error_events(&self) -> Option<UnboundedReceiver<BrokerError>> {
        self.take_errors()
    }
}

impl PublishChannel for FakeBroker {
    async fn publish(
        &self,
        route: &Route,
        payload: Vec<u8>,
        properties: &Properties,
    ) -> Result<Confirmation, BrokerError> {
        self.record(Call::Publish(route.clone()));
        let mut state = self.state.lock().unwrap();
        state.published.push(Published {
            route: route.clone(),
            payload,
            properties: properties.clone(),
        });

        if !state.hold_confirms {
            return Ok(futures::future::ready(Ok(())).boxed());
        }

        let (tx, rx) = oneshot::channel();
        state.held.push(tx);
        Ok(async move {
            rx.await
                .unwrap_or_else(|_| Err(BrokerError::Other("confirmation dropped".into())))
        }
        .boxed())
    }

    async fn close_channel(&self) -> Result<(), BrokerError> {
        self.close().await
    }

    async fn close_connection(&self) -> Result<(), BrokerError> {
        self.record(Call::CloseConnection);
        Ok(())
    }

    fn error_events(&self) -> Option<UnboundedReceiver<BrokerError>> {
        self.take_errors()
    }
}
