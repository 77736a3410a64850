//! The `broker` module is the seam between the sessions and the AMQP client.
//!
//! Sessions only talk to the [`ConsumeChannel`] and [`PublishChannel`]
//! traits. [`AmqpBroker`] implements both on top of `lapin`; tests use an
//! in-memory fake.
//!
//! Asynchronous error events raised by the connection or the channel are
//! forwarded into an unbounded channel handed out once by `error_events`.
//! Receiving anything on it is fatal for the session.

pub mod amqp;

#[cfg(test)]
pub(crate) mod fake;

use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::codec::Properties;
use crate::topology::Route;

pub use amqp::AmqpBroker;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("broker rejected a published message")]
    Nacked,

    #[error("{0}")]
    Other(String),
}

/// One delivery as received from a subscription, before decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    pub queue: String,
    pub consumer_tag: String,
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
    pub properties: Properties,
    pub body: Vec<u8>,
}

pub type DeliveryStream = BoxStream<'static, Result<RawMessage, BrokerError>>;

/// Resolves once the broker has confirmed a published message.
pub type Confirmation = BoxFuture<'static, Result<(), BrokerError>>;

/// Broker calls issued by a consume session.
#[allow(async_fn_in_trait)]
pub trait ConsumeChannel {
    /// Returns the number of ready messages in an existing queue.
    async fn check_queue(&self, queue: &str) -> Result<u32, BrokerError>;

    /// Declares an exclusive, auto-deleting, non-durable queue with a
    /// server-generated name that expires after `expires` of disuse.
    async fn declare_temporary_queue(&self, expires: Duration) -> Result<String, BrokerError>;

    async fn bind_queue(&self, queue: &str, route: &Route) -> Result<(), BrokerError>;

    async fn prefetch(&self, count: u16, global: bool) -> Result<(), BrokerError>;

    /// Subscribes to `queue` with a tag chosen by the caller. Deliveries
    /// require explicit acknowledgement.
    async fn consume(&self, queue: &str, consumer_tag: &str)
    -> Result<DeliveryStream, BrokerError>;

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError>;

    /// Acknowledges every outstanding delivery on the channel.
    async fn ack_all(&self) -> Result<(), BrokerError>;

    async fn cancel(&self, consumer_tag: &str) -> Result<(), BrokerError>;

    async fn close_channel(&self) -> Result<(), BrokerError>;

    async fn close_connection(&self) -> Result<(), BrokerError>;

    /// Takes the error event receiver. Later calls get `None`.
    fn error_events(&self) -> Option<UnboundedReceiver<BrokerError>>;
}

/// Broker calls issued by a publish session on a confirm channel.
#[allow(async_fn_in_trait)]
pub trait PublishChannel {
    /// Sends one message and returns the pending broker confirmation.
    async fn publish(
        &self,
        route: &Route,
        payload: Vec<u8>,
        properties: &Properties,
    ) -> Result<Confirmation, BrokerError>;

    async fn close_channel(&self) -> Result<(), BrokerError>;

    async fn close_connection(&self) -> Result<(), BrokerError>;

    fn error_events(&self) -> Option<UnboundedReceiver<BrokerError>>;
}
