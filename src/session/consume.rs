//! Consume session
//!
//! Lifecycle: `Connecting → Checking → (Binding) → Consuming → Draining →
//! Closed`.
//!
//! - Checking inspects every named queue and enforces the optional minimum.
//! - Binding declares one temporary queue and binds it to every exchange
//!   binding, so it can be consumed like a named queue.
//! - Consuming subscribes to every queue under a consumer tag generated
//!   here, before the subscribe call, because deliveries may arrive before
//!   the broker confirms the subscription.
//! - Draining cancels the subscriptions, acknowledges in bulk when a maximum
//!   was set, waits for the acknowledgement to reach the broker and closes.
//!
//! Without a maximum each message is acknowledged right after it is written.
//! With a maximum the broker holds the prefetched messages unacknowledged
//! until the drain.

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use futures::stream::{self, Stream};
use futures_util::StreamExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::broker::{BrokerError, ConsumeChannel};
use crate::codec::Envelope;
use crate::session::guard::{Guard, InterruptAction, Interruptible, handle_signal};
use crate::session::output::OutputWriter;
use crate::session::{SessionError, Signal};
use crate::topology::Specification;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeState {
    Connecting,
    Checking,
    Binding,
    Consuming,
    Draining,
    Closed,
}

#[derive(Debug, Clone)]
pub struct ConsumeOptions {
    pub specification: Specification,
    pub min: Option<u64>,
    pub max: Option<u64>,
    pub indent: usize,
    pub queue_expiry: Duration,
    pub ack_flush_delay: Duration,
}

/// What to do with one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryAction {
    pub emit: bool,
    pub ack_now: bool,
    pub limit_reached: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeReport {
    pub received: u64,
    pub emitted: u64,
}

#[derive(Debug)]
pub struct ConsumeSession {
    state: ConsumeState,
    counter: u64,
    max: Option<u64>,
    consumer_tags: Vec<String>,
    interrupts_received: u32,
}

impl Interruptible for ConsumeSession {
    fn on_interrupt(&mut self) -> InterruptAction {
        self.interrupts_received += 1;
        if self.interrupts_received > 1 {
            InterruptAction::ForceQuit
        } else {
            InterruptAction::WindDown
        }
    }
}

impl ConsumeSession {
    pub fn new(max: Option<u64>) -> Self {
        Self {
            state: ConsumeState::Connecting,
            counter: 0,
            max,
            consumer_tags: Vec::new(),
            interrupts_received: 0,
        }
    }

    pub fn state(&self) -> ConsumeState {
        self.state
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn consumer_tags(&self) -> &[String] {
        &self.consumer_tags
    }

    pub fn interrupted(&self) -> bool {
        self.interrupts_received > 0
    }

    /// Acknowledgements are deferred to the drain when a maximum is set.
    pub fn manual_ack(&self) -> bool {
        self.max.is_some()
    }

    pub fn transition(&mut self, next: ConsumeState) {
        debug!(from = ?self.state, to = ?next, "Consume session transition");
        self.state = next;
    }

    /// Generates and records the tag for the next subscription.
    pub fn register_consumer(&mut self) -> String {
        let tag = format!("amqp-json-{}", Uuid::new_v4());
        self.consumer_tags.push(tag.clone());
        tag
    }

    /// Counts a delivery. The counter moves on every call, also past the
    /// maximum, so the delivery that reaches it exactly is recognized.
    pub fn on_delivery(&mut self) -> DeliveryAction {
        let emit = self.max.is_none_or(|max| self.counter < max);
        self.counter += 1;
        DeliveryAction {
            emit,
            ack_now: emit && !self.manual_ack(),
            limit_reached: self.max == Some(self.counter),
        }
    }
}

/// Validates the configured minimum against the messages already waiting in
/// the named queues.
pub fn check_minimum(
    min: u64,
    max: Option<u64>,
    has_bindings: bool,
    available: u64,
) -> Result<(), SessionError> {
    if has_bindings {
        return Err(SessionError::MinimumWithBindings);
    }
    if let Some(max) = max.filter(|&max| min > max) {
        return Err(SessionError::MinimumExceedsMaximum { min, max });
    }
    if available < min {
        return Err(SessionError::NotEnoughMessages { available, min });
    }
    Ok(())
}

/// Runs a consume session to completion, writing one envelope per emitted
/// message to `out`.
///
/// A first signal during setup lets the current step finish, then skips
/// straight to the drain. A second signal at any point is fatal.
pub async fn run_consume<B, C, W, S>(
    connect: C,
    options: ConsumeOptions,
    out: W,
    signals: S,
) -> Result<ConsumeReport, SessionError>
where
    B: ConsumeChannel,
    C: Future<Output = Result<B, BrokerError>>,
    W: Write,
    S: Stream<Item = Signal> + Unpin,
{
    let spec = &options.specification;
    if spec.is_empty() {
        return Err(SessionError::NothingToConsume);
    }

    let mut session = ConsumeSession::new(options.max);
    let mut guard = Guard::new(signals);
    let broker = guard.run(&mut session, connect).await?;
    guard.watch_errors(broker.error_events());

    session.transition(ConsumeState::Checking);
    let mut available: u64 = 0;
    for queue in &spec.queues {
        let count = guard.run(&mut session, broker.check_queue(queue)).await?;
        debug!(queue = %queue, count, "Checked queue");
        available += u64::from(count);
    }
    if let Some(min) = options.min {
        check_minimum(min, options.max, !spec.bindings.is_empty(), available)?;
    }

    let mut queues = spec.queues.clone();
    if !spec.bindings.is_empty() {
        session.transition(ConsumeState::Binding);
        let queue = guard
            .run(&mut session, broker.declare_temporary_queue(options.queue_expiry))
            .await?;
        for route in &spec.bindings {
            guard.run(&mut session, broker.bind_queue(&queue, route)).await?;
            info!(
                queue = %queue,
                exchange = %route.exchange,
                routing_key = %route.routing_key,
                "Bound temporary queue"
            );
        }
        queues.push(queue);
    }

    let mut output = OutputWriter::new(out, options.indent);
    session.transition(ConsumeState::Consuming);

    if options.max != Some(0) && !session.interrupted() {
        if let Some(max) = options.max {
            let count = u16::try_from(max).unwrap_or(u16::MAX);
            guard.run(&mut session, broker.prefetch(count, true)).await?;
        }

        let mut subscriptions = Vec::with_capacity(queues.len());
        for queue in &queues {
            let tag = session.register_consumer();
            subscriptions.push(guard.run(&mut session, broker.consume(queue, &tag)).await?);
            info!(queue = %queue, consumer_tag = %tag, "Subscribed");
        }
        let mut deliveries = stream::select_all(subscriptions);

        while !session.interrupted() {
            tokio::select! {
                biased;

                Some(err) = guard.errors.recv() => return Err(err.into()),

                Some(signal) = guard.signals.next() => {
                    handle_signal(&mut session, signal)?;
                }

                delivery = deliveries.next() => {
                    let Some(delivery) = delivery else {
                        info!("All subscriptions ended, draining");
                        break;
                    };
                    let message = delivery?;
                    let action = session.on_delivery();

                    if action.emit {
                        let delivery_tag = message.delivery_tag;
                        output.write(&Envelope::from_delivery(message))?;
                        if action.ack_now {
                            guard.run(&mut session, broker.ack(delivery_tag)).await?;
                        }
                    } else {
                        debug!(delivery_tag = message.delivery_tag, "Maximum reached, not emitting");
                    }

                    if action.limit_reached {
                        info!(count = session.counter(), "Maximum message count reached, draining");
                        break;
                    }
                }
            }
        }
    }

    let emitted = output.emitted();
    output.finish()?;

    session.transition(ConsumeState::Draining);
    for tag in session.consumer_tags().to_vec() {
        guard.run(&mut session, broker.cancel(&tag)).await?;
    }
    if session.manual_ack() && session.counter() > 0 {
        guard.run(&mut session, broker.ack_all()).await?;
    }
    if !options.ack_flush_delay.is_zero() {
        let flush = async {
            tokio::time::sleep(options.ack_flush_delay).await;
            Ok::<(), BrokerError>(())
        };
        guard.run(&mut session, flush).await?;
    }
    guard.run(&mut session, broker.close_channel()).await?;
    guard.run(&mut session, broker.close_connection()).await?;
    session.transition(ConsumeState::Closed);

    Ok(ConsumeReport {
        received: session.counter(),
        emitted,
    })
}
