//! Publish session
//!
//! Lifecycle: `Connecting → Reading → Draining → Closed`, or `ForcedQuit`.
//!
//! Input values are published as soon as the ingestion decoder yields them.
//! Every value counts as one outstanding confirmation until all of its route
//! publishes are confirmed. Draining starts only once input has ended and no
//! confirmation is outstanding. The first signal, whenever it arrives, stops
//! reading input; the second one aborts without draining.

use std::future::Future;

use futures::future::{TryJoinAll, try_join_all};
use futures::stream::{FuturesUnordered, Stream};
use futures_util::StreamExt;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use crate::broker::{BrokerError, Confirmation, PublishChannel};
use crate::codec::{Properties, encode_content};
use crate::ingest::IngestDecoder;
use crate::session::guard::{Guard, InterruptAction, Interruptible, handle_signal};
use crate::session::{SessionError, Signal};
use crate::topology::Route;

const READ_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    Connecting,
    Reading,
    Draining,
    Closed,
    ForcedQuit,
}

#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// Destinations given on the command line.
    pub routes: Vec<Route>,
    /// Correlation id for values that do not carry their own.
    pub correlation_id: String,
    /// Do not derive a destination from the envelope's own metadata.
    pub ignore_metadata: bool,
    /// Derive the destination from the envelope's `queue` instead of its
    /// `fields`.
    pub queue_mode: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub published: u64,
    pub confirmed: u64,
    pub skipped: u64,
}

/// A value ready to hand to the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub payload: Vec<u8>,
    pub properties: Properties,
    pub routes: Vec<Route>,
}

#[derive(Debug)]
pub struct PublishSession {
    state: PublishState,
    waiting_for_confirm: usize,
    waiting_for_data: bool,
    interrupts_received: u32,
}

impl Default for PublishSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PublishSession {
    pub fn new() -> Self {
        Self {
            state: PublishState::Connecting,
            waiting_for_confirm: 0,
            waiting_for_data: true,
            interrupts_received: 0,
        }
    }

    pub fn state(&self) -> PublishState {
        self.state
    }

    pub fn waiting_for_confirm(&self) -> usize {
        self.waiting_for_confirm
    }

    pub fn waiting_for_data(&self) -> bool {
        self.waiting_for_data
    }

    pub fn transition(&mut self, next: PublishState) {
        debug!(from = ?self.state, to = ?next, "Publish session transition");
        self.state = next;
    }

    pub fn begin_publish(&mut self) {
        self.waiting_for_confirm += 1;
    }

    pub fn on_confirmed(&mut self) {
        self.waiting_for_confirm = self.waiting_for_confirm.saturating_sub(1);
    }

    pub fn on_input_end(&mut self) {
        self.waiting_for_data = false;
    }

    pub fn interrupted(&self) -> bool {
        self.interrupts_received > 0
    }

    /// Input is over and every publish has been confirmed.
    pub fn ready_to_drain(&self) -> bool {
        self.state == PublishState::Reading && !self.waiting_for_data && self.waiting_for_confirm == 0
    }
}

impl Interruptible for PublishSession {
    /// The first interrupt stops reading input; the second one quits.
    fn on_interrupt(&mut self) -> InterruptAction {
        self.interrupts_received += 1;
        if self.interrupts_received > 1 {
            self.transition(PublishState::ForcedQuit);
            InterruptAction::ForceQuit
        } else {
            self.waiting_for_data = false;
            InterruptAction::WindDown
        }
    }
}

/// Turns one input value into its payload, properties and destinations.
///
/// A value with a truthy `content` next to `fields` or `properties` is an
/// envelope: only its content is published, with its properties, and it may
/// contribute its own destination.
pub fn prepare(value: &Value, options: &PublishOptions) -> Result<Outgoing, SessionError> {
    let envelope = is_envelope(value);

    let (content, mut properties) = if envelope {
        let properties = match value.get("properties") {
            Some(props @ Value::Object(_)) => serde_json::from_value(props.clone())?,
            _ => Properties::default(),
        };
        (&value["content"], properties)
    } else {
        (value, Properties::default())
    };

    let payload = encode_content(content, &mut properties)?;

    if properties.correlation_id.is_none() && !options.correlation_id.is_empty() {
        properties.correlation_id = Some(options.correlation_id.clone());
    }

    let mut routes = options.routes.clone();
    if envelope && !options.ignore_metadata {
        if let Some(route) = envelope_route(value, options.queue_mode) {
            if !routes.contains(&route) {
                routes.push(route);
            }
        }
    }

    Ok(Outgoing {
        payload,
        properties,
        routes,
    })
}

fn is_envelope(value: &Value) -> bool {
    value.get("content").is_some_and(is_truthy)
        && (value.get("fields").is_some() || value.get("properties").is_some())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn envelope_route(value: &Value, queue_mode: bool) -> Option<Route> {
    if queue_mode {
        return value
            .get("queue")
            .and_then(Value::as_str)
            .map(Route::to_queue);
    }

    let fields = value.get("fields")?.as_object()?;
    let exchange = fields.get("exchange").and_then(Value::as_str);
    let routing_key = fields.get("routingKey").and_then(Value::as_str);
    if exchange.is_none() && routing_key.is_none() {
        return None;
    }
    Some(Route::new(
        exchange.unwrap_or_default(),
        routing_key.unwrap_or_default(),
    ))
}

type PendingConfirms = FuturesUnordered<TryJoinAll<Confirmation>>;

/// Runs a publish session until input is exhausted and every publish is
/// confirmed, or until a second signal forces it to quit.
pub async fn run_publish<B, C, R, S>(
    connect: C,
    options: PublishOptions,
    mut input: R,
    signals: S,
) -> Result<PublishReport, SessionError>
where
    B: PublishChannel,
    C: Future<Output = Result<B, BrokerError>>,
    R: AsyncRead + Unpin,
    S: Stream<Item = Signal> + Unpin,
{
    let mut session = PublishSession::new();
    let mut guard = Guard::new(signals);
    let broker = guard.run(&mut session, connect).await?;
    guard.watch_errors(broker.error_events());

    session.transition(PublishState::Reading);
    let mut decoder = IngestDecoder::new();
    let mut pending = PendingConfirms::new();
    let mut buffer = vec![0u8; READ_CHUNK_SIZE];
    let mut report = PublishReport::default();

    while !session.ready_to_drain() {
        tokio::select! {
            biased;

            Some(err) = guard.errors.recv() => return Err(err.into()),

            Some(signal) = guard.signals.next() => {
                handle_signal(&mut session, signal)?;
                info!(
                    outstanding = session.waiting_for_confirm(),
                    "No longer reading input"
                );
            }

            Some(confirmed) = pending.next() => {
                confirmed?;
                session.on_confirmed();
                report.confirmed += 1;
            }

            read = input.read(&mut buffer), if session.waiting_for_data() => {
                let read = read?;
                let values = if read == 0 {
                    session.on_input_end();
                    debug!(outstanding = session.waiting_for_confirm(), "Input ended");
                    decoder.finish()?
                } else {
                    decoder.feed(&buffer[..read])?
                };

                for value in values {
                    if session.interrupted() {
                        break;
                    }
                    let outgoing = prepare(&value, &options)?;
                    if outgoing.routes.is_empty() {
                        warn!("Message has no destination, skipping");
                        report.skipped += 1;
                        continue;
                    }
                    session.begin_publish();
                    let confirmations = dispatch(&broker, outgoing, &mut guard, &mut session).await?;
                    pending.push(try_join_all(confirmations));
                    report.published += 1;
                }
            }
        }
    }

    session.transition(PublishState::Draining);
    guard.run(&mut session, broker.close_channel()).await?;
    guard.run(&mut session, broker.close_connection()).await?;

    session.transition(PublishState::Closed);
    info!(
        published = report.published,
        skipped = report.skipped,
        "Publish session closed"
    );
    Ok(report)
}

/// Publishes one value to each of its routes. Signals keep being counted
/// while the frames go out.
async fn dispatch<B, S>(
    broker: &B,
    outgoing: Outgoing,
    guard: &mut Guard<S>,
    session: &mut PublishSession,
) -> Result<Vec<Confirmation>, SessionError>
where
    B: PublishChannel,
    S: Stream<Item = Signal> + Unpin,
{
    let mut confirmations = Vec::with_capacity(outgoing.routes.len());
    for route in &outgoing.routes {
        let publish = broker.publish(route, outgoing.payload.clone(), &outgoing.properties);
        confirmations.push(guard.run(&mut *session, publish).await?);
    }
    Ok(confirmations)
}
