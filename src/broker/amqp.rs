//! `lapin`-backed broker adapter
//!
//! `AmqpBroker` owns one connection and one channel. For publishing the
//! channel is switched to confirm mode at connect time. Property tables are
//! converted between `lapin`'s AMQP types and the JSON shapes used by the
//! envelope.

use std::sync::Mutex;
use std::time::Duration;

use futures::FutureExt;
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicPublishOptions,
    BasicQosOptions, ConfirmSelectOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation as LapinConfirmation;
use lapin::types::{AMQPValue, FieldArray, FieldTable, LongString, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use serde_json::{Map, Number, Value};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info};

use crate::broker::{
    BrokerError, Confirmation, ConsumeChannel, DeliveryStream, PublishChannel, RawMessage,
};
use crate::codec::Properties;
use crate::topology::Route;

const REPLY_SUCCESS: u16 = 200;

pub struct AmqpBroker {
    connection: Connection,
    channel: Channel,
    errors: Mutex<Option<UnboundedReceiver<BrokerError>>>,
}

impl AmqpBroker {
    /// Connects and opens a channel, in confirm mode when `confirm` is set.
    pub async fn connect(url: &str, confirm: bool) -> Result<Self, BrokerError> {
        let connection = Connection::connect(url, ConnectionProperties::default()).await?;
        let (tx, rx) = mpsc::unbounded_channel();

        let connection_tx = tx.clone();
        connection.on_error(move |err| {
            let _ = connection_tx.send(BrokerError::Amqp(err));
        });

        let channel = connection.create_channel().await?;
        if confirm {
            channel
                .confirm_select(ConfirmSelectOptions::default())
                .await?;
        }
        channel.on_error(move |err| {
            let _ = tx.send(BrokerError::Amqp(err));
        });

        info!(confirm, "Connected to broker");

        Ok(Self {
            connection,
            channel,
            errors: Mutex::new(Some(rx)),
        })
    }

    fn take_errors(&self) -> Option<UnboundedReceiver<BrokerError>> {
        self.errors.lock().ok().and_then(|mut errors| errors.take())
    }

    async fn shutdown_channel(&self) -> Result<(), BrokerError> {
        self.channel.close(REPLY_SUCCESS, "bye").await?;
        debug!("Channel closed");
        Ok(())
    }

    async fn shutdown_connection(&self) -> Result<(), BrokerError> {
        self.connection.close(REPLY_SUCCESS, "bye").await?;
        debug!("Connection closed");
        Ok(())
    }
}

impl std::fmt::Debug for AmqpBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpBroker")
            .field("channel", &self.channel.id())
            .finish()
    }
}

impl ConsumeChannel for AmqpBroker {
    async fn check_queue(&self, queue: &str) -> Result<u32, BrokerError> {
        let options = QueueDeclareOptions {
            passive: true,
            ..QueueDeclareOptions::default()
        };
        let declared = self
            .channel
            .queue_declare(queue, options, FieldTable::default())
            .await?;
        Ok(declared.message_count())
    }

    async fn declare_temporary_queue(&self, expires: Duration) -> Result<String, BrokerError> {
        let options = QueueDeclareOptions {
            exclusive: true,
            auto_delete: true,
            durable: false,
            ..QueueDeclareOptions::default()
        };
        let expires_ms = u32::try_from(expires.as_millis()).unwrap_or(u32::MAX);
        let mut arguments = FieldTable::default();
        arguments.insert("x-expires".into(), AMQPValue::LongUInt(expires_ms));

        let declared = self.channel.queue_declare("", options, arguments).await?;
        Ok(declared.name().as_str().to_string())
    }

    async fn bind_queue(&self, queue: &str, route: &Route) -> Result<(), BrokerError> {
        self.channel
            .queue_bind(
                queue,
                &route.exchange,
                &route.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn prefetch(&self, count: u16, global: bool) -> Result<(), BrokerError> {
        self.channel
            .basic_qos(count, BasicQosOptions { global })
            .await?;
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<DeliveryStream, BrokerError> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let queue = queue.to_string();
        let consumer_tag = consumer_tag.to_string();
        let deliveries = consumer.map(move |delivery| -> Result<RawMessage, BrokerError> {
            let delivery = delivery?;
            Ok(RawMessage {
                queue: queue.clone(),
                consumer_tag: consumer_tag.clone(),
                delivery_tag: delivery.delivery_tag,
                redelivered: delivery.redelivered,
                exchange: delivery.exchange.as_str().to_string(),
                routing_key: delivery.routing_key.as_str().to_string(),
                properties: properties_from_amqp(&delivery.properties),
                body: delivery.data,
            })
        });
        Ok(deliveries.boxed())
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await?;
        Ok(())
    }

    async fn ack_all(&self) -> Result<(), BrokerError> {
        // Tag 0 with `multiple` covers every unacknowledged delivery.
        self.channel
            .basic_ack(0, BasicAckOptions { multiple: true })
            .await?;
        Ok(())
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<(), BrokerError> {
        self.channel
            .basic_cancel(consumer_tag, BasicCancelOptions::default())
            .await?;
        Ok(())
    }

    async fn close_channel(&self) -> Result<(), BrokerError> {
        self.shutdown_channel().await
    }

    async fn close_connection(&self) -> Result<(), BrokerError> {
        self.shutdown_connection().await
    }

    fn error_events(&self) -> Option<UnboundedReceiver<BrokerError>> {
        self.take_errors()
    }
}

impl PublishChannel for AmqpBroker {
    async fn publish(
        &self,
        route: &Route,
        payload: Vec<u8>,
        properties: &Properties,
    ) -> Result<Confirmation, BrokerError> {
        let pending = self
            .channel
            .basic_publish(
                &route.exchange,
                &route.routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties_to_amqp(properties),
            )
            .await?;

        Ok(async move {
            match pending.await? {
                LapinConfirmation::Nack(_) => Err(BrokerError::Nacked),
                LapinConfirmation::Ack(_) | LapinConfirmation::NotRequested => Ok(()),
            }
        }
        .boxed())
    }

    async fn close_channel(&self) -> Result<(), BrokerError> {
        self.shutdown_channel().await
    }

    async fn close_connection(&self) -> Result<(), BrokerError> {
        self.shutdown_connection().await
    }

    fn error_events(&self) -> Option<UnboundedReceiver<BrokerError>> {
        self.take_errors()
    }
}

fn short(value: &Option<ShortString>) -> Option<String> {
    value.as_ref().map(|s| s.as_str().to_string())
}

pub(crate) fn properties_from_amqp(props: &BasicProperties) -> Properties {
    Properties {
        content_type: short(props.content_type()),
        content_encoding: short(props.content_encoding()),
        headers: props.headers().as_ref().map(table_to_json),
        delivery_mode: *props.delivery_mode(),
        priority: *props.priority(),
        correlation_id: short(props.correlation_id()),
        reply_to: short(props.reply_to()),
        expiration: short(props.expiration()),
        message_id: short(props.message_id()),
        timestamp: *props.timestamp(),
        kind: short(props.kind()),
        user_id: short(props.user_id()),
        app_id: short(props.app_id()),
        cluster_id: short(props.cluster_id()),
        extra: Map::new(),
    }
}

pub(crate) fn properties_to_amqp(props: &Properties) -> BasicProperties {
    let mut out = BasicProperties::default();
    if let Some(v) = &props.content_type {
        out = out.with_content_type(v.as_str().into());
    }
    if let Some(v) = &props.content_encoding {
        out = out.with_content_encoding(v.as_str().into());
    }
    if let Some(v) = &props.headers {
        out = out.with_headers(json_to_table(v));
    }
    if let Some(v) = props.delivery_mode {
        out = out.with_delivery_mode(v);
    }
    if let Some(v) = props.priority {
        out = out.with_priority(v);
    }
    if let Some(v) = &props.correlation_id {
        out = out.with_correlation_id(v.as_str().into());
    }
    if let Some(v) = &props.reply_to {
        out = out.with_reply_to(v.as_str().into());
    }
    if let Some(v) = &props.expiration {
        out = out.with_expiration(v.as_str().into());
    }
    if let Some(v) = &props.message_id {
        out = out.with_message_id(v.as_str().into());
    }
    if let Some(v) = props.timestamp {
        out = out.with_timestamp(v);
    }
    if let Some(v) = &props.kind {
        out = out.with_type(v.as_str().into());
    }
    if let Some(v) = &props.user_id {
        out = out.with_user_id(v.as_str().into());
    }
    if let Some(v) = &props.app_id {
        out = out.with_app_id(v.as_str().into());
    }
    if let Some(v) = &props.cluster_id {
        out = out.with_cluster_id(v.as_str().into());
    }
    out
}

fn table_to_json(table: &FieldTable) -> Map<String, Value> {
    table
        .inner()
        .iter()
        .map(|(key, value)| (key.as_str().to_string(), amqp_to_json(value)))
        .collect()
}

fn amqp_to_json(value: &AMQPValue) -> Value {
    match value {
        AMQPValue::Boolean(b) => Value::Bool(*b),
        AMQPValue::ShortShortInt(n) => Value::from(*n),
        AMQPValue::ShortShortUInt(n) => Value::from(*n),
        AMQPValue::ShortInt(n) => Value::from(*n),
        AMQPValue::ShortUInt(n) => Value::from(*n),
        AMQPValue::LongInt(n) => Value::from(*n),
        AMQPValue::LongUInt(n) => Value::from(*n),
        AMQPValue::LongLongInt(n) => Value::from(*n),
        AMQPValue::Timestamp(n) => Value::from(*n),
        AMQPValue::Float(f) => float(f64::from(*f)),
        AMQPValue::Double(f) => float(*f),
        AMQPValue::DecimalValue(d) => float(f64::from(d.value) / 10f64.powi(i32::from(d.scale))),
        AMQPValue::ShortString(s) => Value::String(s.as_str().to_string()),
        AMQPValue::LongString(s) => Value::String(String::from_utf8_lossy(s.as_bytes()).into_owned()),
        AMQPValue::FieldArray(items) => {
            Value::Array(items.as_slice().iter().map(amqp_to_json).collect())
        }
        AMQPValue::FieldTable(table) => Value::Object(table_to_json(table)),
        AMQPValue::ByteArray(bytes) => {
            Value::Array(bytes.as_slice().iter().copied().map(Value::from).collect())
        }
        AMQPValue::Void => Value::Null,
    }
}

fn float(f: f64) -> Value {
    Number::from_f64(f).map_or(Value::Null, Value::Number)
}

fn json_to_table(map: &Map<String, Value>) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in map {
        table.insert(key.as_str().into(), json_to_amqp(value));
    }
    table
}

fn json_to_amqp(value: &Value) -> AMQPValue {
    match value {
        Value::Null => AMQPValue::Void,
        Value::Bool(b) => AMQPValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => AMQPValue::LongLongInt(i),
            None => AMQPValue::Double(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => AMQPValue::LongString(LongString::from(s.as_str())),
        Value::Array(items) => AMQPValue::FieldArray(FieldArray::from(
            items.iter().map(json_to_amqp).collect::<Vec<_>>(),
        )),
        Value::Object(map) => AMQPValue::FieldTable(json_to_table(map)),
    }
}
