//! Envelope definitions
//!
//! `Envelope` is the JSON shape of one message: delivery metadata, AMQP
//! properties and the decoded body. `consume` writes it, `publish` reads it
//! back. Field names follow the camelCase convention of the wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::broker::RawMessage;
use crate::codec::content::decode_content;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub date: DateTime<Utc>,
    pub queue: String,
    pub fields: Fields,
    pub properties: Properties,
    pub content: Value,
}

impl Envelope {
    /// Builds the envelope for a delivery, decoding its body. The properties
    /// are updated to describe the decoded content.
    pub fn from_delivery(message: RawMessage) -> Self {
        let RawMessage {
            queue,
            consumer_tag,
            delivery_tag,
            redelivered,
            exchange,
            routing_key,
            mut properties,
            body,
        } = message;

        let content = decode_content(&body, &mut properties);

        Self {
            date: Utc::now(),
            queue,
            fields: Fields {
                consumer_tag,
                delivery_tag,
                redelivered,
                exchange,
                routing_key,
            },
            properties,
            content,
        }
    }
}

/// Delivery metadata assigned by the broker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fields {
    #[serde(default)]
    pub consumer_tag: String,
    #[serde(default)]
    pub delivery_tag: u64,
    #[serde(default)]
    pub redelivered: bool,
    #[serde(default)]
    pub exchange: String,
    #[serde(default)]
    pub routing_key: String,
}

/// AMQP basic properties. Absent values are left out of the JSON; keys this
/// type does not know survive a read/write cycle through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Properties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_mode: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
