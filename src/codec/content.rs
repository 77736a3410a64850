use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use tracing::debug;

use crate::codec::envelope::Properties;

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const OCTET_STREAM_CONTENT_TYPE: &str = "application/octet-stream";

/// Encoding stamped on every published body.
pub const PUBLISH_CONTENT_ENCODING: &str = "utf-8";

/// The encoding a decoded body is expressed in, as recorded back into
/// `contentEncoding`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentEncoding {
    Utf8,
    Ascii,
    Hex,
    Base64,
    /// Base64 of a body whose declared encoding was not recognized. Keeps
    /// the declared value so it can be traced.
    TaggedBase64(String),
}

impl fmt::Display for ContentEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentEncoding::Utf8 => f.write_str("utf8"),
            ContentEncoding::Ascii => f.write_str("ascii"),
            ContentEncoding::Hex => f.write_str("hex"),
            ContentEncoding::Base64 => f.write_str("base64"),
            ContentEncoding::TaggedBase64(tag) => write!(f, "base64,{tag}"),
        }
    }
}

/// Lower-cases an encoding name and drops everything but ASCII letters and
/// digits, so `UTF-8`, `utf_8` and `utf8` compare equal.
pub fn normalize_encoding(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Decodes a message body into a JSON value.
///
/// `properties.content_encoding` is overwritten with the encoding of the
/// returned text, and a missing `content_type` becomes
/// `application/octet-stream`. Bodies declared as JSON that fail to parse are
/// returned as plain strings.
pub fn decode_content(body: &[u8], properties: &mut Properties) -> Value {
    let (text, encoding) = decode_text(
        body,
        properties.content_type.as_deref(),
        properties.content_encoding.as_deref(),
    );
    properties.content_encoding = Some(encoding.to_string());

    match properties.content_type.as_deref() {
        Some(content_type) if is_json(content_type) => match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                debug!("Body declared as JSON did not parse, keeping text: {e}");
                Value::String(text)
            }
        },
        Some(_) => Value::String(text),
        None => {
            properties.content_type = Some(OCTET_STREAM_CONTENT_TYPE.to_string());
            Value::String(text)
        }
    }
}

/// Serializes an outgoing value as compact JSON and marks the properties
/// accordingly.
pub fn encode_content(
    value: &Value,
    properties: &mut Properties,
) -> Result<Vec<u8>, serde_json::Error> {
    let payload = serde_json::to_vec(value)?;
    properties.content_type = Some(JSON_CONTENT_TYPE.to_string());
    properties.content_encoding = Some(PUBLISH_CONTENT_ENCODING.to_string());
    Ok(payload)
}

fn decode_text(
    body: &[u8],
    content_type: Option<&str>,
    content_encoding: Option<&str>,
) -> (String, ContentEncoding) {
    let declared = content_encoding.unwrap_or_default();

    if declared.is_empty()
        && content_type.is_some_and(|t| t.to_ascii_lowercase().starts_with(JSON_CONTENT_TYPE))
    {
        return (utf8(body), ContentEncoding::Utf8);
    }

    match normalize_encoding(declared).as_str() {
        "hex" => (latin1(body), ContentEncoding::Hex),
        "ascii" => (latin1(body), ContentEncoding::Ascii),
        "utf8" => (utf8(body), ContentEncoding::Utf8),
        "utf16le" | "ucs2" => (utf16le(body), ContentEncoding::Utf8),
        "binary" => (STANDARD.encode(body), ContentEncoding::Base64),
        "base64" => (latin1(body), ContentEncoding::Base64),
        _ if declared.is_empty() => (STANDARD.encode(body), ContentEncoding::Base64),
        _ => (
            STANDARD.encode(body),
            ContentEncoding::TaggedBase64(declared.to_string()),
        ),
    }
}

fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(JSON_CONTENT_TYPE))
}

fn utf8(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}

// One char per byte, so the original bytes can always be recovered.
fn latin1(body: &[u8]) -> String {
    body.iter().copied().map(char::from).collect()
}

fn utf16le(body: &[u8]) -> String {
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}
