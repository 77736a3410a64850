//! The `codec` module converts message bodies between the bytes a broker
//! carries and the JSON values written to or read from standard streams.
//!
//! Decoding is driven by the `contentType` and `contentEncoding` properties
//! and never fails. Encoding always produces compact JSON text.

pub mod content;
pub mod envelope;

pub use content::{ContentEncoding, decode_content, encode_content, normalize_encoding};
pub use envelope::{Envelope, Fields, Properties};
