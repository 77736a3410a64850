//! The `ingest` module turns raw publish input into JSON values.
//!
//! Input arrives in chunks with arbitrary boundaries. The first non-blank
//! byte decides the format: `[` means the whole input is one JSON document
//! (batch mode), `{` means one JSON value per line (stream mode). In stream
//! mode values are produced as soon as their line terminator arrives.

pub mod decoder;

pub use decoder::{IngestDecoder, IngestError, IngestMode};

#[cfg(test)]
mod tests;
