//! # amqp-json
//!
//! `amqp-json` moves JSON between an AMQP 0-9-1 broker and standard streams.
//! Consuming writes every delivery as a JSON envelope on stdout; publishing
//! reads JSON values from stdin and sends each one to the broker with
//! publisher confirms.
//!
//! ## Core Modules
//!
//! - `topology`: Parses queue and `exchange/key...` arguments into routes.
//! - `codec`: Converts message bodies to JSON content and back.
//! - `ingest`: Splits chunked stdin into JSON values, as one batch or line by line.
//! - `broker`: The channel traits the sessions drive, and their `lapin` implementation.
//! - `session`: The consume and publish state machines and their async drivers.
//! - `config`: Loads settings from files and environment variables.
//! - `utils`: Top-level error type and logging setup.

pub mod broker;
pub mod codec;
pub mod config;
pub mod ingest;
pub mod session;
pub mod topology;
pub mod utils;
