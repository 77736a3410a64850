//! The `session` module drives the two directions of the tool.
//!
//! - `consume`: broker queues and bindings → JSON on stdout
//! - `publish`: JSON on stdin → broker exchanges and queues
//!
//! Each direction pairs a small state machine, which owns the counters that
//! decide when to drain, with an async driver that feeds it broker events,
//! input and signals from a single task. Signals are watched through every
//! stage, from connecting to closing.

pub mod consume;
pub mod guard;
pub mod output;
pub mod publish;
pub mod signals;

use thiserror::Error;

use crate::broker::BrokerError;
use crate::ingest::IngestError;

pub use consume::{ConsumeOptions, ConsumeReport, ConsumeSession, ConsumeState, run_consume};
pub use guard::{InterruptAction, Interruptible};
pub use output::OutputWriter;
pub use publish::{PublishOptions, PublishReport, PublishSession, PublishState, run_publish};
pub use signals::{Signal, shutdown_signals};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a minimum message count only applies to named queues, not to bindings")]
    MinimumWithBindings,

    #[error("minimum of {min} messages exceeds the maximum of {max}")]
    MinimumExceedsMaximum { min: u64, max: u64 },

    #[error("only {available} messages available, at least {min} required")]
    NotEnoughMessages { available: u64, min: u64 },

    #[error("no queue or binding given to consume from")]
    NothingToConsume,

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("interrupted twice, quitting without closing the broker connection")]
    ForcedQuit,
}
