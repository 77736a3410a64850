//! Signal and broker-error watching around every await of a session.
//!
//! A session owns one `Guard`. Broker calls made outside the main select
//! loop go through [`Guard::run`], so an interrupt is counted and a broker
//! error event is fatal no matter which step the session is waiting on.

use std::future::Future;

use futures::stream::{Fuse, Stream};
use futures_util::StreamExt;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{info, warn};

use crate::broker::BrokerError;
use crate::session::{SessionError, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// Stop taking new work and close normally.
    WindDown,
    /// Quit at once without closing.
    ForceQuit,
}

/// A session that counts interrupts.
pub trait Interruptible {
    fn on_interrupt(&mut self) -> InterruptAction;
}

/// Applies one signal to `session`. A second signal is fatal.
pub fn handle_signal(
    session: &mut impl Interruptible,
    signal: Signal,
) -> Result<InterruptAction, SessionError> {
    match session.on_interrupt() {
        InterruptAction::ForceQuit => {
            warn!(?signal, "Second signal received, quitting");
            Err(SessionError::ForcedQuit)
        }
        InterruptAction::WindDown => {
            info!(?signal, "Signal received, winding down");
            Ok(InterruptAction::WindDown)
        }
    }
}

pub struct Guard<S> {
    pub(crate) errors: UnboundedReceiver<BrokerError>,
    pub(crate) signals: Fuse<S>,
}

impl<S> Guard<S>
where
    S: Stream<Item = Signal> + Unpin,
{
    /// Watches `signals` only, until `watch_errors` hands over the broker's
    /// error events.
    pub fn new(signals: S) -> Self {
        Self {
            errors: mpsc::unbounded_channel().1,
            signals: signals.fuse(),
        }
    }

    pub fn watch_errors(&mut self, errors: Option<UnboundedReceiver<BrokerError>>) {
        if let Some(errors) = errors {
            self.errors = errors;
        }
    }

    /// Awaits `fut` while applying incoming signals to `session`. A first
    /// signal is recorded and the wait goes on; a second one aborts it.
    pub async fn run<T, F>(
        &mut self,
        session: &mut impl Interruptible,
        fut: F,
    ) -> Result<T, SessionError>
    where
        F: Future<Output = Result<T, BrokerError>>,
    {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                biased;

                Some(err) = self.errors.recv() => return Err(err.into()),

                Some(signal) = self.signals.next() => {
                    handle_signal(&mut *session, signal)?;
                }

                result = &mut fut => return Ok(result?),
            }
        }
    }
}
