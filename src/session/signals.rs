use futures::stream::{self, BoxStream, StreamExt};

/// Process signals that ask a session to wind down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Interrupt,
    Terminate,
}

/// Streams SIGINT and SIGTERM for as long as the stream is polled.
#[cfg(unix)]
pub fn shutdown_signals() -> std::io::Result<BoxStream<'static, Signal>> {
    use tokio::signal::unix::{SignalKind, signal};

    let interrupt = signal(SignalKind::interrupt())?;
    let terminate = signal(SignalKind::terminate())?;

    let signals = stream::unfold((interrupt, terminate), |(mut interrupt, mut terminate)| async move {
        let received = tokio::select! {
            Some(()) = interrupt.recv() => Signal::Interrupt,
            Some(()) = terminate.recv() => Signal::Terminate,
            else => return None,
        };
        Some((received, (interrupt, terminate)))
    });
    Ok(signals.boxed())
}

#[cfg(not(unix))]
pub fn shutdown_signals() -> std::io::Result<BoxStream<'static, Signal>> {
    let signals = stream::unfold((), |()| async move {
        tokio::signal::ctrl_c().await.ok()?;
        Some((Signal::Interrupt, ()))
    });
    Ok(signals.boxed())
}
