use std::io;

use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// Resolves on the first SIGINT or SIGTERM.
#[cfg(unix)]
pub async fn terminated() -> io::Result<()> {
    use tokio::signal::unix::{
        signal,
        SignalKind,
    };
    use tokio_stream::wrappers::SignalStream;

    let ints = SignalStream::new(signal(SignalKind::interrupt())?);
    let terms = SignalStream::new(signal(SignalKind::terminate())?);

    ints.merge(terms).next().await;

    Ok(())
}

#[cfg(not(unix))]
pub async fn terminated() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Cancel `token` when the process is asked to stop.
pub fn cancel_on_signal(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {},
            result = terminated() => match result {
                Ok(()) => {
                    tracing::info!("termination signal received");
                    token.cancel();
                },
                Err(e) => tracing::error!(error = %e, "installing signal handlers"),
            },
        }
    })
}
