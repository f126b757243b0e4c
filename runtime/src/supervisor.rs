use std::{
    sync::Arc,
    time::Duration,
};

use bytes::Bytes;
use message::DispatcherFrame;
use tokio::sync::mpsc;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_util::sync::CancellationToken;

use crate::session::{
    Session,
    SessionEvent,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ReconnectConfig {
    pub base:      Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base:      Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

// proportion of each delay to be jittered, i.e. multiply the delay by a random sample in the
// range [1 - JITTER_FACTOR, 1 + JITTER_FACTOR]
const JITTER_FACTOR: f64 = 0.5;

/// Delays doubling from `base` up to `max_delay`, each jittered by ±50%.
pub fn backoff(config: &ReconnectConfig) -> impl Iterator<Item = Duration> {
    let base_millis = (config.base.as_millis() as u64 / 2).max(1);

    ExponentialBackoff::from_millis(2)
        .factor(base_millis)
        .max_delay(config.max_delay)
        .map(|dur| {
            // make distribution even about 0, scale by factor, offset about 1
            let jitter = (rand::random::<f64>() - 0.5) * JITTER_FACTOR * 2. + 1.;

            dur.mul_f64(jitter)
        })
}

/// Owns the session's connection lifecycle: connects, forwards received frames and
/// reconnects with backoff whenever the link is lost.
pub struct Supervisor {
    session: Arc<Session>,
    auth:    Bytes,
    config:  ReconnectConfig,
}

impl Supervisor {
    pub fn new(session: Arc<Session>, auth: Bytes, config: ReconnectConfig) -> Self {
        Self {
            session,
            auth,
            config,
        }
    }

    /// Run until cancelled. Frames from the radio are forwarded to `packets`.
    #[tracing::instrument(skip_all, fields(endpoint = %self.session.config().endpoint))]
    pub async fn run(
        self,
        mut events: mpsc::Receiver<SessionEvent>,
        packets: mpsc::Sender<DispatcherFrame>,
        cancel: CancellationToken,
    ) {
        if !self.reconnect(&cancel).await {
            return;
        }

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };

            match event {
                Some(SessionEvent::PacketReceived(frame)) => {
                    if packets.send(frame).await.is_err() {
                        tracing::warn!("packet consumer gone, stopping supervisor");
                        break;
                    }
                },
                Some(SessionEvent::ConnectionLost {
                    reason,
                }) => {
                    tracing::warn!(%reason, "radio link lost, reconnecting");

                    self.session.disconnect().await;

                    if !self.reconnect(&cancel).await {
                        break;
                    }
                },
                None => break,
            }
        }

        tracing::debug!("supervisor stopped");
    }

    /// Retry `connect` until it succeeds. Returns `false` if cancelled first.
    async fn reconnect(&self, cancel: &CancellationToken) -> bool {
        let attempt = tokio_retry::Retry::spawn(backoff(&self.config), || async {
            let result = self.session.connect(self.auth.clone()).await;
            util::trace_catch!(result, "connect attempt failed");

            result
        });

        tokio::select! {
            _ = cancel.cancelled() => false,
            result = attempt => result.is_ok(),
        }
    }
}
