use std::{
    sync::{
        atomic::{
            AtomicBool,
            AtomicU32,
            Ordering,
        },
        Arc,
    },
    time::Duration,
};

use codec::{
    tokio_codec::FramedRead,
    DispatcherCodec,
};
use futures::{
    SinkExt,
    StreamExt,
};
use message::{
    Command,
    DispatcherFrame,
};
use tokio::{
    net::tcp::{
        OwnedReadHalf,
        OwnedWriteHalf,
    },
    sync::{
        mpsc,
        watch,
        Mutex,
    },
    task::JoinHandle,
    time::{
        Instant,
        MissedTickBehavior,
    },
};
use tokio_util::{
    codec::FramedWrite,
    sync::CancellationToken,
};

use super::{
    set_state,
    Result,
    DISCONNECT_WRITE_TIMEOUT,
    SessionEvent,
    State,
};

/// Everything owned by one established connection.
pub(super) struct Link {
    pub writer: Arc<FrameWriter>,
    pub ctx:    Arc<LoopContext>,
    pub cancel: CancellationToken,
    pub tasks:  Vec<JoinHandle<()>>,
}

/// Serializes writes from the command path and the keepalive loop so that sequence numbers
/// go out in the order they were assigned.
pub(super) struct FrameWriter {
    sink:     Mutex<FramedWrite<OwnedWriteHalf, DispatcherCodec>>,
    sequence: Arc<AtomicU32>,
}

impl FrameWriter {
    pub fn new(sink: FramedWrite<OwnedWriteHalf, DispatcherCodec>, sequence: Arc<AtomicU32>) -> Self {
        Self {
            sink: Mutex::new(sink),
            sequence,
        }
    }

    pub async fn send(&self, frame: DispatcherFrame) -> Result<u32> {
        let mut sink = self.sink.lock().await;

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let frame = frame.with_sequence(sequence);

        tracing::trace!(%frame, "sending frame");
        sink.send(frame).await?;

        Ok(sequence)
    }

    pub async fn close(&self) {
        let mut sink = self.sink.lock().await;

        if let Err(e) = SinkExt::<DispatcherFrame>::close(&mut *sink).await {
            tracing::debug!(error = %e, "closing radio socket");
        }
    }
}

/// State shared by the receive and keepalive loops of one connection.
pub(super) struct LoopContext {
    /// Stops both loops. Child of `closing`, so it also fires on disconnect.
    pub halt:     CancellationToken,
    /// Fires only when the owner disconnects.
    pub closing:  CancellationToken,
    pub lost:     AtomicBool,
    pub state:    Arc<watch::Sender<State>>,
    pub events:   mpsc::Sender<SessionEvent>,
    pub last_ack: Mutex<Instant>,
}

impl LoopContext {
    /// Report the connection lost exactly once per connection, and stop both loops.
    async fn lose(&self, reason: String) {
        if self.lost.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::warn!(%reason, "connection lost");

        set_state(&self.state, State::Disconnected);
        self.halt.cancel();

        tokio::select! {
            _ = self.closing.cancelled() => {},
            result = self.events.send(SessionEvent::ConnectionLost { reason }) => {
                if result.is_err() {
                    tracing::debug!("no session event consumer");
                }
            },
        }
    }
}

pub(super) async fn receive_loop(
    mut reader: FramedRead<OwnedReadHalf, DispatcherCodec>,
    ctx: Arc<LoopContext>,
) {
    loop {
        let next = tokio::select! {
            _ = ctx.halt.cancelled() => return,
            next = reader.next() => next,
        };

        let frame = match next {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                ctx.lose(format!("receive failed: {}", e)).await;
                return;
            },
            None => {
                ctx.lose("connection closed by radio".to_owned()).await;
                return;
            },
        };

        if frame.command == Command::KeepaliveResponse {
            *ctx.last_ack.lock().await = Instant::now();
            continue;
        }

        tracing::debug!(%frame, "frame received");

        tokio::select! {
            _ = ctx.halt.cancelled() => return,
            result = ctx.events.send(SessionEvent::PacketReceived(frame)) => {
                if result.is_err() {
                    tracing::debug!("no session event consumer, dropping frame");
                }
            },
        }
    }
}

pub(super) async fn keepalive_loop(
    writer: Arc<FrameWriter>,
    ctx: Arc<LoopContext>,
    dispatcher_id: u32,
    interval: Duration,
    timeout: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ctx.halt.cancelled() => return,
            _ = ticker.tick() => {},
        }

        let since_ack = ctx.last_ack.lock().await.elapsed();

        if since_ack > timeout {
            ctx.lose(format!("no keepalive acknowledgement for {:?}", since_ack)).await;

            let goodbye = writer.send(DispatcherFrame::disconnect(dispatcher_id));
            if !matches!(tokio::time::timeout(DISCONNECT_WRITE_TIMEOUT, goodbye).await, Ok(Ok(_))) {
                tracing::debug!("disconnect frame not sent");
            }
            writer.close().await;

            return;
        }

        if let Err(e) = writer.send(DispatcherFrame::keepalive(dispatcher_id)).await {
            ctx.lose(format!("keepalive send failed: {}", e)).await;
            return;
        }
    }
}
