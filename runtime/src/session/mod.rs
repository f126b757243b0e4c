//! The dispatcher's connection to a single radio: login handshake, keepalives, ordered
//! command writes and a background receive loop.

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

use bytes::Bytes;
use codec::{
    tokio_codec::FramedRead,
    DispatcherCodec,
};
use futures::StreamExt;
use message::{
    Command,
    CommandCode,
    DispatcherFrame,
};
use net::{
    Endpoint,
    StreamOps,
};
use tokio::{
    net::TcpStream,
    sync::{
        mpsc,
        watch,
        Mutex,
    },
    time::Instant,
};
use tokio_util::{
    codec::FramedWrite,
    sync::CancellationToken,
};

use crate::radio::RadioControl;

mod link;

use link::{
    FrameWriter,
    Link,
    LoopContext,
};

/// Bound on the best-effort disconnect frame so a wedged socket can't stall teardown.
const DISCONNECT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("session is not connected")]
    NotConnected,

    #[error("session is already connected")]
    AlreadyConnected,

    #[error("timed out waiting for login response")]
    Timeout,

    #[error("login rejected: radio answered with {0}")]
    LoginRejected(CommandCode),

    #[error("connection closed by radio")]
    ConnectionClosed,

    #[error("connect attempt cancelled")]
    Cancelled,

    #[error(transparent)]
    Codec(#[from] codec::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, derive_more::Display)]
pub enum State {
    Disconnected,
    Connecting,
    LoginSent,
    Connected,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    PacketReceived(DispatcherFrame),
    ConnectionLost { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub endpoint:           Endpoint,
    pub dispatcher_id:      u32,
    pub login_timeout:      Duration,
    pub keepalive_interval: Duration,

    /// Time without a keepalive acknowledgement after which the link is declared lost.
    pub keepalive_timeout: Duration,
    pub event_buffer:      usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint:           Endpoint::new("127.0.0.1", 50000),
            dispatcher_id:      1,
            login_timeout:      Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(10),
            keepalive_timeout:  Duration::from_secs(30),
            event_buffer:       64,
        }
    }
}

pub struct Session {
    config:   SessionConfig,
    sequence: Arc<AtomicU32>,
    state:    Arc<watch::Sender<State>>,
    events:   mpsc::Sender<SessionEvent>,
    link:     Mutex<Option<Link>>,

    /// Held for the duration of a connect attempt. `link` is only locked briefly.
    connecting: Mutex<()>,

    /// Cancelled by `disconnect` to abort an in-flight connect; replaced afterwards.
    attempt: Mutex<CancellationToken>,
}

impl Session {
    /// Create a disconnected session and the receiver for its events.
    ///
    /// Events are delivered on a bounded channel: the receive loop waits for the consumer
    /// before reading the next frame.
    pub fn new(config: SessionConfig) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(config.event_buffer.max(1));
        let (state, _) = watch::channel(State::Disconnected);

        let session = Self {
            config,
            sequence: Arc::new(AtomicU32::new(0)),
            state: Arc::new(state),
            events: tx,
            link: Mutex::new(None),
            connecting: Mutex::new(()),
            attempt: Mutex::new(CancellationToken::new()),
        };

        (session, rx)
    }

    #[inline]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[inline]
    pub fn state(&self) -> State {
        *self.state.borrow()
    }

    #[inline]
    pub fn subscribe_state(&self) -> watch::Receiver<State> {
        self.state.subscribe()
    }

    /// Open the socket, log in and start the background loops.
    ///
    /// Anything other than a login response within the login timeout fails the attempt, and
    /// the socket is closed before returning. A link left behind by a lost connection is torn
    /// down first, so callers may simply connect again after `ConnectionLost`.
    #[tracing::instrument(skip_all, fields(endpoint = %self.config.endpoint), err(Display))]
    pub async fn connect(&self, auth: Bytes) -> Result<()> {
        let _attempt = self.connecting.try_lock().map_err(|_| Error::AlreadyConnected)?;

        let stale = {
            let mut link = self.link.lock().await;
            let live = link.as_ref().map_or(false, |current| !current.ctx.lost.load(Ordering::SeqCst));

            if live {
                return Err(Error::AlreadyConnected);
            }

            link.take()
        };

        if let Some(stale) = stale {
            tracing::debug!("releasing lost link before reconnecting");
            self.release(stale).await;
        }

        let cancel = self.attempt.lock().await.child_token();

        let mut reset = ResetOnDrop {
            state: &self.state,
            armed: true,
        };

        self.set_state(State::Connecting);

        let established = tokio::select! {
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = self.establish(auth, cancel.clone()) => result,
        };

        let new_link = established?;

        let mut link = self.link.lock().await;

        // `disconnect` cancels before it looks at `link`, so this check can't miss it.
        if cancel.is_cancelled() {
            drop(link);
            self.release(new_link).await;

            return Err(Error::Cancelled);
        }

        reset.armed = false;
        *link = Some(new_link);

        tracing::info!("session connected");
        Ok(())
    }

    async fn establish(&self, auth: Bytes, cancel: CancellationToken) -> Result<Link> {
        let stream = tokio::time::timeout(
            self.config.login_timeout,
            <TcpStream as StreamOps>::connect(&self.config.endpoint),
        )
        .await
        .map_err(|_| Error::Timeout)??;
        let (read, write) = stream.into_split();

        let mut reader = FramedRead::new(read, DispatcherCodec::new());
        let writer = Arc::new(FrameWriter::new(
            FramedWrite::new(write, DispatcherCodec::new()),
            self.sequence.clone(),
        ));

        writer.send(DispatcherFrame::login(self.config.dispatcher_id, auth)).await?;
        self.set_state(State::LoginSent);

        let response = tokio::time::timeout(self.config.login_timeout, reader.next())
            .await
            .map_err(|_| Error::Timeout)?;

        match response {
            Some(Ok(frame)) if frame.command == Command::LoginResponse => {
                tracing::debug!(radio_id = frame.source_id, "login accepted");
            },
            Some(Ok(frame)) => return Err(Error::LoginRejected(frame.command)),
            Some(Err(e)) => return Err(e.into()),
            None => return Err(Error::ConnectionClosed),
        }

        let ctx = Arc::new(LoopContext {
            halt:     cancel.child_token(),
            closing:  cancel.clone(),
            lost:     AtomicBool::new(false),
            state:    self.state.clone(),
            events:   self.events.clone(),
            last_ack: Mutex::new(Instant::now()),
        });

        self.set_state(State::Connected);

        let receive = tokio::spawn(link::receive_loop(reader, ctx.clone()));
        let keepalive = tokio::spawn(link::keepalive_loop(
            writer.clone(),
            ctx.clone(),
            self.config.dispatcher_id,
            self.config.keepalive_interval,
            self.config.keepalive_timeout,
        ));

        Ok(Link {
            writer,
            ctx,
            cancel,
            tasks: vec![receive, keepalive],
        })
    }

    /// Tear the link down. Safe to call in any state and any number of times.
    ///
    /// Never fails: the disconnect frame and socket close are best-effort.
    #[tracing::instrument(skip_all)]
    pub async fn disconnect(&self) {
        {
            let mut attempt = self.attempt.lock().await;
            attempt.cancel();
            *attempt = CancellationToken::new();
        }

        let link = self.link.lock().await.take();

        let Some(link) = link else {
            self.set_state(State::Disconnected);
            return;
        };

        self.release(link).await;
        self.set_state(State::Disconnected);

        tracing::info!("session disconnected");
    }

    /// Stop the loops of `link`, say goodbye if the radio is still there, and close the socket.
    async fn release(&self, link: Link) {
        let was_lost = link.ctx.lost.swap(true, Ordering::SeqCst);
        link.cancel.cancel();

        for task in link.tasks {
            util::trace_catch!(task.await, "session task failed");
        }

        if !was_lost {
            let frame = DispatcherFrame::disconnect(self.config.dispatcher_id);

            match tokio::time::timeout(DISCONNECT_WRITE_TIMEOUT, link.writer.send(frame)).await {
                Ok(Ok(_)) => {},
                Ok(Err(e)) => tracing::debug!(error = %e, "disconnect frame not sent"),
                Err(_) => tracing::debug!("disconnect frame write timed out"),
            }
        }

        link.writer.close().await;
    }

    /// Stamp the next sequence number onto `frame` and write it. Returns the sequence used.
    ///
    /// Fails with `NotConnected` right away unless the session is `Connected`, including
    /// while a connect attempt is still in progress.
    #[tracing::instrument(skip_all, fields(command = %frame.command), err(Display), level = "debug")]
    pub async fn send(&self, frame: DispatcherFrame) -> Result<u32> {
        if self.state() != State::Connected {
            return Err(Error::NotConnected);
        }

        let writer = match &*self.link.lock().await {
            Some(link) if !link.ctx.lost.load(Ordering::SeqCst) => link.writer.clone(),
            _ => return Err(Error::NotConnected),
        };

        writer.send(frame).await
    }

    #[inline]
    fn set_state(&self, state: State) {
        set_state(&self.state, state);
    }
}

fn set_state(sender: &watch::Sender<State>, state: State) {
    let old = sender.send_replace(state);

    if old != state {
        tracing::debug!(from = %old, to = %state, "session state");
    }
}

/// Returns the session to `Disconnected` if a connect attempt is abandoned midway.
struct ResetOnDrop<'a> {
    state: &'a watch::Sender<State>,
    armed: bool,
}

impl<'a> Drop for ResetOnDrop<'a> {
    #[inline]
    fn drop(&mut self) {
        if self.armed {
            set_state(self.state, State::Disconnected);
        }
    }
}

#[async_trait::async_trait]
impl RadioControl for Session {
    async fn send_ptt(&self, destination_id: u32, press: bool, slot: u8) -> Result<()> {
        self.send(DispatcherFrame::ptt(self.config.dispatcher_id, destination_id, slot, press))
            .await
            .map(drop)
    }

    async fn request_gps(&self, target_id: u32) -> Result<()> {
        self.send(DispatcherFrame::gps_request(self.config.dispatcher_id, target_id))
            .await
            .map(drop)
    }

    async fn send_text_message(&self, destination_id: u32, text: &str) -> Result<()> {
        self.send(DispatcherFrame::text_message(self.config.dispatcher_id, destination_id, text))
            .await
            .map(drop)
    }
}
