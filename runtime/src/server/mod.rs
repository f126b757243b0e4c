//! TCP server for dispatcher clients: commands in, radio events out.

use std::{
    io,
    net::SocketAddr,
    sync::{
        atomic::{
            AtomicU32,
            AtomicU64,
            Ordering,
        },
        Arc,
    },
};

use bytes::{
    BufMut,
    BytesMut,
};
use chrono::{
    DateTime,
    Utc,
};
use dashmap::DashMap;
use message::{
    ClientCommand,
    ClientFrame,
    DispatcherFrame,
};
use net::{
    Endpoint,
    ListenerOps,
};
use tokio::{
    net::TcpListener,
    sync::broadcast,
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

use crate::radio::RadioControl;

mod client;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind:         SocketAddr,
    pub event_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind:         SocketAddr::from(([0, 0, 0, 0], 30001)),
            event_buffer: 256,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientInfo {
    pub peer:         SocketAddr,
    pub client_id:    Option<u32>,
    pub connected_at: DateTime<Utc>,
}

pub type ConnectionId = u64;

pub struct RadioServer {
    config:    ServerConfig,
    radio:     Arc<dyn RadioControl>,
    clients:   Arc<DashMap<ConnectionId, ClientInfo>>,
    events:    broadcast::Sender<ClientFrame>,
    next_conn: AtomicU64,
}

impl RadioServer {
    pub fn new(config: ServerConfig, radio: Arc<dyn RadioControl>) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));

        Self {
            config,
            radio,
            clients: Arc::new(DashMap::new()),
            events,
            next_conn: AtomicU64::new(0),
        }
    }

    /// Handle for pushing radio traffic to every connected client.
    pub fn broadcaster(&self) -> Broadcaster {
        Broadcaster {
            events:   self.events.clone(),
            sequence: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Receive everything published to clients.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientFrame> {
        self.events.subscribe()
    }

    #[inline]
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn clients(&self) -> Vec<ClientInfo> {
        self.clients.iter().map(|entry| entry.value().clone()).collect()
    }

    pub async fn bind(&self) -> io::Result<TcpListener> {
        let endpoint = Endpoint::new(self.config.bind.ip().to_string(), self.config.bind.port());

        <TcpListener as ListenerOps>::bind(&endpoint).await
    }

    /// Bind the configured address and serve until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> io::Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, cancel).await;

        Ok(())
    }

    /// Accept clients on `listener` until cancelled, then wait for every handler to finish.
    #[tracing::instrument(skip_all, fields(local = ?listener.local()))]
    pub async fn serve(self: Arc<Self>, listener: TcpListener, cancel: CancellationToken) {
        let mut handlers = JoinSet::new();

        tracing::info!("radio server listening");

        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept_stream() => accepted,
                Some(finished) = handlers.join_next(), if !handlers.is_empty() => {
                    util::trace_catch!(finished, "client handler panicked");
                    continue;
                },
            };

            let (stream, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                },
            };

            let conn = self.next_conn.fetch_add(1, Ordering::Relaxed);
            self.clients.insert(conn, ClientInfo {
                peer,
                client_id: None,
                connected_at: Utc::now(),
            });

            tracing::info!(conn, %peer, "client connected");

            handlers.spawn(client::handle(client::Handler {
                conn,
                stream,
                radio: self.radio.clone(),
                clients: self.clients.clone(),
                events: self.events.subscribe(),
                cancel: cancel.child_token(),
            }));
        }

        while let Some(finished) = handlers.join_next().await {
            util::trace_catch!(finished, "client handler panicked");
        }

        tracing::info!("radio server stopped");
    }
}

/// Publishes radio traffic to all connected clients.
///
/// Clients that fall behind lose events rather than slowing the radio side down.
#[derive(Clone, Debug)]
pub struct Broadcaster {
    events:   broadcast::Sender<ClientFrame>,
    sequence: Arc<AtomicU32>,
}

impl Broadcaster {
    /// Forward a dispatcher frame as a `RADIO_EVENT` carrying its wire bytes. Returns the
    /// number of clients it reached.
    pub fn publish_event(&self, frame: &DispatcherFrame) -> usize {
        match frame.encode() {
            Ok(raw) => self.publish(ClientCommand::RadioEvent, raw.into()),
            Err(e) => {
                tracing::warn!(error = %e, %frame, "radio event not encodable");
                0
            },
        }
    }

    /// Forward decoded audio for a call as a `RADIO_AUDIO` frame: the 4-byte destination id
    /// followed by little-endian PCM samples.
    pub fn publish_audio(&self, destination_id: u32, pcm: &[i16]) -> usize {
        let mut payload = BytesMut::with_capacity(4 + pcm.len() * 2);
        payload.put_u32_le(destination_id);
        pcm.iter().for_each(|&sample| payload.put_i16_le(sample));

        self.publish(ClientCommand::RadioAudio, payload)
    }

    fn publish(&self, command: ClientCommand, payload: BytesMut) -> usize {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let frame = ClientFrame::new(0, command, sequence, payload.freeze());

        self.events.send(frame).unwrap_or(0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::radio::mock::MockRadio;

    #[test]
    fn publish_without_clients() {
        let server = RadioServer::new(ServerConfig::default(), Arc::new(MockRadio::default()));

        assert_eq!(server.broadcaster().publish_event(&DispatcherFrame::keepalive(1)), 0);
    }

    #[tokio::test]
    async fn events_carry_wire_bytes() {
        let server = RadioServer::new(ServerConfig::default(), Arc::new(MockRadio::default()));
        let mut rx = server.events.subscribe();
        let broadcaster = server.broadcaster();

        let frame = DispatcherFrame::gps_request(1, 2).with_sequence(5);
        assert_eq!(broadcaster.publish_event(&frame), 1);
        assert_eq!(broadcaster.publish_audio(9, &[1, -1]), 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.command, ClientCommand::RadioEvent);
        assert_eq!(DispatcherFrame::decode(&event.payload).unwrap(), frame);

        let audio = rx.recv().await.unwrap();
        assert_eq!(audio.command, ClientCommand::RadioAudio);
        assert_eq!(audio.sequence, 1);
        assert_eq!(&audio.payload[..], &[9, 0, 0, 0, 1, 0, 0xff, 0xff]);
    }
}
