use std::sync::Arc;

use dashmap::DashMap;
use futures::{
    SinkExt,
    StreamExt,
};
use message::{
    ClientCommand,
    ClientFrame,
    GpsRequest,
    PttRequest,
    TextRequest,
};
use tokio::{
    net::TcpStream,
    sync::broadcast::{
        self,
        error::RecvError,
    },
};
use tokio_util::{
    codec::Framed,
    sync::CancellationToken,
};

use super::{
    ClientInfo,
    ConnectionId,
};
use crate::radio::RadioControl;

pub(super) struct Handler {
    pub conn:    ConnectionId,
    pub stream:  TcpStream,
    pub radio:   Arc<dyn RadioControl>,
    pub clients: Arc<DashMap<ConnectionId, ClientInfo>>,
    pub events:  broadcast::Receiver<ClientFrame>,
    pub cancel:  CancellationToken,
}

/// Drops the client from the active set however the handler exits.
struct Deregister<'a> {
    clients: &'a DashMap<ConnectionId, ClientInfo>,
    conn:    ConnectionId,
}

impl<'a> Drop for Deregister<'a> {
    #[inline]
    fn drop(&mut self) {
        self.clients.remove(&self.conn);
    }
}

#[tracing::instrument(skip_all, fields(conn = handler.conn))]
pub(super) async fn handle(handler: Handler) {
    let Handler {
        conn,
        stream,
        radio,
        clients,
        mut events,
        cancel,
    } = handler;

    let _deregister = Deregister {
        clients: &clients,
        conn,
    };

    let mut framed = Framed::new(stream, codec::ClientCodec::new());
    let mut client_id = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            incoming = framed.next() => {
                let frame = match incoming {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "client stream failed");
                        break;
                    },
                    None => break,
                };

                if let Some(reply) = dispatch(&frame, radio.as_ref(), &clients, conn, &mut client_id).await {
                    if let Err(e) = framed.send(reply).await {
                        tracing::warn!(error = %e, "client write failed");
                        break;
                    }
                }
            },

            event = events.recv() => match event {
                Ok(event) => {
                    let event = ClientFrame {
                        client_id: client_id.unwrap_or(event.client_id),
                        ..event
                    };

                    if let Err(e) = framed.send(event).await {
                        tracing::warn!(error = %e, "client write failed");
                        break;
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "client lagging, radio events dropped");
                },
                Err(RecvError::Closed) => break,
            },
        }
    }

    if let Err(e) = SinkExt::<ClientFrame>::close(&mut framed).await {
        tracing::debug!(error = %e, "closing client socket");
    }

    tracing::info!(?client_id, "client disconnected");
}

/// Act on one client frame, returning the reply if the command has one.
async fn dispatch(
    frame: &ClientFrame,
    radio: &dyn RadioControl,
    clients: &DashMap<ConnectionId, ClientInfo>,
    conn: ConnectionId,
    client_id: &mut Option<u32>,
) -> Option<ClientFrame> {
    let command = match frame.command.kind() {
        Some(command) => command,
        None => {
            tracing::debug!(command = %frame.command, "ignoring unknown client command");
            return None;
        },
    };

    match command {
        ClientCommand::Register => {
            *client_id = Some(frame.client_id);
            if let Some(mut info) = clients.get_mut(&conn) {
                info.client_id = Some(frame.client_id);
            }

            tracing::info!(client_id = frame.client_id, "client registered");
            return Some(ClientFrame::register_ack(frame));
        },

        ClientCommand::SendPtt => match PttRequest::parse(&frame.payload) {
            Ok(req) => {
                let result = radio.send_ptt(req.target_id, req.press, req.slot).await;
                util::trace_catch!(result, target_id = req.target_id, press = req.press, "client ptt failed");
            },
            Err(e) => tracing::warn!(error = %e, "malformed ptt request"),
        },

        ClientCommand::SendGpsRequest => match GpsRequest::parse(&frame.payload) {
            Ok(req) => {
                let result = radio.request_gps(req.target_id).await;
                util::trace_catch!(result, target_id = req.target_id, "client gps request failed");
            },
            Err(e) => tracing::warn!(error = %e, "malformed gps request"),
        },

        ClientCommand::SendText => match TextRequest::parse(&frame.payload) {
            Ok(req) => {
                let result = radio.send_text_message(req.target_id, &req.text).await;
                util::trace_catch!(result, target_id = req.target_id, "client text message failed");
            },
            Err(e) => tracing::warn!(error = %e, "malformed text request"),
        },

        other => tracing::debug!(command = ?other, "ignoring server-side command from client"),
    }

    None
}
