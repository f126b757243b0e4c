#![allow(dead_code)]

use std::{
    future::Future,
    time::Duration,
};

use codec::DispatcherCodec;
use futures::{
    SinkExt,
    StreamExt,
};
use message::{
    Command,
    DispatcherFrame,
};
use net::Endpoint;
use tokio::{
    net::TcpListener,
    sync::mpsc,
    task::JoinHandle,
};
use tokio_util::{
    codec::Framed,
    sync::CancellationToken,
};

pub const RADIO_ID: u32 = 7_000_001;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoginReply {
    Accept,
    Reject,
    Silent,
    Hangup,
}

#[derive(Copy, Clone, Debug)]
pub struct Script {
    pub login:          LoginReply,
    pub ack_keepalives: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            login:          LoginReply::Accept,
            ack_keepalives: true,
        }
    }
}

/// A scripted radio on a loopback port. Serves one connection at a time, for as many
/// connections as arrive.
pub struct FakeRadio {
    pub endpoint: Endpoint,

    /// Every frame the radio received, tagged with the connection number.
    pub received: mpsc::UnboundedReceiver<(usize, DispatcherFrame)>,

    /// Frames to push to the currently connected dispatcher.
    pub push: mpsc::UnboundedSender<DispatcherFrame>,

    /// Connection numbers, sent as each connection ends.
    pub closed: mpsc::UnboundedReceiver<usize>,

    /// Drops the current connection when cancelled; replaced for the next one.
    hangup: mpsc::UnboundedSender<()>,
    task:   JoinHandle<()>,
}

impl FakeRadio {
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (received_tx, received) = mpsc::unbounded_channel();
        let (push, mut push_rx) = mpsc::unbounded_channel::<DispatcherFrame>();
        let (hangup, mut hangup_rx) = mpsc::unbounded_channel::<()>();
        let (closed_tx, closed) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            let mut conn = 0;

            while let Ok((stream, _)) = listener.accept().await {
                let mut framed = Framed::new(stream, DispatcherCodec::new());

                loop {
                    tokio::select! {
                        _ = hangup_rx.recv() => break,
                        Some(frame) = push_rx.recv() => {
                            if framed.send(frame).await.is_err() {
                                break;
                            }
                        },
                        incoming = framed.next() => {
                            let frame = match incoming {
                                Some(Ok(frame)) => frame,
                                _ => break,
                            };

                            let _ = received_tx.send((conn, frame.clone()));

                            let reply = if frame.command == Command::Login {
                                match script.login {
                                    LoginReply::Accept => Some(DispatcherFrame::login_response(RADIO_ID, frame.source_id)),
                                    LoginReply::Reject => Some(DispatcherFrame::disconnect(RADIO_ID)),
                                    LoginReply::Silent => None,
                                    LoginReply::Hangup => break,
                                }
                            } else if frame.command == Command::Keepalive && script.ack_keepalives {
                                Some(DispatcherFrame::keepalive_response(RADIO_ID, frame.source_id))
                            } else {
                                None
                            };

                            if let Some(reply) = reply {
                                if framed.send(reply).await.is_err() {
                                    break;
                                }
                            }
                        },
                    }
                }

                let _ = closed_tx.send(conn);
                conn += 1;
            }
        });

        Self {
            endpoint: Endpoint::new("127.0.0.1", port),
            received,
            push,
            closed,
            hangup,
            task,
        }
    }

    pub fn hang_up(&self) {
        let _ = self.hangup.send(());
    }

    /// Next frame received from the dispatcher, skipping keepalives.
    pub async fn next_frame(&mut self) -> (usize, DispatcherFrame) {
        within(Duration::from_secs(5), async {
            loop {
                let (conn, frame) = self.received.recv().await.unwrap();

                if frame.command != Command::Keepalive {
                    return (conn, frame);
                }
            }
        })
        .await
    }

    /// Wait for the dispatcher side of a connection to go away.
    pub async fn next_closed(&mut self) -> usize {
        within(Duration::from_secs(5), self.closed.recv()).await.unwrap()
    }

    pub async fn next_of(&mut self, command: Command) -> (usize, DispatcherFrame) {
        within(Duration::from_secs(5), async {
            loop {
                let (conn, frame) = self.received.recv().await.unwrap();

                if frame.command == command {
                    return (conn, frame);
                }
            }
        })
        .await
    }
}

impl Drop for FakeRadio {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub async fn within<T>(limit: Duration, fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(limit, fut).await.expect("timed out")
}

/// Poll `check` until it holds or a few seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    within(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
}

pub fn cancel_token() -> CancellationToken {
    CancellationToken::new()
}

pub fn trace_init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
