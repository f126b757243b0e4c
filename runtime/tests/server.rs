use std::{
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

use bytes::Bytes;
use codec::ClientCodec;
use futures::{
    SinkExt,
    StreamExt,
};
use ipscgate_runtime::{
    session::Error,
    RadioControl,
    RadioServer,
    ServerConfig,
};
use message::{
    ClientCommand,
    ClientCommandCode,
    ClientFrame,
    DispatcherFrame,
    GpsRequest,
    PttRequest,
    TextRequest,
};
use tokio::{
    net::TcpStream,
    sync::Mutex,
    task::JoinHandle,
};
use tokio_util::{
    codec::Framed,
    sync::CancellationToken,
};

mod common;

use common::{
    eventually,
    within,
};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Call {
    Ptt(u32, bool, u8),
    Gps(u32),
    Text(u32, String),
}

#[derive(Default)]
struct RecordingRadio(Mutex<Vec<Call>>);

#[async_trait::async_trait]
impl RadioControl for RecordingRadio {
    async fn send_ptt(&self, destination_id: u32, press: bool, slot: u8) -> Result<(), Error> {
        self.0.lock().await.push(Call::Ptt(destination_id, press, slot));
        Ok(())
    }

    async fn request_gps(&self, target_id: u32) -> Result<(), Error> {
        self.0.lock().await.push(Call::Gps(target_id));
        Err(Error::NotConnected)
    }

    async fn send_text_message(&self, destination_id: u32, text: &str) -> Result<(), Error> {
        self.0.lock().await.push(Call::Text(destination_id, text.to_owned()));
        Ok(())
    }
}

struct Harness {
    server: Arc<RadioServer>,
    radio:  Arc<RecordingRadio>,
    addr:   SocketAddr,
    cancel: CancellationToken,
    task:   JoinHandle<()>,
}

type Client = Framed<TcpStream, ClientCodec>;

impl Harness {
    async fn start() -> Self {
        common::trace_init();

        let radio = Arc::new(RecordingRadio::default());
        let server = Arc::new(RadioServer::new(
            ServerConfig {
                bind:         SocketAddr::from(([127, 0, 0, 1], 0)),
                event_buffer: 16,
            },
            radio.clone(),
        ));

        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(server.clone().serve(listener, cancel.clone()));

        Self {
            server,
            radio,
            addr,
            cancel,
            task,
        }
    }

    async fn client(&self) -> Client {
        Framed::new(TcpStream::connect(self.addr).await.unwrap(), ClientCodec::new())
    }

    async fn registered(&self, client_id: u32) -> Client {
        let mut client = self.client().await;
        register(&mut client, client_id, 1).await;
        client
    }

    async fn stop(self) {
        self.cancel.cancel();
        within(Duration::from_secs(5), self.task).await.unwrap();
    }
}

async fn register(client: &mut Client, client_id: u32, sequence: u32) {
    client
        .send(ClientFrame::new(client_id, ClientCommand::Register, sequence, Bytes::new()))
        .await
        .unwrap();

    let ack = next(client).await;
    assert_eq!(ack.command, ClientCommand::RegisterAck);
    assert_eq!(ack.sequence, sequence);
    assert_eq!(ack.client_id, client_id);
}

async fn next(client: &mut Client) -> ClientFrame {
    within(Duration::from_secs(5), client.next()).await.unwrap().unwrap()
}

#[tokio::test]
async fn register_acks_and_tracks_client() {
    let harness = Harness::start().await;
    let _client = harness.registered(42).await;

    assert_eq!(harness.server.client_count(), 1);
    assert_eq!(harness.server.clients()[0].client_id, Some(42));

    harness.stop().await;
}

#[tokio::test]
async fn commands_reach_the_radio() {
    let harness = Harness::start().await;
    let mut client = harness.registered(1).await;

    let ptt = PttRequest {
        target_id: 100,
        press:     true,
        slot:      1,
    };
    client.send(ClientFrame::new(1, ClientCommand::SendPtt, 2, ptt.to_payload())).await.unwrap();

    let gps = GpsRequest {
        target_id: 200,
    };
    client
        .send(ClientFrame::new(1, ClientCommand::SendGpsRequest, 3, gps.to_payload()))
        .await
        .unwrap();

    let text = TextRequest {
        target_id: 300,
        text:      "hello".into(),
    };
    client.send(ClientFrame::new(1, ClientCommand::SendText, 4, text.to_payload())).await.unwrap();

    // a failed gps request must not take the client down
    register(&mut client, 1, 5).await;

    assert_eq!(harness.radio.0.lock().await.as_slice(), &[
        Call::Ptt(100, true, 1),
        Call::Gps(200),
        Call::Text(300, "hello".into()),
    ]);

    harness.stop().await;
}

#[tokio::test]
async fn unknown_and_malformed_commands_are_ignored() {
    let harness = Harness::start().await;
    let mut client = harness.registered(1).await;

    client
        .send(ClientFrame::new(1, ClientCommandCode::from_raw(0x7777), 2, Bytes::from_static(b"??")))
        .await
        .unwrap();
    client
        .send(ClientFrame::new(1, ClientCommand::SendPtt, 3, Bytes::from_static(&[1, 2])))
        .await
        .unwrap();

    register(&mut client, 1, 4).await;

    assert!(harness.radio.0.lock().await.is_empty());
    assert_eq!(harness.server.client_count(), 1);

    harness.stop().await;
}

#[tokio::test]
async fn radio_events_fan_out() {
    let harness = Harness::start().await;
    let mut a = harness.registered(10).await;
    let mut b = harness.registered(20).await;

    let frame = DispatcherFrame::call_end(0, 1, 2).with_sequence(99);
    assert_eq!(harness.server.broadcaster().publish_event(&frame), 2);

    for (client, id) in [(&mut a, 10), (&mut b, 20)] {
        let event = next(client).await;

        assert_eq!(event.command, ClientCommand::RadioEvent);
        assert_eq!(event.client_id, id);
        assert_eq!(DispatcherFrame::decode(&event.payload).unwrap(), frame);
    }

    harness.stop().await;
}

#[tokio::test]
async fn disconnect_only_removes_that_client() {
    let harness = Harness::start().await;
    let a = harness.registered(10).await;
    let mut b = harness.registered(20).await;

    assert_eq!(harness.server.client_count(), 2);

    drop(a);
    eventually(|| harness.server.client_count() == 1).await;
    assert_eq!(harness.server.clients()[0].client_id, Some(20));

    register(&mut b, 20, 7).await;

    harness.stop().await;
}

#[tokio::test]
async fn stop_closes_clients() {
    let harness = Harness::start().await;
    let mut client = harness.registered(1).await;

    let server = harness.server.clone();
    harness.stop().await;

    assert_eq!(server.client_count(), 0);
    assert!(within(Duration::from_secs(5), client.next()).await.is_none());
}
