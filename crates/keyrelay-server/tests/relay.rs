//! End-to-end scenarios against a relay bound to an ephemeral port.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use keyrelay_core::{ClientId, ClientName, MessageId, MessageType, PUBLIC_KEY_SIZE, PublicKey};
use keyrelay_protocol::payload::{
    self, PublicKeyResponse, RegisterRequest, SendMessageRequest, SendMessageResponse,
};
use keyrelay_protocol::{Frame, HEADER_SIZE, Header, PROTOCOL_VERSION, RequestCode};
use keyrelay_server::{
    RelayServer, ServerConfig, SignalHandler, make_connection_handler, new_shared_store,
};

async fn start_relay() -> (SocketAddr, keyrelay_server::ShutdownHandle) {
    start_relay_with(ServerConfig::new("127.0.0.1", 0)).await
}

async fn start_relay_with(config: ServerConfig) -> (SocketAddr, keyrelay_server::ShutdownHandle) {
    let version = config.version;
    let server = RelayServer::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();

    let signals = SignalHandler::new();
    let handle = signals.shutdown_handle();
    tokio::spawn(async move {
        let handler = make_connection_handler(new_shared_store(), version);
        server
            .run_until_shutdown(handler, signals.shutdown().wait())
            .await
            .unwrap();
    });
    (addr, handle)
}

struct TestClient {
    stream: TcpStream,
    id: ClientId,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
            id: ClientId::ZERO,
        }
    }

    async fn call(&mut self, code: RequestCode, payload: Vec<u8>) -> Frame {
        self.call_raw(code.as_u16(), payload).await
    }

    async fn call_raw(&mut self, code: u16, payload: Vec<u8>) -> Frame {
        let frame = Frame {
            client_id: self.id,
            version: PROTOCOL_VERSION,
            code,
            payload,
        };
        self.stream.write_all(&frame.encode().unwrap()).await.unwrap();

        let mut header = [0u8; HEADER_SIZE];
        self.stream.read_exact(&mut header).await.unwrap();
        let header = Header::decode(&header);
        let mut body = vec![0u8; header.payload_len as usize];
        self.stream.read_exact(&mut body).await.unwrap();
        Frame::from_parts(header, body)
    }

    async fn register(&mut self, name: &str, key_byte: u8) -> ClientId {
        let payload = RegisterRequest {
            name: ClientName::new(name).unwrap(),
            public_key: PublicKey::from_bytes([key_byte; PUBLIC_KEY_SIZE]),
        }
        .encode();
        let response = self.call(RequestCode::Register, payload).await;
        assert_eq!(response.code, 2100);
        assert_eq!(response.payload.len(), 16);
        self.id = ClientId::from_slice(&response.payload).unwrap();
        self.id
    }

    async fn send(&mut self, to: ClientId, message_type: MessageType, content: &[u8]) -> Frame {
        let payload = SendMessageRequest {
            to,
            message_type,
            content: content.to_vec(),
        }
        .encode()
        .unwrap();
        self.call(RequestCode::SendMessage, payload).await
    }
}

#[tokio::test]
async fn register_and_list_users() {
    let (addr, shutdown) = start_relay().await;

    let mut alice = TestClient::connect(addr).await;
    let alice_id = alice.register("Alice", 0xaa).await;

    let mut observer = TestClient::connect(addr).await;
    let response = observer.call(RequestCode::ListUsers, Vec::new()).await;
    assert_eq!(response.code, 2101);
    assert_eq!(response.payload.len(), 271);
    assert_eq!(response.client_id, ClientId::ZERO);

    let entries = payload::decode_directory(&response.payload).unwrap();
    assert_eq!(entries[0].id, alice_id);
    assert_eq!(entries[0].name.as_str(), "Alice");

    shutdown.trigger();
}

#[tokio::test]
async fn key_lookup_hit_and_miss() {
    let (addr, shutdown) = start_relay().await;

    let mut bob = TestClient::connect(addr).await;
    let bob_id = bob.register("Bob", 0xbb).await;

    let mut alice = TestClient::connect(addr).await;
    let response = alice
        .call(RequestCode::GetPublicKey, bob_id.as_bytes().to_vec())
        .await;
    assert_eq!(response.code, 2102);
    let key = PublicKeyResponse::decode(&response.payload).unwrap();
    assert_eq!(key.id, bob_id);
    assert_eq!(key.public_key, PublicKey::from_bytes([0xbb; PUBLIC_KEY_SIZE]));

    let response = alice
        .call(
            RequestCode::GetPublicKey,
            ClientId::generate().as_bytes().to_vec(),
        )
        .await;
    assert_eq!(response.code, 9000);
    assert!(response.payload.is_empty());

    shutdown.trigger();
}

#[tokio::test]
async fn text_delivery_across_connections() {
    let (addr, shutdown) = start_relay().await;

    let mut alice = TestClient::connect(addr).await;
    let alice_id = alice.register("Alice", 1).await;
    let mut bob = TestClient::connect(addr).await;
    let bob_id = bob.register("Bob", 2).await;

    let response = alice.send(bob_id, MessageType::Text, b"hello bob").await;
    assert_eq!(response.code, 2103);
    let stored = SendMessageResponse::decode(&response.payload).unwrap();
    assert_eq!(stored.to, bob_id);
    assert_eq!(stored.message_id, MessageId(1));

    let response = bob.call(RequestCode::FetchMessages, Vec::new()).await;
    assert_eq!(response.code, 2104);
    let records = payload::decode_mailbox(&response.payload).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].from, alice_id);
    assert_eq!(records[0].message_type, MessageType::Text);
    assert_eq!(records[0].content, b"hello bob");

    let response = bob.call(RequestCode::FetchMessages, Vec::new()).await;
    assert_eq!(response.code, 2104);
    assert!(response.payload.is_empty());

    shutdown.trigger();
}

#[tokio::test]
async fn unknown_code_keeps_connection_open() {
    let (addr, shutdown) = start_relay().await;

    let mut client = TestClient::connect(addr).await;
    let response = client.call_raw(999, Vec::new()).await;
    assert_eq!(response.code, 9000);
    assert!(response.payload.is_empty());

    let response = client.call(RequestCode::ListUsers, Vec::new()).await;
    assert_eq!(response.code, 2101);

    shutdown.trigger();
}

#[tokio::test]
async fn broken_connection_does_not_affect_others() {
    let (addr, shutdown) = start_relay().await;

    let mut survivor = TestClient::connect(addr).await;
    survivor.register("Survivor", 3).await;

    {
        let mut broken = TcpStream::connect(addr).await.unwrap();
        broken.write_all(&[0u8; 7]).await.unwrap();
    }

    let response = survivor.call(RequestCode::ListUsers, Vec::new()).await;
    assert_eq!(response.code, 2101);

    shutdown.trigger();
}

#[tokio::test]
async fn oversized_send_gets_error_and_connection_survives() {
    let config = ServerConfig::new("127.0.0.1", 0).with_max_payload(64);
    let (addr, shutdown) = start_relay_with(config).await;

    let mut alice = TestClient::connect(addr).await;
    alice.register("Alice", 1).await;
    let mut bob = TestClient::connect(addr).await;
    let bob_id = bob.register("Bob", 2).await;

    let response = alice.send(bob_id, MessageType::File, &[0x5a; 200]).await;
    assert_eq!(response.code, 9000);
    assert_eq!(response.version, PROTOCOL_VERSION);
    assert!(response.payload.is_empty());

    let response = alice.send(bob_id, MessageType::Text, b"small").await;
    assert_eq!(response.code, 2103);

    let response = bob.call(RequestCode::FetchMessages, Vec::new()).await;
    let records = payload::decode_mailbox(&response.payload).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].content, b"small");

    shutdown.trigger();
}
