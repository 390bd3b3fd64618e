//! End-to-end session flows over real TCP.
//!
//! Spins up a full server on an ephemeral port and drives it with a
//! minimal protocol client: handshake, register, login, change password,
//! logout, plus the encryption-enforcement and unsupported-opcode paths.

use bytes::BytesMut;
use holdfast_core::MemoryRepository;
use holdfast_crypto::{Keypair, SessionKey, seal_field};
use holdfast_proto::{
    Frame, FrameFlags, Opcode, Packet,
    directive::{Advice, ControlType, Reason},
    packet::{Body, CredentialsPacket, CredsUpdatePacket, HandshakePacket},
};
use holdfast_server::{Server, ServerConfig, SystemEnv};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

/// Minimal protocol client for tests.
struct TestClient {
    stream: TcpStream,
    buf: BytesMut,
    key: Option<SessionKey>,
    next_seq: u32,
}

impl TestClient {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        Self { stream, buf: BytesMut::with_capacity(4096), key: None, next_seq: 100 }
    }

    fn seq(&mut self) -> u32 {
        self.next_seq += 1;
        self.next_seq
    }

    async fn send(&mut self, packet: &Packet) {
        let mut wire = vec![0u8; packet.wire_len()];
        packet.encode_into(&mut wire).expect("encode");
        self.stream.write_all(&wire).await.expect("write");
    }

    async fn recv(&mut self) -> Packet {
        loop {
            match Frame::decode(&self.buf) {
                Ok(frame) => {
                    use bytes::Buf as _;
                    let n = frame.wire_len();
                    self.buf.advance(n);
                    return Packet::from_frame(&frame).expect("parse reply");
                },
                Err(err) if err.is_incomplete() => {
                    let read = self.stream.read_buf(&mut self.buf).await.expect("read");
                    assert!(read > 0, "server closed the connection mid-reply");
                },
                Err(err) => unreachable!("server sent a corrupt frame: {err}"),
            }
        }
    }

    /// Complete the handshake and install the derived session key.
    async fn handshake(&mut self) {
        let keypair = Keypair::from_seed(rand::random());
        let seq = self.seq();

        self.send(&Packet {
            opcode: Opcode::Handshake.to_u16(),
            flags: FrameFlags::default(),
            sequence_id: seq,
            body: Body::Handshake(HandshakePacket {
                public_key: keypair.public_bytes().to_vec(),
            }),
        })
        .await;

        let reply = self.recv().await;
        assert_eq!(reply.sequence_id, seq);
        let Body::Handshake(body) = reply.body else {
            unreachable!("handshake reply class");
        };
        self.key = Some(keypair.agree(&body.public_key).expect("agree"));
    }

    fn seal(&self, plaintext: &str) -> String {
        let key = self.key.as_ref().expect("handshake first");
        seal_field(key, plaintext, rand::random())
    }

    /// Send sealed credentials under `opcode`, return the directive reply.
    async fn credentials_op(
        &mut self,
        opcode: Opcode,
        username: &str,
        password: &str,
    ) -> (ControlType, Reason, Advice, u32) {
        let seq = self.seq();
        let packet = Packet {
            opcode: opcode.to_u16(),
            flags: FrameFlags::default().with_encrypted(true),
            sequence_id: seq,
            body: Body::Credentials(CredentialsPacket {
                username: self.seal(username),
                password: self.seal(password),
            }),
        };
        self.send(&packet).await;
        self.expect_directive().await
    }

    async fn expect_directive(&mut self) -> (ControlType, Reason, Advice, u32) {
        let reply = self.recv().await;
        let Body::Directive(body) = reply.body else {
            unreachable!("expected a directive, got {reply:?}");
        };
        (body.control, body.reason, body.advice, reply.sequence_id)
    }
}

async fn spawn_server() -> (std::net::SocketAddr, holdfast_server::ShutdownHandle) {
    let config = ServerConfig { bind_address: "127.0.0.1:0".to_string(), ..Default::default() };
    let server = Server::bind(SystemEnv::new(), MemoryRepository::new(), config)
        .await
        .expect("bind");
    let addr = server.local_addr().expect("local addr");
    let handle = server.shutdown_handle();

    tokio::spawn(async move {
        server.run().await.expect("server run");
    });

    (addr, handle)
}

#[tokio::test]
async fn handshake_then_register_then_login() {
    // S1 + S2
    let (addr, _handle) = spawn_server().await;
    let mut client = TestClient::connect(addr).await;

    client.handshake().await;
    assert!(client.key.is_some(), "both sides hold a session key");

    let (control, reason, _, seq) =
        client.credentials_op(Opcode::Register, "alice", "Str0ng!Pass").await;
    assert_eq!((control, reason), (ControlType::Ack, Reason::None));
    assert_eq!(seq, client.next_seq);

    let (control, reason, _, _) =
        client.credentials_op(Opcode::Login, "alice", "Str0ng!Pass").await;
    assert_eq!((control, reason), (ControlType::Ack, Reason::None));
}

#[tokio::test]
async fn change_password_flow() {
    // S4: rotate, then the old password fails and the new one works
    let (addr, _handle) = spawn_server().await;

    let mut client = TestClient::connect(addr).await;
    client.handshake().await;
    client.credentials_op(Opcode::Register, "alice", "Str0ng!Pass").await;
    client.credentials_op(Opcode::Login, "alice", "Str0ng!Pass").await;

    let seq = client.seq();
    let packet = Packet {
        opcode: Opcode::ChangePassword.to_u16(),
        flags: FrameFlags::default().with_encrypted(true),
        sequence_id: seq,
        body: Body::CredsUpdate(CredsUpdatePacket {
            current_password: client.seal("Str0ng!Pass"),
            new_password: client.seal("New0nger!Pass"),
        }),
    };
    client.send(&packet).await;
    let (control, reason, _, reply_seq) = client.expect_directive().await;
    assert_eq!((control, reason), (ControlType::Ack, Reason::None));
    assert_eq!(reply_seq, seq);

    // Fresh session: old password refused, new password accepted
    let mut second = TestClient::connect(addr).await;
    second.handshake().await;
    let (_, reason, advice, _) =
        second.credentials_op(Opcode::Login, "alice", "Str0ng!Pass").await;
    assert_eq!(reason, Reason::Unauthenticated);
    assert_eq!(advice, Advice::Reauthenticate);

    let (control, reason, _, _) =
        second.credentials_op(Opcode::Login, "alice", "New0nger!Pass").await;
    assert_eq!((control, reason), (ControlType::Ack, Reason::None));
}

#[tokio::test]
async fn logout_sends_disconnect_and_closes() {
    // S6
    let (addr, _handle) = spawn_server().await;
    let mut client = TestClient::connect(addr).await;

    client.handshake().await;
    client.credentials_op(Opcode::Register, "alice", "Str0ng!Pass").await;
    client.credentials_op(Opcode::Login, "alice", "Str0ng!Pass").await;

    let seq = client.seq();
    client
        .send(&Packet {
            opcode: Opcode::Logout.to_u16(),
            flags: FrameFlags::default(),
            sequence_id: seq,
            body: Body::Credentials(CredentialsPacket::default()),
        })
        .await;

    let (control, reason, _, reply_seq) = client.expect_directive().await;
    assert_eq!(control, ControlType::Disconnect);
    assert_eq!(reason, Reason::ClientQuit);
    assert_eq!(reply_seq, seq);

    // The server closes the socket after the directive
    let mut probe = [0u8; 16];
    let closed = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            match client.stream.read(&mut probe).await {
                Ok(0) => break,
                Ok(_) => {},
                Err(_) => break,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "socket must close after logout");
}

#[tokio::test]
async fn plaintext_frame_to_sealed_handler_is_refused() {
    // S5: requires_encryption=true + ENCRYPTED=0 → NOT_ENCRYPTED, no
    // handler invocation (no account row is consulted)
    let (addr, _handle) = spawn_server().await;
    let mut client = TestClient::connect(addr).await;
    client.handshake().await;

    let seq = client.seq();
    client
        .send(&Packet {
            opcode: Opcode::Login.to_u16(),
            flags: FrameFlags::default(),
            sequence_id: seq,
            body: Body::Credentials(CredentialsPacket {
                username: "alice".into(),
                password: "Str0ng!Pass".into(),
            }),
        })
        .await;

    let (control, reason, advice, reply_seq) = client.expect_directive().await;
    assert_eq!(control, ControlType::Error);
    assert_eq!(reason, Reason::NotEncrypted);
    assert_eq!(advice, Advice::DoNotRetry);
    assert_eq!(reply_seq, seq);
}

#[tokio::test]
async fn login_before_handshake_is_gated() {
    let (addr, _handle) = spawn_server().await;
    let mut client = TestClient::connect(addr).await;

    let seq = client.seq();
    client
        .send(&Packet {
            opcode: Opcode::Login.to_u16(),
            flags: FrameFlags::default(),
            sequence_id: seq,
            body: Body::Credentials(CredentialsPacket {
                username: "alice".into(),
                password: "Str0ng!Pass".into(),
            }),
        })
        .await;

    let (control, reason, _, _) = client.expect_directive().await;
    assert_eq!(control, ControlType::Error);
    assert_eq!(reason, Reason::Unauthenticated);
}

#[tokio::test]
async fn unknown_opcode_is_unsupported() {
    let (addr, _handle) = spawn_server().await;
    let mut client = TestClient::connect(addr).await;

    let seq = client.seq();
    client
        .send(&Packet {
            opcode: 0x0999,
            flags: FrameFlags::default(),
            sequence_id: seq,
            body: Body::Handshake(HandshakePacket { public_key: vec![1; 32] }),
        })
        .await;

    let (control, reason, advice, reply_seq) = client.expect_directive().await;
    assert_eq!(control, ControlType::Error);
    assert_eq!(reason, Reason::UnsupportedPacket);
    assert_eq!(advice, Advice::DoNotRetry);
    assert_eq!(reply_seq, seq);
}

#[tokio::test]
async fn corrupt_magic_disconnects_without_directive() {
    let (addr, _handle) = spawn_server().await;
    let mut client = TestClient::connect(addr).await;
    client.handshake().await;

    // 13 bytes of garbage magic
    client.stream.write_all(&[0xFF; 13]).await.expect("write");

    let mut probe = [0u8; 64];
    let outcome = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            match client.stream.read(&mut probe).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {},
            }
        }
    })
    .await;
    assert!(outcome.is_ok(), "server must drop the connection on corrupt framing");
}

#[tokio::test]
async fn wrong_password_five_times_locks_account() {
    // S3 over the wire (expiry of the window is unit-tested with a
    // controlled clock)
    let (addr, _handle) = spawn_server().await;
    let mut client = TestClient::connect(addr).await;

    client.handshake().await;
    client.credentials_op(Opcode::Register, "alice", "Str0ng!Pass").await;

    for _ in 0..5 {
        let (_, reason, _, _) =
            client.credentials_op(Opcode::Login, "alice", "Wr0ng!Pass1").await;
        assert_eq!(reason, Reason::Unauthenticated);
    }

    let (_, reason, advice, _) =
        client.credentials_op(Opcode::Login, "alice", "Str0ng!Pass").await;
    assert_eq!(reason, Reason::AccountLocked);
    assert_eq!(advice, Advice::BackoffRetry);
}

#[tokio::test]
async fn graceful_shutdown_drains_quickly() {
    let (addr, handle) = spawn_server().await;
    let mut client = TestClient::connect(addr).await;
    client.handshake().await;

    handle.shutdown();

    // The connection is torn down within the grace deadline
    let mut probe = [0u8; 16];
    let closed = tokio::time::timeout(std::time::Duration::from_secs(6), async {
        loop {
            match client.stream.read(&mut probe).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {},
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "connections must close during shutdown drain");
}
