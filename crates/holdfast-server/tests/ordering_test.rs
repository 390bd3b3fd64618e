//! Ordering guarantees.
//!
//! Frames from one connection are handled in arrival order and replies
//! come back in the same order; separate connections make independent
//! progress.

use bytes::{Buf as _, BytesMut};
use holdfast_core::MemoryRepository;
use holdfast_crypto::{Keypair, SessionKey, seal_field};
use holdfast_proto::{
    Frame, FrameFlags, Opcode, Packet,
    directive::ControlType,
    packet::{Body, CredentialsPacket, HandshakePacket},
};
use holdfast_server::{Server, ServerConfig, SystemEnv};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

async fn spawn_server() -> std::net::SocketAddr {
    let config = ServerConfig { bind_address: "127.0.0.1:0".to_string(), ..Default::default() };
    let server = Server::bind(SystemEnv::new(), MemoryRepository::new(), config)
        .await
        .expect("bind");
    let addr = server.local_addr().expect("local addr");

    tokio::spawn(async move {
        server.run().await.expect("server run");
    });

    addr
}

async fn handshake(stream: &mut TcpStream, buf: &mut BytesMut) -> SessionKey {
    let keypair = Keypair::from_seed(rand::random());

    let packet = Packet {
        opcode: Opcode::Handshake.to_u16(),
        flags: FrameFlags::default(),
        sequence_id: 1,
        body: Body::Handshake(HandshakePacket { public_key: keypair.public_bytes().to_vec() }),
    };
    let mut wire = vec![0u8; packet.wire_len()];
    packet.encode_into(&mut wire).expect("encode");
    stream.write_all(&wire).await.expect("write");

    let reply = recv_packet(stream, buf).await;
    let Body::Handshake(body) = reply.body else {
        unreachable!("handshake reply class");
    };
    keypair.agree(&body.public_key).expect("agree")
}

async fn recv_packet(stream: &mut TcpStream, buf: &mut BytesMut) -> Packet {
    loop {
        match Frame::decode(buf) {
            Ok(frame) => {
                let n = frame.wire_len();
                buf.advance(n);
                return Packet::from_frame(&frame).expect("parse");
            },
            Err(err) if err.is_incomplete() => {
                let read = stream.read_buf(buf).await.expect("read");
                assert!(read > 0, "server closed unexpectedly");
            },
            Err(err) => unreachable!("corrupt server frame: {err}"),
        }
    }
}

fn sealed_register(key: &SessionKey, username: &str, sequence_id: u32) -> Vec<u8> {
    let packet = Packet {
        opcode: Opcode::Register.to_u16(),
        flags: FrameFlags::default().with_encrypted(true),
        sequence_id,
        body: Body::Credentials(CredentialsPacket {
            username: seal_field(key, username, rand::random()),
            password: seal_field(key, "Str0ng!Pass", rand::random()),
        }),
    };
    let mut wire = vec![0u8; packet.wire_len()];
    packet.encode_into(&mut wire).expect("encode");
    wire
}

#[tokio::test]
async fn pipelined_requests_reply_in_arrival_order() {
    let addr = spawn_server().await;
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    let mut buf = BytesMut::with_capacity(4096);

    let key = handshake(&mut stream, &mut buf).await;

    // Fire five registrations back-to-back without reading any reply
    // (five is also the register handler's per-minute budget)
    let sequence_ids: Vec<u32> = (10..15).collect();
    for &seq in &sequence_ids {
        let wire = sealed_register(&key, &format!("player-{seq}"), seq);
        stream.write_all(&wire).await.expect("write");
    }

    // Replies arrive strictly in request order, each an ACK
    for &seq in &sequence_ids {
        let reply = recv_packet(&mut stream, &mut buf).await;
        assert_eq!(reply.sequence_id, seq, "replies must preserve arrival order");
        let Body::Directive(body) = reply.body else {
            unreachable!("directive reply");
        };
        assert_eq!(body.control, ControlType::Ack);
    }
}

#[tokio::test]
async fn interleaved_connections_progress_independently() {
    let addr = spawn_server().await;

    let mut tasks = Vec::new();
    for index in 0..4u32 {
        tasks.push(tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.expect("connect");
            let mut buf = BytesMut::with_capacity(4096);
            let key = handshake(&mut stream, &mut buf).await;

            let wire = sealed_register(&key, &format!("user-{index}"), 40 + index);
            stream.write_all(&wire).await.expect("write");

            let reply = recv_packet(&mut stream, &mut buf).await;
            assert_eq!(reply.sequence_id, 40 + index);
            let Body::Directive(body) = reply.body else {
                unreachable!("directive reply");
            };
            assert_eq!(body.control, ControlType::Ack);
        }));
    }

    for task in tasks {
        tokio::time::timeout(std::time::Duration::from_secs(30), task)
            .await
            .expect("connections must not serialize behind each other")
            .expect("client task ok");
    }
}
