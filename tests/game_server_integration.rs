use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use lodestone::config::ServerConfig;
use lodestone::context::Context;
use lodestone::core::Clock;
use lodestone::diagnostics::Diagnostics;
use lodestone::network::codec::{self, DEFAULT_MAX_FRAME_SIZE};
use lodestone::network::ddos::{IpBlockList, IpReputation};
use lodestone::network::read_framed_packet;
use lodestone::protocol::types::{Class, DisconnectReason, Direction, Gender};
use lodestone::protocol::{client, server, ClientPacket, ServerPacket};
use lodestone::servers::game::GameServer;
use lodestone::world::lobby::LobbyWorld;
use lodestone::world::World;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

fn test_config() -> ServerConfig {
    ServerConfig {
        tick_interval_ms: 5,
        ip_block_secs: 0,
        ..Default::default()
    }
}

async fn start_test_server(config: ServerConfig) -> (SocketAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let ctx = Context::new(
        config,
        Clock::new(),
        Arc::new(LobbyWorld::new(true)) as Arc<dyn World>,
        Arc::new(IpBlockList::new()) as Arc<dyn IpReputation>,
        Diagnostics::spawn_forwarder(),
    )
    .unwrap();
    let server = GameServer::from_listener(Arc::new(ctx), listener);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        server
            .run(async {
                stop_rx.await.ok();
            })
            .await
            .unwrap();
    });

    (addr, stop_tx)
}

async fn send(stream: &mut TcpStream, packet: impl Into<ClientPacket>) {
    let bytes = codec::encode_to_bytes(&packet.into()).unwrap();
    stream.write_all(&bytes).await.unwrap();
}

async fn recv(stream: &mut TcpStream) -> ServerPacket {
    tokio::time::timeout(READ_TIMEOUT, read_framed_packet::<ServerPacket>(stream, DEFAULT_MAX_FRAME_SIZE))
        .await
        .expect("timed out waiting for a packet")
        .unwrap()
}

/// Reads until a packet matching `pred` arrives.
async fn recv_until(stream: &mut TcpStream, pred: impl Fn(&ServerPacket) -> bool) -> ServerPacket {
    loop {
        let packet = recv(stream).await;
        if pred(&packet) {
            return packet;
        }
    }
}

async fn connect_and_login(addr: SocketAddr, account_id: &str) -> TcpStream {
    let mut client = TcpStream::connect(addr).await.unwrap();
    assert_eq!(recv(&mut client).await, ServerPacket::from(server::Connected {}));

    send(&mut client, client::ClientVersion::default()).await;
    assert_eq!(
        recv(&mut client).await,
        ServerPacket::from(server::ClientVersion { result: 1 })
    );

    send(
        &mut client,
        client::Login {
            account_id: account_id.to_string(),
            password: "secret1".to_string(),
        },
    )
    .await;
    assert!(matches!(recv(&mut client).await, ServerPacket::LoginSuccess(_)));
    client
}

#[tokio::test]
async fn test_connected_is_first_packet() {
    let (addr, _stop) = start_test_server(test_config()).await;
    let mut client = TcpStream::connect(addr).await.unwrap();
    assert_eq!(recv(&mut client).await, ServerPacket::from(server::Connected {}));
}

#[tokio::test]
async fn test_keep_alive_echo() {
    let (addr, _stop) = start_test_server(test_config()).await;
    let mut client = TcpStream::connect(addr).await.unwrap();
    recv(&mut client).await;

    send(&mut client, client::KeepAlive { time: 123_456 }).await;
    assert_eq!(
        recv(&mut client).await,
        ServerPacket::from(server::KeepAlive { time: 123_456 })
    );
}

#[tokio::test]
async fn test_login_create_character_and_walk() {
    let (addr, _stop) = start_test_server(test_config()).await;
    let mut client = connect_and_login(addr, "walker").await;

    send(
        &mut client,
        client::NewCharacter {
            name: "Walker".to_string(),
            gender: Gender::Male,
            class: Class::Warrior,
        },
    )
    .await;
    let created = recv_until(&mut client, |p| matches!(p, ServerPacket::NewCharacterSuccess(_))).await;
    let ServerPacket::NewCharacterSuccess(created) = created else {
        unreachable!()
    };

    send(
        &mut client,
        client::StartGame {
            character_index: created.character.index,
        },
    )
    .await;
    let start = recv_until(&mut client, |p| matches!(p, ServerPacket::StartGame(_))).await;
    assert_eq!(
        start,
        ServerPacket::from(server::StartGame {
            result: server::START_GAME_OK,
            resolution: 1280,
        })
    );

    send(
        &mut client,
        client::Walk {
            direction: Direction::Down,
        },
    )
    .await;
    let walked = recv_until(&mut client, |p| matches!(p, ServerPacket::ObjectWalk(_))).await;
    let ServerPacket::ObjectWalk(walked) = walked else {
        unreachable!()
    };
    assert_eq!(walked.direction, Direction::Down);
}

#[tokio::test]
async fn test_wrong_version_is_refused() {
    let config = ServerConfig {
        check_version: true,
        version_hashes: vec!["0a0b0c".to_string()],
        ..test_config()
    };
    let (addr, _stop) = start_test_server(config).await;
    let mut client = TcpStream::connect(addr).await.unwrap();
    recv(&mut client).await;

    send(
        &mut client,
        client::ClientVersion {
            version_hash: vec![1, 2, 3],
        },
    )
    .await;
    assert_eq!(
        recv(&mut client).await,
        ServerPacket::from(server::ClientVersion { result: 0 })
    );
}

#[tokio::test]
async fn test_duplicate_login_kicks_first_client() {
    let (addr, _stop) = start_test_server(test_config()).await;
    let mut first = connect_and_login(addr, "twice").await;
    let _second = connect_and_login(addr, "twice").await;

    assert_eq!(
        recv(&mut first).await,
        ServerPacket::from(server::Disconnect {
            reason: DisconnectReason::DuplicateLogin
        })
    );
}

#[tokio::test]
async fn test_flood_closes_connection() {
    let config = ServerConfig {
        max_packet: 5,
        disconnect_grace_ms: 0,
        ..test_config()
    };
    let (addr, _stop) = start_test_server(config).await;
    let mut client = TcpStream::connect(addr).await.unwrap();
    recv(&mut client).await;

    let mut burst = Vec::new();
    for i in 0..20 {
        let packet = ClientPacket::from(client::KeepAlive { time: i });
        burst.extend_from_slice(&codec::encode_to_bytes(&packet).unwrap());
    }
    client.write_all(&burst).await.unwrap();

    // Whatever was echoed before the guard tripped, the socket ends closed.
    let mut sink = Vec::new();
    let read = tokio::time::timeout(READ_TIMEOUT, client.read_to_end(&mut sink)).await;
    assert!(read.is_ok(), "connection was not closed");
}

#[tokio::test]
async fn test_recently_connected_ip_is_refused() {
    let config = ServerConfig {
        ip_block_secs: 60,
        ..test_config()
    };
    let (addr, _stop) = start_test_server(config).await;
    let mut first = TcpStream::connect(addr).await.unwrap();
    recv(&mut first).await;

    let mut second = TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 4];
    let read = tokio::time::timeout(READ_TIMEOUT, second.read(&mut buf))
        .await
        .expect("refused connection was left open");
    assert!(matches!(read, Ok(0) | Err(_)));
}

#[tokio::test]
async fn test_shutdown_sends_server_closing() {
    let (addr, stop) = start_test_server(test_config()).await;
    let mut client = TcpStream::connect(addr).await.unwrap();
    recv(&mut client).await;

    stop.send(()).unwrap();
    assert_eq!(
        recv(&mut client).await,
        ServerPacket::from(server::Disconnect {
            reason: DisconnectReason::ServerClosing
        })
    );
}
