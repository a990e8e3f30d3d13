//! Integration tests for the Connection module against a scripted loopback peer.
//!
//! The fake peer runs on a plain blocking socket in its own thread and speaks
//! frames produced by the `bitcoin` crate's reference encoder, while the
//! connection under test is driven by a mio poll loop exactly as a crawl would.

use bitcoin::consensus::encode;
use bitcoin::p2p::message::{NetworkMessage, RawNetworkMessage};
use bitcoin::p2p::message_network::VersionMessage;
use bitcoin::p2p::{Magic, ServiceFlags};
use bitcoin_seeder_connection::wire::{self, Command, HEADER_SIZE};
use bitcoin_seeder_connection::{
    connect, Address, ConnectionConfiguration, ConnectionError, ConnectionState, PeerEvent,
    TcpConnection,
};
use mio::{Events, Interest, Poll, Token};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

const NONCE: u64 = 42;

fn raw(message: NetworkMessage) -> Vec<u8> {
    encode::serialize(&RawNetworkMessage::new(Magic::BITCOIN, message))
}

fn read_frame(stream: &mut TcpStream) -> (Command, Vec<u8>) {
    let mut header = [0u8; HEADER_SIZE];
    stream.read_exact(&mut header).unwrap();
    let header = wire::decode_header(&header).unwrap();
    assert_eq!(header.magic, Magic::BITCOIN);
    let mut payload = vec![0u8; header.payload_length as usize];
    stream.read_exact(&mut payload).unwrap();
    (header.command, payload)
}

/// Accept one connection and play a well behaved node.
///
/// Returns every frame the crawler sent us.
fn fake_peer(listener: TcpListener, gossip: Vec<SocketAddr>) -> Vec<(Command, Vec<u8>)> {
    let (mut stream, remote) = listener.accept().unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();

    let mut received = vec![read_frame(&mut stream)];

    let version = VersionMessage::new(
        ServiceFlags::NETWORK | ServiceFlags::WITNESS,
        1_700_000_000,
        bitcoin::p2p::Address::new(&remote, ServiceFlags::NONE),
        bitcoin::p2p::Address::new(&stream.local_addr().unwrap(), ServiceFlags::NETWORK),
        NONCE,
        "/Satoshi:27.0.0/".to_string(),
        840_000,
    );
    let records = gossip
        .iter()
        .map(|addr| (1_700_000_000u32, bitcoin::p2p::Address::new(addr, ServiceFlags::NETWORK)))
        .collect();

    let mut script = raw(NetworkMessage::Version(version));
    script.extend(raw(NetworkMessage::Verack));
    script.extend(raw(NetworkMessage::Ping(NONCE)));
    script.extend(raw(NetworkMessage::Addr(records)));
    stream.write_all(&script).unwrap();

    // Expect verack and pong back, then hang up.
    received.push(read_frame(&mut stream));
    received.push(read_frame(&mut stream));
    received
}

#[test]
fn test_crawl_single_peer() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let peer: Address = listener.local_addr().unwrap().into();
    let gossip: Vec<SocketAddr> = vec![
        "203.0.113.5:8333".parse().unwrap(),
        "[2001:db8::7]:8333".parse().unwrap(),
    ];
    let expected_gossip = gossip.clone();
    let fake = thread::spawn(move || fake_peer(listener, expected_gossip));

    let mut poll = Poll::new().unwrap();
    let mut stream = connect(&peer).unwrap();
    poll.registry()
        .register(&mut stream, Token(0), Interest::READABLE | Interest::WRITABLE)
        .unwrap();
    let mut connection = TcpConnection::new(stream, peer, ConnectionConfiguration::default());
    connection.mark_connecting();

    let mut events = Events::with_capacity(8);
    let mut reported = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(10);
    let outcome = 'crawl: loop {
        assert!(Instant::now() < deadline, "crawl did not finish in time");
        poll.poll(&mut events, Some(Duration::from_millis(100)))
            .unwrap();
        for event in events.iter() {
            if event.is_writable() {
                if let Err(err) = connection.on_writable() {
                    break 'crawl err;
                }
            }
            if event.is_readable() || event.is_read_closed() {
                let result = connection.on_readable(&mut reported);
                if let Err(err) = connection.send_buffer() {
                    break 'crawl err;
                }
                if let Err(err) = result {
                    break 'crawl err;
                }
            }
        }
    };

    assert!(matches!(outcome, ConnectionError::PeerClosed));
    assert_eq!(connection.state(), ConnectionState::VersionSent);
    assert!(connection.handshake_complete());

    match &reported[..] {
        [PeerEvent::Handshake(handshake), PeerEvent::Addresses(addresses)] => {
            assert_eq!(handshake.user_agent, "/Satoshi:27.0.0/");
            assert_eq!(handshake.start_height, 840_000);
            assert_eq!(handshake.version, 70001);
            let sockets: Vec<SocketAddr> = addresses.iter().map(Address::socket_addr).collect();
            assert_eq!(sockets, gossip);
        }
        other => panic!("unexpected reports {other:?}"),
    }

    let sent = fake.join().unwrap();
    let commands: Vec<&str> = sent.iter().map(|(command, _)| command.as_str()).collect();
    assert_eq!(commands, vec!["version", "verack", "pong"]);
    assert_eq!(sent[2].1, NONCE.to_le_bytes().to_vec());

    let version = wire::decode_version(&sent[0].1, 70015).unwrap();
    assert_eq!(version.addr_you, peer);
    assert_eq!(version.user_agent, bitcoin_seeder_connection::default_user_agent().as_str());
}

#[test]
fn test_refused_connect() {
    // Bind then drop to find a port nobody listens on.
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let peer: Address = SocketAddr::from(([127, 0, 0, 1], port)).into();

    let mut poll = Poll::new().unwrap();
    let mut stream = match connect(&peer) {
        Ok(stream) => stream,
        // Some platforms refuse synchronously.
        Err(ConnectionError::Io(_)) => return,
        Err(err) => panic!("unexpected connect error {err}"),
    };
    poll.registry()
        .register(&mut stream, Token(0), Interest::WRITABLE)
        .unwrap();
    let mut connection = TcpConnection::new(stream, peer, ConnectionConfiguration::default());
    connection.mark_connecting();

    let mut events = Events::with_capacity(4);
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        assert!(Instant::now() < deadline, "refusal was never reported");
        poll.poll(&mut events, Some(Duration::from_millis(100)))
            .unwrap();
        if events.iter().next().is_none() {
            continue;
        }
        match connection.on_writable() {
            Err(ConnectionError::Io(_)) => break,
            Ok(true) => continue,
            other => panic!("expected refused connect, got {other:?}"),
        }
    }
    assert!(!connection.handshake_complete());
}
