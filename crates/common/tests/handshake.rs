//! Integration tests for the pinned TLS handshake

mod common;

use std::time::Duration;

use ::common::crypto::TrustSet;
use ::common::transport::{self, HandshakeError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use common::{pipe, TestPeer, OBSERVE_TIMEOUT};

#[tokio::test]
async fn test_mutually_trusted_peers_connect() {
    common::init_tracing();
    let server = TestPeer::new("server");
    let client = TestPeer::new("client");

    let server_tls = server.tls([client.identity]);
    let client_tls = client.tls([server.identity]);
    let (server_raw, client_raw) = pipe();

    let (server_side, client_side) = tokio::join!(
        server_tls.wrap_as_server(server_raw),
        client_tls.wrap_as_client(client_raw)
    );
    let mut server_conn = server_side.unwrap();
    let mut client_conn = client_side.unwrap();

    assert_eq!(server_conn.peer_identity(), client.identity);
    assert_eq!(client_conn.peer_identity(), server.identity);

    client_conn.write_all(b"test 1234").await.unwrap();
    client_conn.close().await.unwrap();

    let mut received = Vec::new();
    server_conn.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, b"test 1234");
}

#[tokio::test]
async fn test_empty_trust_set_rejects_valid_peer() {
    let server = TestPeer::new("server");
    let client = TestPeer::new("client");

    let server_tls = server.tls(std::iter::empty());
    let client_tls = client.tls([server.identity]);
    let (server_raw, client_raw) = pipe();

    let (server_side, client_side) = tokio::join!(
        server_tls.wrap_as_server(server_raw),
        client_tls.wrap_as_client(client_raw)
    );

    match server_side {
        Err(HandshakeError::UntrustedPeer(identity)) => assert_eq!(identity, client.identity),
        other => panic!("expected an identity rejection, got {:?}", other),
    }

    // The client finished its half of the handshake, but the server tore the
    // connection down, so nothing can be read from it
    if let Ok(mut conn) = client_side {
        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(OBSERVE_TIMEOUT, conn.read(&mut buf))
            .await
            .expect("rejected connection should be closed promptly");
        assert!(matches!(read, Ok(0) | Err(_)));
    }
}

#[tokio::test]
async fn test_client_rejects_unpinned_server() {
    let server = TestPeer::new("server");
    let client = TestPeer::new("client");
    let impostor = TestPeer::new("impostor");

    let server_tls = server.tls([client.identity]);
    let client_tls = client.tls([impostor.identity]);
    let (server_raw, client_raw) = pipe();

    let (_, client_side) = tokio::join!(
        server_tls.wrap_as_server(server_raw),
        client_tls.wrap_as_client(client_raw)
    );

    let err = client_side.unwrap_err();
    assert!(err.is_untrusted());
    assert!(matches!(err, HandshakeError::UntrustedPeer(identity) if identity == server.identity));
}

#[tokio::test]
async fn test_self_trust() {
    let node = TestPeer::new("single-operator");

    let server_tls = node.tls([node.identity]);
    let client_tls = node.tls([node.identity]);
    let (server_raw, client_raw) = pipe();

    let (server_side, client_side) = tokio::join!(
        server_tls.wrap_as_server(server_raw),
        client_tls.wrap_as_client(client_raw)
    );

    assert_eq!(server_side.unwrap().peer_identity(), node.identity);
    assert_eq!(client_side.unwrap().peer_identity(), node.identity);
    assert_eq!(server_tls.local_identity(), node.identity);
}

#[tokio::test]
async fn test_garbage_is_a_handshake_error() {
    let server = TestPeer::new("server");
    let server_tls = server.tls([server.identity]);
    let (server_raw, mut garbage_raw) = pipe();

    garbage_raw
        .write_all(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n")
        .await
        .unwrap();

    let err = server_tls.wrap_as_server(server_raw).await.unwrap_err();
    assert!(matches!(err, HandshakeError::Tls(_)), "got {:?}", err);
    assert!(!err.is_untrusted());
}

#[tokio::test]
async fn test_truncated_handshake_is_a_handshake_error() {
    let server = TestPeer::new("server");
    let server_tls = server.tls([server.identity]);
    let (server_raw, mut client_raw) = pipe();

    // A TLS record header promising more bytes than ever arrive
    client_raw.write_all(&[0x16, 0x03, 0x01, 0x02, 0x00, 0x01]).await.unwrap();
    drop(client_raw);

    let err = server_tls.wrap_as_server(server_raw).await.unwrap_err();
    assert!(matches!(err, HandshakeError::Tls(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_peer_closing_early_aborts_handshake() {
    let client = TestPeer::new("client");
    let client_tls = client.tls([client.identity]);
    let (server_raw, client_raw) = pipe();
    drop(server_raw);

    let err = client_tls.wrap_as_client(client_raw).await.unwrap_err();
    assert!(matches!(err, HandshakeError::Tls(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_silent_peer_times_out() {
    let server = TestPeer::new("server");
    let server_tls = server
        .tls([server.identity])
        .with_handshake_timeout(Duration::from_millis(200));
    let (server_raw, _silent) = pipe();

    let err = server_tls.wrap_as_server(server_raw).await.unwrap_err();
    assert!(matches!(err, HandshakeError::TimedOut(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_free_functions_over_tcp() {
    let server = TestPeer::new("server");
    let client = TestPeer::new("client");

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_credential = server.credential.clone();
    let server_trust = TrustSet::only(client.identity);
    let accept = tokio::spawn(async move {
        let (raw, _) = listener.accept().await.unwrap();
        let mut conn = transport::wrap_as_server(raw, &server_credential, &server_trust)
            .await
            .unwrap();
        let mut received = String::new();
        conn.read_to_string(&mut received).await.unwrap();
        (conn.peer_identity(), received)
    });

    let raw = TcpStream::connect(addr).await.unwrap();
    let mut conn = transport::wrap_as_client(raw, &client.credential, &TrustSet::only(server.identity))
        .await
        .unwrap();
    assert_eq!(conn.peer_identity(), server.identity);
    conn.write_all(b"hello over tcp").await.unwrap();
    conn.close().await.unwrap();

    let (seen, received) = accept.await.unwrap();
    assert_eq!(seen, client.identity);
    assert_eq!(received, "hello over tcp");
}

#[tokio::test]
async fn test_untrusted_client_over_tcp_is_disconnected() {
    let server = TestPeer::new("server");
    let trusted = TestPeer::new("trusted");
    let stranger = TestPeer::new("stranger");

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_tls = server.tls([trusted.identity]);
    let accept = tokio::spawn(async move {
        let (raw, _) = listener.accept().await.unwrap();
        server_tls.wrap_as_server(raw).await
    });

    let stranger_tls = stranger.tls([server.identity]);
    let raw = TcpStream::connect(addr).await.unwrap();
    let client_side = stranger_tls.wrap_as_client(raw).await;

    match accept.await.unwrap() {
        Err(HandshakeError::UntrustedPeer(identity)) => assert_eq!(identity, stranger.identity),
        other => panic!("expected an identity rejection, got {:?}", other),
    }

    if let Ok(mut conn) = client_side {
        let mut buf = [0u8; 16];
        let read = tokio::time::timeout(OBSERVE_TIMEOUT, conn.read(&mut buf))
            .await
            .expect("rejected connection should be closed promptly");
        assert!(matches!(read, Ok(0) | Err(_)));
    }
}
