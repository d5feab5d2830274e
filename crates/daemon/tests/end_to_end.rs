//! End-to-end: generate credentials on disk, run a server, send from a client

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use common::crypto::{Identity, TrustSet};
use common::transport::{AuthenticatedConnection, PinnedTls};
use ffsend_daemon::payload::{ConnectionHandler, SendMessage, MAX_MESSAGE_SIZE};
use ffsend_daemon::state::AppState;
use ffsend_daemon::{connect, send, ClientError, Server};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{mpsc, watch};

const OBSERVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Reports each authenticated peer and the bytes it sent
struct Record(mpsc::UnboundedSender<(Identity, Vec<u8>)>);

#[async_trait::async_trait]
impl ConnectionHandler for Record {
    async fn handle<S>(&self, conn: &mut AuthenticatedConnection<S>) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut message = Vec::new();
        (&mut *conn)
            .take(MAX_MESSAGE_SIZE)
            .read_to_end(&mut message)
            .await?;
        let _ = self.0.send((conn.peer_identity(), message));
        Ok(())
    }
}

/// Panics on the first connection, records every later one
struct PanicOnce {
    panicked: AtomicBool,
    record: Record,
}

#[async_trait::async_trait]
impl ConnectionHandler for PanicOnce {
    async fn handle<S>(&self, conn: &mut AuthenticatedConnection<S>) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        if !self.panicked.swap(true, Ordering::SeqCst) {
            panic!("handler failed for {}", conn.peer_identity());
        }
        self.record.handle(conn).await
    }
}

/// A node with its credential generated into its own config directory
struct Node {
    state: AppState,
    identity: Identity,
    _dir: TempDir,
}

impl Node {
    fn generate() -> Self {
        let dir = TempDir::new().unwrap();
        let state = AppState::load(Some(dir.path().join("ffsend"))).unwrap();
        let generated = state.store().generate(false).unwrap();
        assert!(generated.is_new());
        let identity = generated.credential().identity().unwrap();
        Self {
            state,
            identity,
            _dir: dir,
        }
    }

    fn tls(&self, trusted: impl IntoIterator<Item = Identity>) -> PinnedTls {
        let credential = self.state.store().load().unwrap();
        PinnedTls::new(&credential, trusted.into_iter().collect::<TrustSet>())
            .unwrap()
            .with_handshake_timeout(OBSERVE_TIMEOUT)
    }
}

struct Running {
    addr: String,
    received: mpsc::UnboundedReceiver<(Identity, Vec<u8>)>,
    shutdown: watch::Sender<()>,
    task: tokio::task::JoinHandle<Result<(), ffsend_daemon::ServerError>>,
}

async fn spawn_server(tls: PinnedTls) -> Running {
    let (tx, received) = mpsc::unbounded_channel();
    let server = Server::bind("127.0.0.1:0", tls, Record(tx), 4).await.unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let (shutdown, shutdown_rx) = watch::channel(());
    let task = tokio::spawn(server.run(shutdown_rx));
    Running {
        addr,
        received,
        shutdown,
        task,
    }
}

#[tokio::test]
async fn test_generate_server_client_flow() {
    let server_node = Node::generate();
    let client_node = Node::generate();

    let mut running = spawn_server(server_node.tls([client_node.identity])).await;

    let peer = send(
        &running.addr,
        &client_node.tls([server_node.identity]),
        &SendMessage::default(),
    )
    .await
    .unwrap();
    assert_eq!(peer, server_node.identity);

    let (seen, message) = tokio::time::timeout(OBSERVE_TIMEOUT, running.received.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message, b"test 1234");

    // the server saw exactly the identity of the certificate on disk
    let cert_der = client_node.state.store().load().unwrap().certificate().to_vec();
    assert_eq!(seen, Identity::from_der(&cert_der).unwrap());
    assert_eq!(seen, client_node.identity);

    running.shutdown.send(()).unwrap();
    running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_server_rejects_unpinned_client_and_keeps_serving() {
    let server_node = Node::generate();
    let trusted = Node::generate();
    let stranger = Node::generate();

    let mut running = spawn_server(server_node.tls([trusted.identity])).await;

    // the stranger pins the server correctly, but the server does not pin it
    let rejected = send(
        &running.addr,
        &stranger.tls([server_node.identity]),
        &SendMessage::new("let me in"),
    )
    .await;
    if let Ok(peer) = rejected {
        // TLS 1.3 may let the client finish before the server decides
        assert_eq!(peer, server_node.identity);
    }

    send(
        &running.addr,
        &trusted.tls([server_node.identity]),
        &SendMessage::new("hello"),
    )
    .await
    .unwrap();

    let (seen, message) = tokio::time::timeout(OBSERVE_TIMEOUT, running.received.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seen, trusted.identity);
    assert_eq!(message, b"hello");
    assert!(running.received.try_recv().is_err());

    running.shutdown.send(()).unwrap();
    running.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_client_rejects_server_with_wrong_identity() {
    let server_node = Node::generate();
    let client_node = Node::generate();
    let expected = Node::generate();

    let mut running = spawn_server(server_node.tls([client_node.identity])).await;

    let err = send(
        &running.addr,
        &client_node.tls([expected.identity]),
        &SendMessage::default(),
    )
    .await
    .unwrap_err();
    match err {
        ClientError::Handshake(e) => assert!(e.is_untrusted()),
        other => panic!("expected an identity rejection, got {:?}", other),
    }

    // The server trusts the client, so under TLS 1.3 its handshake may
    // finish first. Its handler then only sees the client's teardown.
    running.shutdown.send(()).unwrap();
    running.task.await.unwrap().unwrap();
    while let Ok((seen, message)) = running.received.try_recv() {
        assert_eq!(seen, client_node.identity);
        assert!(message.is_empty(), "got {:?}", message);
    }
}

#[tokio::test]
async fn test_regenerating_breaks_existing_pins() {
    let server_node = Node::generate();
    let client_node = Node::generate();

    let old_identity = client_node.identity;
    let regenerated = client_node.state.store().generate(true).unwrap();
    assert!(regenerated.is_new());
    assert_ne!(regenerated.credential().identity().unwrap(), old_identity);

    // the server still pins the old identity
    let mut running = spawn_server(server_node.tls([old_identity])).await;
    let _ = send(
        &running.addr,
        &client_node.tls([server_node.identity]),
        &SendMessage::default(),
    )
    .await;

    running.shutdown.send(()).unwrap();
    running.task.await.unwrap().unwrap();
    assert!(running.received.try_recv().is_err());
}

#[tokio::test]
async fn test_dial_failure_is_reported() {
    let node = Node::generate();

    // bind then drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let err = send(&addr, &node.tls([node.identity]), &SendMessage::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Dial { .. }), "got {:?}", err);
}

#[tokio::test]
async fn test_panicking_handler_drops_connection_and_server_keeps_serving() {
    let server_node = Node::generate();
    let client_node = Node::generate();

    let (tx, mut received) = mpsc::unbounded_channel();
    let handler = PanicOnce {
        panicked: AtomicBool::new(false),
        record: Record(tx),
    };
    let server = Server::bind("127.0.0.1:0", server_node.tls([client_node.identity]), handler, 4)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let (shutdown, shutdown_rx) = watch::channel(());
    let task = tokio::spawn(server.run(shutdown_rx));

    let client_tls = client_node.tls([server_node.identity]);

    // the first connection's handler panics, so the peer sees the stream end
    let mut conn = connect(&addr, &client_tls).await.unwrap();
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(OBSERVE_TIMEOUT, conn.read(&mut buf))
        .await
        .expect("connection should be dropped after the handler panics");
    assert!(matches!(read, Ok(0) | Err(_)), "got {:?}", read);

    // the accept loop is unaffected
    send(&addr, &client_tls, &SendMessage::new("after panic"))
        .await
        .unwrap();
    let (seen, message) = tokio::time::timeout(OBSERVE_TIMEOUT, received.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seen, client_node.identity);
    assert_eq!(message, b"after panic");

    shutdown.send(()).unwrap();
    task.await.unwrap().unwrap();
}
