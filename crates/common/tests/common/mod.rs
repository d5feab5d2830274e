//! Shared test utilities for handshake integration tests
#![allow(dead_code)]

use std::time::Duration;

use common::crypto::{Credential, Identity, TrustSet};
use common::transport::PinnedTls;
use tokio::io::DuplexStream;

/// Large enough that neither side of a handshake blocks on the other reading
pub const DUPLEX_BUFFER: usize = 64 * 1024;

/// How long a test waits for the remote end to notice a torn down connection
pub const OBSERVE_TIMEOUT: Duration = Duration::from_secs(5);

/// A peer with its own freshly generated credential
pub struct TestPeer {
    pub credential: Credential,
    pub identity: Identity,
}

impl TestPeer {
    pub fn new(name: &str) -> Self {
        let credential = Credential::generate_for(name).unwrap();
        let identity = credential.identity().unwrap();
        Self {
            credential,
            identity,
        }
    }

    /// TLS endpoint for this peer accepting exactly the given identities
    pub fn tls(&self, trusted: impl IntoIterator<Item = Identity>) -> PinnedTls {
        PinnedTls::new(&self.credential, trusted.into_iter().collect::<TrustSet>()).unwrap()
    }
}

/// An in-memory connected pair of raw streams
pub fn pipe() -> (DuplexStream, DuplexStream) {
    tokio::io::duplex(DUPLEX_BUFFER)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("common=debug")
        .with_test_writer()
        .try_init();
}
