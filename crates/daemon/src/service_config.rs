use std::path::PathBuf;
use std::time::Duration;

use common::crypto::{Credential, TrustSet};

#[derive(Debug)]
pub struct Config {
    // listener configuration
    /// address the server binds to
    pub listen_addr: String,
    /// upper bound on connections handled at once
    pub max_connections: usize,

    // tls configuration
    /// this node's certificate and key
    pub credential: Credential,
    /// identities allowed to connect
    pub trust: TrustSet,
    /// abort handshakes slower than this, if set
    pub handshake_timeout: Option<Duration>,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}
