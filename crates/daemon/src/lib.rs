// Connection orchestration (accept loop, dialer) and the payload they carry
pub mod client;
pub mod payload;
pub mod server;

// Process plumbing (logging, signals, service entrypoint)
pub mod process;
pub mod service_config;

// App state (configuration, paths, pinned peers)
pub mod state;
pub mod trust_file;

// Re-exports for consumers
pub use client::{connect, send, ClientError};
pub use payload::{ConnectionHandler, ReceiveMessage, SendMessage};
pub use process::{init_logging, run_server, start_server, ShutdownHandle, StartError};
pub use server::{Server, ServerError};
pub use service_config::Config as ServiceConfig;
pub use state::{AppConfig, AppState, StateError};
pub use trust_file::{resolve_trust, TrustFile, TrustFileError};
