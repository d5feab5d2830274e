pub mod utils;

use std::net::SocketAddr;
use std::path::Path;

use common::transport::{HandshakeError, PinnedTls};
use tokio::sync::watch;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::payload::ReceiveMessage;
use crate::server::{Server, ServerError};
use crate::ServiceConfig;

/// Handle for a server started with [`start_server`].
pub struct ShutdownHandle {
    graceful_waiter: tokio::task::JoinHandle<()>,
    server: tokio::task::JoinHandle<Result<(), ServerError>>,
    shutdown_tx: watch::Sender<()>,
}

impl ShutdownHandle {
    /// Block until the server stops (via signal, explicit shutdown, or an accept error).
    pub async fn wait(self) -> Result<(), ServerError> {
        let result = match self.server.await {
            Ok(result) => result,
            Err(e) => Err(ServerError::Task(e.to_string())),
        };
        self.graceful_waiter.abort();
        result
    }

    /// Trigger shutdown programmatically.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("failed to set up TLS: {0}")]
    Tls(#[from] HandshakeError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("failed to install signal handlers: {0}")]
    Signals(#[from] std::io::Error),
}

/// Initialize logging and the panic handler.
/// Returns guards that must be kept alive for the duration of the program.
pub fn init_logging(
    log_level: tracing::Level,
    log_dir: Option<&Path>,
) -> Vec<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::fmt::format::FmtSpan;

    let mut guards = Vec::new();

    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    guards.push(stdout_guard);

    let stdout_env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_filter(stdout_env_filter);

    if let Some(log_dir) = log_dir {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!(
                "Warning: Failed to create log directory {:?}: {}",
                log_dir, e
            );
        }

        let file_appender = tracing_appender::rolling::daily(log_dir, "ffsend.log");
        let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        guards.push(file_guard);

        let file_env_filter = EnvFilter::builder()
            .with_default_directive(log_level.into())
            .from_env_lossy();

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(file_env_filter);

        tracing_subscriber::registry()
            .with(stdout_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry().with(stdout_layer).init();
    }

    utils::register_panic_logger();

    guards
}

/// Bind the listener and spawn the accept loop, returning the bound address.
///
/// The server receives messages with [`ReceiveMessage`] and stops on SIGINT,
/// SIGTERM or [`ShutdownHandle::shutdown`].
pub async fn start_server(
    service_config: &ServiceConfig,
) -> Result<(SocketAddr, ShutdownHandle), StartError> {
    let mut tls = PinnedTls::new(&service_config.credential, service_config.trust.clone())?;
    if let Some(timeout) = service_config.handshake_timeout {
        tls = tls.with_handshake_timeout(timeout);
    }
    let local = tls.local_identity();

    let server = Server::bind(
        &service_config.listen_addr,
        tls,
        ReceiveMessage,
        service_config.max_connections,
    )
    .await?;
    let addr = server.local_addr()?;

    let (graceful_waiter, shutdown_tx, shutdown_rx) = utils::graceful_shutdown_blocker()?;
    let server = tokio::spawn(server.run(shutdown_rx));

    tracing::info!(
        %addr,
        identity = %local,
        trusted_peers = service_config.trust.len(),
        "listening"
    );

    let handle = ShutdownHandle {
        graceful_waiter,
        server,
        shutdown_tx,
    };
    Ok((addr, handle))
}

/// Runs the server until a shutdown signal is received. Use for CLI binary usage.
pub async fn run_server(service_config: &ServiceConfig) -> Result<(), StartError> {
    let _guards = init_logging(service_config.log_level, service_config.log_dir.as_deref());
    utils::report_build_info();

    let (_, handle) = start_server(service_config).await?;
    handle.wait().await?;
    Ok(())
}
