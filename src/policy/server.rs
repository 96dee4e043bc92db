//! TCP server for the Postfix policy delegation protocol.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::service::PolicyService;
use crate::error::Result;
use crate::ratelimit::PolicyBackend;

/// Policy server accepting connections from Postfix.
pub struct PolicyServer<B: PolicyBackend + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    /// The backend answering requests
    backend: Arc<B>,
}

impl<B: PolicyBackend + 'static> PolicyServer<B> {
    /// Create a new policy server.
    pub fn new(addr: SocketAddr, backend: Arc<B>) -> Self {
        Self { addr, backend }
    }

    /// Start the server with graceful shutdown.
    ///
    /// The listener stops when the provided signal resolves. Connections
    /// already accepted run to completion on their own tasks.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind policy listener");
            e
        })?;

        serve_listener(listener, self.backend, signal).await
    }
}

/// Accept policy connections on an already bound listener.
pub async fn serve_listener<B, F>(listener: TcpListener, backend: Arc<B>, signal: F) -> Result<()>
where
    B: PolicyBackend + 'static,
    F: Future<Output = ()> + Send,
{
    let service = PolicyService::new(backend);
    let local_addr = listener.local_addr()?;

    info!(addr = %local_addr, "Policy server listening");

    tokio::pin!(signal);

    loop {
        let (stream, peer) = tokio::select! {
            _ = &mut signal => {
                info!(addr = %local_addr, "Policy server shutting down");
                return Ok(());
            }
            accepted = listener.accept() => accepted?,
        };

        let service = service.clone();
        let span = info_span!("connection", peer = %peer);

        tokio::spawn(
            async move {
                debug!("Accepted policy connection");
                match service.handle(stream).await {
                    Ok(()) => debug!("Policy connection closed"),
                    Err(e) => warn!(error = %e, "Policy connection failed"),
                }
            }
            .instrument(span),
        );
    }
}
