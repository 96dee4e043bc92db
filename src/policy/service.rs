//! Policy delegation connection handling.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, trace};

use super::request::{PolicyRequest, MAX_LINE_LENGTH};
use crate::error::{Result, SendlimitError};
use crate::ratelimit::PolicyBackend;

/// Answers policy requests arriving on a connection.
pub struct PolicyService<B: PolicyBackend> {
    backend: Arc<B>,
}

impl<B: PolicyBackend> Clone for PolicyService<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: PolicyBackend> PolicyService<B> {
    /// Create a new PolicyService with the given backend.
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Serve requests on `stream` until the peer closes it.
    ///
    /// Postfix keeps connections open and sends one request after another,
    /// each answered in order.
    pub async fn handle<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut stream = BufReader::new(stream);
        let mut request = PolicyRequest::default();
        let mut line = String::new();

        loop {
            line.clear();
            let n = (&mut stream)
                .take(MAX_LINE_LENGTH as u64)
                .read_line(&mut line)
                .await?;

            if n == 0 {
                if !request.is_empty() {
                    debug!("Connection closed with an unfinished request");
                }
                return Ok(());
            }

            if n == MAX_LINE_LENGTH && !line.ends_with('\n') {
                return Err(SendlimitError::Protocol(format!(
                    "attribute line longer than {} bytes",
                    MAX_LINE_LENGTH
                )));
            }

            let attribute = line.trim_end_matches(['\r', '\n']);
            if !attribute.is_empty() {
                trace!(line = %attribute, "Received attribute");
                request.push_line(attribute)?;
                continue;
            }

            if request.is_empty() {
                continue;
            }

            let decision = self
                .backend
                .check(request.sender(), request.recipient_count());

            stream.write_all(decision.to_string().as_bytes()).await?;
            stream.flush().await?;

            request = PolicyRequest::default();
        }
    }
}
