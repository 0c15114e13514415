//! Persistent TCP client for ScriptLink controllers.
//!
//! One client per device connection. The receive buffer and sequence
//! counter are private to the owning device's task; requests are strictly
//! serialized by the caller (the adapter's single-flight guard), so the
//! client never interleaves exchanges.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::client::frame::{Frame, FrameDecoder};
use crate::error::{ScriptLinkError, ScriptLinkResult};
use crate::types::ScriptLinkConfig;

/// Read chunk size for the receive loop.
const READ_CHUNK: usize = 4096;

// =============================================================================
// FramedStreamClient
// =============================================================================

/// Request/response client over a persistent framed TCP stream.
pub struct FramedStreamClient {
    config: ScriptLinkConfig,
    stream: Option<TcpStream>,
    decoder: FrameDecoder,
    sequence: u8,
}

impl FramedStreamClient {
    /// Creates a disconnected client.
    pub fn new(config: ScriptLinkConfig) -> Self {
        Self {
            config,
            stream: None,
            decoder: FrameDecoder::new(),
            sequence: 0,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ScriptLinkConfig {
        &self.config
    }

    /// Returns `true` if a socket is open.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Connects to the controller.
    ///
    /// When the controller announces itself with a greeting line the client
    /// consumes it; when none arrives within the grace period the first
    /// framed request proceeds anyway.
    pub async fn connect(&mut self, connect_timeout: Duration) -> ScriptLinkResult<()> {
        let endpoint = self.config.endpoint();
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(&endpoint))
            .await
            .map_err(|_| ScriptLinkError::Timeout {
                duration: connect_timeout,
            })??;
        let _ = stream.set_nodelay(true);

        self.decoder = FrameDecoder::new();
        self.sequence = 0;
        self.stream = Some(stream);

        debug!(endpoint = %endpoint, "Connected");

        if self.config.expect_greeting {
            self.read_greeting().await;
        }
        Ok(())
    }

    /// Closes the connection. Safe to call when already disconnected.
    pub async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.decoder.reset();
    }

    /// Sends one request frame and awaits the response.
    ///
    /// The exchange carries its own timeout, independent of any socket
    /// timeouts. A timed-out request rejects the caller but leaves the
    /// socket open for the next request; the reconnect decision belongs to
    /// the adapter. A response whose echoed sequence differs from the
    /// request's is logged as a warning and accepted, because peers are
    /// permitted to be non-conformant.
    pub async fn request(&mut self, service: u8, payload: &[u8]) -> ScriptLinkResult<Frame> {
        let timeout = self.config.request_timeout();
        let stream = self.stream.as_mut().ok_or(ScriptLinkError::NotConnected)?;
        let decoder = &mut self.decoder;

        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);

        let encoded = Frame::new(service, sequence, payload.to_vec()).encode();

        let exchange = async {
            stream.write_all(&encoded).await?;

            loop {
                if let Some(response) = decoder.try_decode()? {
                    if response.sequence != sequence {
                        warn!(
                            expected = sequence,
                            actual = response.sequence,
                            "Response sequence mismatch (non-conformant peer?)"
                        );
                    }
                    return Ok(response);
                }

                let mut chunk = [0u8; READ_CHUNK];
                let n = stream.read(&mut chunk).await?;
                if n == 0 {
                    return Err(ScriptLinkError::Closed);
                }
                decoder.extend(&chunk[..n]);
            }
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ScriptLinkError::Timeout { duration: timeout }),
        }
    }

    /// Consumes the greeting line, or gives up after the grace period.
    async fn read_greeting(&mut self) {
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        let grace = self.config.greeting_timeout();
        let mut collected: Vec<u8> = Vec::new();

        let outcome = tokio::time::timeout(grace, async {
            let mut chunk = [0u8; 256];
            loop {
                let n = stream.read(&mut chunk).await?;
                if n == 0 {
                    return Err(ScriptLinkError::Closed);
                }
                collected.extend_from_slice(&chunk[..n]);
                if let Some(pos) = collected.iter().position(|&b| b == b'\n') {
                    return Ok(pos);
                }
            }
        })
        .await;

        match outcome {
            Ok(Ok(pos)) => {
                let line = String::from_utf8_lossy(&collected[..pos]);
                debug!(greeting = %line.trim(), "Controller greeting");
                // Bytes after the newline already belong to the frame stream.
                if collected.len() > pos + 1 {
                    self.decoder.extend(&collected[pos + 1..]);
                }
            }
            Ok(Err(e)) => {
                debug!(error = %e, "Greeting read failed");
            }
            Err(_) => {
                debug!("No greeting within grace period");
                if !collected.is_empty() {
                    self.decoder.extend(&collected);
                }
            }
        }
    }
}

impl std::fmt::Debug for FramedStreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedStreamClient")
            .field("endpoint", &self.config.endpoint())
            .field("connected", &self.is_connected())
            .field("sequence", &self.sequence)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
