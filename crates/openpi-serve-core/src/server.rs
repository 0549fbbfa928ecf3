//! Policy server: binds one policy to a TCP endpoint and serves it forever.
//!
//! Lifecycle is `Idle → Bound → Serving`, encoded as types:
//!
//! - [`PolicyServer`] (idle) holds the policy and its metadata
//! - [`BoundServer`] owns the listener; `local_addr` is known
//! - [`BoundServer::serve_forever`] accepts connections until the process ends
//!
//! There is no shutdown path. The loop only returns on an accept error that
//! is not transient; otherwise termination is external (signal, kill).
//!
//! Each connection gets its own task. Requests on a connection are answered
//! in order; a failed request gets an error frame and the connection stays open.
//! That includes lines that are not valid UTF-8 or JSON, and lines longer than
//! the frame limit. Only transport errors end a connection.

use std::net::SocketAddr;
use std::sync::Arc;

use openpi_runtime::{Policy, PolicyMetadata};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, warn, Instrument};

use crate::domain::Result;
use crate::metrics::METRICS;
use crate::wire::{decode_observation, ServerFrame};

/// Longest request line accepted by default, newline excluded.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// A policy ready to be bound to an address.
pub struct PolicyServer {
    policy: Arc<dyn Policy>,
    metadata: PolicyMetadata,
    max_frame_bytes: usize,
}

impl PolicyServer {
    /// `metadata` is sent to each client before its first exchange.
    pub fn new(policy: Arc<dyn Policy>, metadata: PolicyMetadata) -> Self {
        Self {
            policy,
            metadata,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    /// Cap the length of a single request line.
    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    /// Bind the listening socket.
    pub async fn bind(self, addr: impl ToSocketAddrs) -> Result<BoundServer> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(BoundServer {
            listener,
            local_addr,
            policy: self.policy,
            metadata: Arc::new(self.metadata),
            max_frame_bytes: self.max_frame_bytes,
        })
    }
}

/// A server with a bound listener, not yet accepting.
pub struct BoundServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    policy: Arc<dyn Policy>,
    metadata: Arc<PolicyMetadata>,
    max_frame_bytes: usize,
}

impl BoundServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn metadata(&self) -> &PolicyMetadata {
        &self.metadata
    }

    /// Accept and serve connections until an unrecoverable accept failure.
    pub async fn serve_forever(self) -> Result<()> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) if is_transient_accept_error(&err) => {
                    warn!(error = %err, "Transient accept failure");
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            METRICS.inc_connections();
            let connection_id = uuid::Uuid::new_v4().to_string();
            let span = crate::obs::connection_span(&connection_id, peer);
            let policy = Arc::clone(&self.policy);
            let metadata = Arc::clone(&self.metadata);
            let max_frame_bytes = self.max_frame_bytes;

            tokio::spawn(
                async move {
                    crate::obs::emit_connection_opened(peer);
                    match handle_connection(stream, policy, &metadata, max_frame_bytes).await {
                        Ok(requests) => crate::obs::emit_connection_closed(peer, requests),
                        Err(err) => debug!(error = %err, "Connection ended with error"),
                    }
                    METRICS.flush();
                }
                .instrument(span),
            );
        }
    }
}

fn is_transient_accept_error(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        err.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
    )
}

/// Serve one client until it disconnects. Returns the number of requests handled.
async fn handle_connection(
    stream: TcpStream,
    policy: Arc<dyn Policy>,
    metadata: &PolicyMetadata,
    max_frame_bytes: usize,
) -> Result<u64> {
    let (reader, mut writer) = stream.into_split();
    let hello = ServerFrame::Metadata {
        metadata: metadata.clone(),
    };
    writer.write_all(&hello.encode()?).await?;

    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let mut requests = 0u64;
    loop {
        line.clear();
        let limit = max_frame_bytes as u64 + 1;
        if (&mut reader).take(limit).read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        let terminated = line.last() == Some(&b'\n');
        if !terminated && line.len() > max_frame_bytes {
            skip_line(&mut reader).await?;
            requests += 1;
            let reply = ServerFrame::error(format!(
                "observation exceeds {} bytes",
                max_frame_bytes
            ));
            writer.write_all(&reply.encode()?).await?;
            continue;
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        requests += 1;

        let reply = match decode_observation(&line) {
            Ok(observation) => match policy.infer(&observation).await {
                Ok(actions) => {
                    METRICS.inc_requests_served();
                    ServerFrame::Actions { actions }
                }
                Err(err) => {
                    METRICS.inc_inference_failures();
                    crate::obs::emit_inference_failed(&err);
                    ServerFrame::error(err)
                }
            },
            Err(err) => ServerFrame::error(format!("malformed observation: {}", err)),
        };
        writer.write_all(&reply.encode()?).await?;
    }
    Ok(requests)
}

/// Discard input up to and including the next newline.
async fn skip_line<R>(reader: &mut R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(());
        }
        match available.iter().position(|b| *b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(());
            }
            None => {
                let len = available.len();
                reader.consume(len);
            }
        }
    }
}
