//! Structured observability hooks for the serving lifecycle.
//!
//! This module provides:
//! - A connection-scoped span for per-client log correlation
//! - Emission functions for key lifecycle events: resolve, build, bind, connect, failures
//!
//! Events are emitted at `info!` level unless noted. For JSON output, start the
//! binary with `--json`.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use tracing::{info, warn};

use crate::domain::ResolvedPolicySpec;

/// Span tagging every log line of one client connection.
///
/// Attach it to the connection task with `tracing::Instrument`.
pub fn connection_span(connection_id: &str, peer: SocketAddr) -> tracing::Span {
    tracing::info_span!("openpi.connection", connection_id = %connection_id, peer = %peer)
}

/// Emit event: checkpoint chosen for this process.
pub fn emit_policy_resolved(spec: &ResolvedPolicySpec) {
    info!(
        event = "policy.resolved",
        config = %spec.checkpoint.config,
        dir = %spec.checkpoint.dir,
        source = %spec.source,
        norm_stats_override = spec.has_norm_stats_override(),
    );
}

/// Emit event: policy constructed by the loader.
pub fn emit_policy_built(config: &str, action_horizon: usize) {
    info!(event = "policy.built", config = %config, action_horizon = action_horizon);
}

/// Emit event: server bound and about to accept connections.
///
/// `host` and `host_ip` name the machine clients should dial when the
/// listener is on the unspecified address.
pub fn emit_server_bound(
    addr: SocketAddr,
    host: Option<&str>,
    host_ip: Option<IpAddr>,
    recording: bool,
) {
    info!(
        event = "server.bound",
        addr = %addr,
        host = host.unwrap_or("unknown"),
        host_ip = %host_ip.map(|ip| ip.to_string()).unwrap_or_else(|| "unknown".to_string()),
        recording = recording,
    );
}

/// Emit event: client connected.
pub fn emit_connection_opened(peer: SocketAddr) {
    info!(event = "connection.opened", peer = %peer);
}

/// Emit event: client disconnected after `requests` exchanges.
pub fn emit_connection_closed(peer: SocketAddr, requests: u64) {
    info!(event = "connection.closed", peer = %peer, requests = requests);
}

/// Emit event: one inference request failed (warning level).
pub fn emit_inference_failed(error: &dyn std::fmt::Display) {
    warn!(event = "inference.failed", error = %error);
}

/// Emit event: the record directory could not be created (warning level).
pub fn emit_record_dir_unavailable(record_dir: &Path, error: &dyn std::fmt::Display) {
    warn!(event = "record.dir_unavailable", record_dir = %record_dir.display(), error = %error);
}

/// Emit event: a policy record could not be written (warning level).
pub fn emit_record_write_failed(step: u64, error: &dyn std::fmt::Display) {
    warn!(event = "record.write_failed", step = step, error = %error);
}
