//! Startup pipeline: resolve → build → (record) → serve.
//!
//! Construction is sequential and happens once. Any error before the server
//! is bound is returned to the caller; nothing is left half-started.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use openpi_runtime::{ConfigRegistry, Policy, PolicyLoader, PolicyMetadata};

use crate::domain::{ResolvedPolicySpec, Result, ServingArguments};
use crate::factory::PolicyFactory;
use crate::recording::{PolicyRecorder, DEFAULT_RECORD_DIR};
use crate::resolver::PolicySpecResolver;
use crate::server::{BoundServer, PolicyServer};

/// A constructed policy and what it was built from.
pub struct PreparedPolicy {
    pub spec: ResolvedPolicySpec,
    /// The policy to serve; wrapped in a recorder when recording is on.
    pub policy: Arc<dyn Policy>,
    /// Metadata of the undecorated policy.
    pub metadata: PolicyMetadata,
}

/// Wires the resolver, factory and recorder together.
pub struct ServingPipeline<R, L> {
    resolver: PolicySpecResolver<R>,
    factory: PolicyFactory<L>,
    record_dir: PathBuf,
}

impl<R, L> ServingPipeline<R, L>
where
    R: ConfigRegistry,
    L: PolicyLoader,
{
    pub fn new(resolver: PolicySpecResolver<R>, factory: PolicyFactory<L>) -> Self {
        Self {
            resolver,
            factory,
            record_dir: PathBuf::from(DEFAULT_RECORD_DIR),
        }
    }

    pub fn with_record_dir(mut self, record_dir: impl Into<PathBuf>) -> Self {
        self.record_dir = record_dir.into();
        self
    }

    pub fn record_dir(&self) -> &Path {
        &self.record_dir
    }

    pub fn factory(&self) -> &PolicyFactory<L> {
        &self.factory
    }

    /// Resolve and construct the policy, wrapping it for recording if asked.
    pub async fn prepare(&self, args: &ServingArguments) -> Result<PreparedPolicy> {
        let spec = self.resolver.resolve(args)?;
        let policy = self.factory.build(spec.clone()).await?;
        let metadata = policy.metadata().clone();

        let policy: Arc<dyn Policy> = if args.record {
            Arc::new(PolicyRecorder::wrap(policy, self.record_dir.clone()))
        } else {
            policy
        };

        Ok(PreparedPolicy {
            spec,
            policy,
            metadata,
        })
    }

    /// Prepare the policy and bind it to `addr`.
    pub async fn bind(&self, args: &ServingArguments, addr: SocketAddr) -> Result<BoundServer> {
        let prepared = self.prepare(args).await?;
        let server = PolicyServer::new(prepared.policy, prepared.metadata)
            .bind(addr)
            .await?;
        let (host, host_ip) = local_host().await;
        crate::obs::emit_server_bound(server.local_addr(), host.as_deref(), host_ip, args.record);
        Ok(server)
    }

    /// Prepare, bind on all interfaces at `args.port`, and serve until the process ends.
    pub async fn run(&self, args: &ServingArguments) -> Result<()> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.port));
        self.bind(args, addr).await?.serve_forever().await
    }
}

/// This machine's host name and the first address it resolves to, when known.
pub async fn local_host() -> (Option<String>, Option<IpAddr>) {
    let host = std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());
    let host_ip = match &host {
        Some(name) => tokio::net::lookup_host((name.as_str(), 0))
            .await
            .ok()
            .and_then(|mut addrs| addrs.next())
            .map(|addr| addr.ip()),
        None => None,
    };
    (host, host_ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_host_name_is_trimmed() {
        let (host, _) = local_host().await;
        if let Some(name) = host {
            assert!(!name.is_empty());
            assert_eq!(name, name.trim());
        }
    }
}
