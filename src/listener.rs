//! The Listener Set: `count` Server Instances on consecutive ports starting
//! at a base port, all sharing one handler and served concurrently.
//!
//! Every port is bound before any of them starts serving, so a port that is
//! already taken fails the whole set instead of being skipped.

use crate::app::Server;
use crate::error::{ServerError, ServerResult};
use crate::handler::{hello_world, Handler};
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::task::JoinSet;

#[derive(Debug, Clone, PartialEq)]
pub struct ListenerConfig {
    pub host: IpAddr,
    pub base_port: u16,
    pub count: u16,
    pub max_connections: usize,
    pub keep_alive: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            base_port: 8000,
            count: 4,
            max_connections: 256,
            keep_alive: Duration::from_secs(5),
        }
    }
}

impl ListenerConfig {
    pub fn new(base_port: u16, count: u16) -> Self {
        Self {
            base_port,
            count,
            ..Self::default()
        }
    }

    /// The ports `base_port..base_port + count`, checked to be non-empty,
    /// non-zero and within the TCP port range.
    pub fn ports(&self) -> ServerResult<Vec<u16>> {
        if self.base_port == 0 {
            return Err(ServerError::Config("base port must be positive".to_string()));
        }
        if self.count == 0 {
            return Err(ServerError::Config("listener count must be positive".to_string()));
        }
        let last = u32::from(self.base_port) + u32::from(self.count) - 1;
        if last > u32::from(u16::MAX) {
            return Err(ServerError::Config(format!(
                "ports {}..={} exceed {}",
                self.base_port,
                last,
                u16::MAX
            )));
        }
        Ok((self.base_port..=last as u16).collect())
    }

    pub fn addrs(&self) -> ServerResult<Vec<SocketAddr>> {
        Ok(self
            .ports()?
            .into_iter()
            .map(|port| SocketAddr::new(self.host, port))
            .collect())
    }
}

pub struct ListenerSet {
    servers: Vec<Server>,
}

impl ListenerSet {
    /// Binds every port of `config` with the hello-world handler.
    pub async fn bind(config: &ListenerConfig) -> ServerResult<Self> {
        Self::bind_with(config, Arc::new(hello_world)).await
    }

    pub async fn bind_with(
        config: &ListenerConfig,
        handler: Arc<dyn Handler>,
    ) -> ServerResult<Self> {
        let addrs = config.addrs()?;
        let mut servers = Vec::with_capacity(addrs.len());

        for addr in addrs {
            let mut server = Server::bind(addr, Arc::clone(&handler)).await?;
            server
                .max_connections(config.max_connections)
                .keep_alive(config.keep_alive);
            tracing::debug!(addr = %server.local_addr(), "Bound listener");
            servers.push(server);
        }

        Ok(Self { servers })
    }

    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.servers.iter().map(Server::local_addr).collect()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Serves every listener until the process is terminated.
    pub async fn serve(self) -> ServerResult<()> {
        self.serve_with_shutdown(futures::future::pending()).await
    }

    /// Serves every listener on its own task until `shutdown` resolves, then
    /// aborts them all. If any listener stops on its own, its result is
    /// returned and the others are aborted.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()>,
    {
        let mut tasks = JoinSet::new();
        for server in self.servers {
            tasks.spawn(server.serve());
        }

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutting down listeners");
                Ok(())
            }
            Some(joined) = tasks.join_next() => match joined {
                Ok(result) => result,
                Err(err) => Err(ServerError::PanicError(err.to_string())),
            },
        };

        tasks.abort_all();
        result
    }

    /// Blocking entry point: builds a runtime, binds all ports and serves
    /// until Ctrl-C.
    pub fn start(config: ListenerConfig) -> ServerResult<()> {
        let runtime = Runtime::new()?;
        runtime.block_on(async {
            let set = Self::bind(&config).await?;
            tracing::info!(
                host = %config.host,
                base_port = config.base_port,
                count = set.len(),
                "Listener set started"
            );
            set.serve_with_shutdown(ctrl_c()).await
        })
    }
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Could not listen for Ctrl-C");
        futures::future::pending::<()>().await;
    }
}
