//! HTTP client acquisition strategies.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use concurrent_bench::{ResourcePool, Workload};
use reqwest::{Client, ClientBuilder, Url};
use strum::EnumIter;
use tokio::sync::OnceCell;
use tracing::{debug, trace};

/// How a request gets hold of its HTTP client.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, EnumIter, strum::Display, ValueEnum)]
pub enum Strategy {
    /// One lazily built client per launch, shared by every request.
    SharedKeepAliveClient,
    /// Like `SharedKeepAliveClient`, without idle connections.
    SharedNoIdleClient,
    /// Clients taken from a pool and returned after a successful request.
    PoolKeepAliveClient,
    /// Like `PoolKeepAliveClient`, without idle connections.
    PoolNoIdleClient,
    /// A fresh client for every request.
    NewKeepAliveClient,
    /// Like `NewKeepAliveClient`, without idle connections.
    NewNoIdleClient,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Acquisition {
    Shared,
    Pool,
    New,
}

/// Connection handling of a client.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClientFlavor {
    /// Idle connections are kept for reuse by later requests.
    KeepAlive,
    /// Every connection is dropped once its response has been read.
    NoIdle,
}

impl Strategy {
    fn acquisition(self) -> Acquisition {
        match self {
            Self::SharedKeepAliveClient | Self::SharedNoIdleClient => Acquisition::Shared,
            Self::PoolKeepAliveClient | Self::PoolNoIdleClient => Acquisition::Pool,
            Self::NewKeepAliveClient | Self::NewNoIdleClient => Acquisition::New,
        }
    }

    /// Connection handling of the clients used by this strategy.
    pub fn flavor(self) -> ClientFlavor {
        match self {
            Self::SharedKeepAliveClient | Self::PoolKeepAliveClient | Self::NewKeepAliveClient => {
                ClientFlavor::KeepAlive
            }
            Self::SharedNoIdleClient | Self::PoolNoIdleClient | Self::NewNoIdleClient => {
                ClientFlavor::NoIdle
            }
        }
    }
}

fn build_client(flavor: ClientFlavor, timeout: Duration) -> anyhow::Result<Client> {
    let builder = ClientBuilder::new().timeout(timeout);
    let builder = match flavor {
        ClientFlavor::KeepAlive => builder,
        ClientFlavor::NoIdle => builder.pool_max_idle_per_host(0),
    };
    builder.build().context("Failed to build HTTP client")
}

/// Shared and pooled clients of the current launch.
struct LaunchClients {
    shared_keep_alive: OnceCell<Client>,
    shared_no_idle: OnceCell<Client>,
    pool_keep_alive: ResourcePool<Client>,
    pool_no_idle: ResourcePool<Client>,
}

impl LaunchClients {
    fn new(timeout: Duration) -> Self {
        Self {
            shared_keep_alive: OnceCell::new(),
            shared_no_idle: OnceCell::new(),
            pool_keep_alive: ResourcePool::new(move || {
                build_client(ClientFlavor::KeepAlive, timeout)
            }),
            pool_no_idle: ResourcePool::new(move || build_client(ClientFlavor::NoIdle, timeout)),
        }
    }

    fn shared(&self, flavor: ClientFlavor) -> &OnceCell<Client> {
        match flavor {
            ClientFlavor::KeepAlive => &self.shared_keep_alive,
            ClientFlavor::NoIdle => &self.shared_no_idle,
        }
    }

    fn pool(&self, flavor: ClientFlavor) -> &ResourcePool<Client> {
        match flavor {
            ClientFlavor::KeepAlive => &self.pool_keep_alive,
            ClientFlavor::NoIdle => &self.pool_no_idle,
        }
    }
}

/// Issues `GET url` requests with every [`Strategy`].
///
/// Shared and pooled clients live until the next [`ClientStrategies::reset`],
/// which the benchmark runs before every launch.
pub struct ClientStrategies {
    url: Url,
    timeout: Duration,
    launch: RwLock<Arc<LaunchClients>>,
}

impl ClientStrategies {
    pub fn new(url: Url, timeout: Duration) -> Self {
        Self {
            url,
            timeout,
            launch: RwLock::new(Arc::new(LaunchClients::new(timeout))),
        }
    }

    /// Drops the shared and pooled clients, together with their connections.
    pub fn reset(&self) {
        let fresh = Arc::new(LaunchClients::new(self.timeout));
        *self.launch.write().unwrap_or_else(PoisonError::into_inner) = fresh;
        debug!("Shared and pooled HTTP clients reset");
    }

    /// The benchmark workload performing one request with `strategy`.
    pub fn workload(self: &Arc<Self>, strategy: Strategy) -> Workload {
        let this = Arc::clone(self);
        Workload::new(move || {
            let this = Arc::clone(&this);
            async move { this.execute(strategy).await }
        })
    }

    /// Performs one request with `strategy`.
    pub async fn execute(&self, strategy: Strategy) -> anyhow::Result<()> {
        let launch = self.current();
        let flavor = strategy.flavor();

        match strategy.acquisition() {
            Acquisition::Shared => {
                let client = launch
                    .shared(flavor)
                    .get_or_try_init(|| async { build_client(flavor, self.timeout) })
                    .await?;
                self.fetch(client).await
            }
            Acquisition::Pool => {
                let pool = launch.pool(flavor);
                let client = pool.acquire()?;
                self.fetch(&client).await?;
                pool.release(client);
                Ok(())
            }
            Acquisition::New => {
                let client = build_client(flavor, self.timeout)?;
                self.fetch(&client).await
            }
        }
    }

    fn current(&self) -> Arc<LaunchClients> {
        Arc::clone(&self.launch.read().unwrap_or_else(PoisonError::into_inner))
    }

    async fn fetch(&self, client: &Client) -> anyhow::Result<()> {
        let response = client
            .get(self.url.clone())
            .send()
            .await
            .with_context(|| format!("GET {}", self.url))?
            .error_for_status()?;
        let body = response
            .bytes()
            .await
            .with_context(|| format!("Reading the body of {}", self.url))?;
        trace!(bytes = body.len(), "Response received");
        Ok(())
    }
}
