use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tether_client::RpcClient;
use tether_common::config::RpcConfig;
use tether_common::pool::WorkerPool;
use tether_common::protocol::{Result, TetherError};

use crate::component::Participants;
use crate::container::{Component, Container};

struct ClientState {
    container: Arc<Container>,
    client: RpcClient,
    pool: Arc<WorkerPool>,
}

/// Client-side assembly: remote references get stand-ins over one shared
/// [`RpcClient`], which is connected once wiring succeeds.
///
/// Infrastructure components: `rpcConfig`, `workerPool`, `rpcClient`.
pub struct ClientContainer {
    participants: Participants,
    config: RpcConfig,
    initialized: AtomicBool,
    state: RwLock<Option<Arc<ClientState>>>,
}

impl ClientContainer {
    pub fn new(participants: Participants, config: RpcConfig) -> Self {
        Self {
            participants,
            config,
            initialized: AtomicBool::new(false),
            state: RwLock::new(None),
        }
    }

    /// Builds the container and connects the client. Later calls return
    /// immediately, including concurrent ones.
    pub fn init(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.is_some() {
            return Ok(());
        }

        let client = RpcClient::new(self.config.clone())?;
        let pool = Arc::new(WorkerPool::new(self.config.pool.clone()));
        let infrastructure = vec![
            Component::infrastructure("rpcConfig", Arc::new(self.config.clone())),
            Component::infrastructure("workerPool", pool.clone()),
            Component::infrastructure("rpcClient", Arc::new(client.clone())),
        ];

        let assembled = Container::assemble(&self.participants, infrastructure, Some(&client))
            .and_then(|container| client.connect().map(|()| container));
        let container = match assembled {
            Ok(container) => container,
            Err(e) => {
                tracing::error!(error = %e, "Client container failed to start");
                pool.shutdown();
                client.close();
                return Err(e);
            }
        };

        tracing::info!(
            endpoint = %self.config.endpoint(),
            components = container.len(),
            "Client container initialized"
        );
        *state = Some(Arc::new(ClientState {
            container: Arc::new(container),
            client,
            pool,
        }));
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn state(&self) -> Result<Arc<ClientState>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(TetherError::NotInitialized)
    }

    pub fn container(&self) -> Result<Arc<Container>> {
        Ok(self.state()?.container.clone())
    }

    pub fn client(&self) -> Result<RpcClient> {
        Ok(self.state()?.client.clone())
    }

    pub fn pool(&self) -> Result<Arc<WorkerPool>> {
        Ok(self.state()?.pool.clone())
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Stops the worker pool and the connection, then releases the
    /// components. Runs once per successful `init`.
    pub fn teardown(&self) {
        let Some(state) = self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };
        self.initialized.store(false, Ordering::Release);

        state.pool.shutdown();
        state.pool.join();
        state.client.close();
        tracing::info!("Client container closed");
    }
}

impl Drop for ClientContainer {
    fn drop(&mut self) {
        self.teardown();
    }
}
