use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use tether_common::config::RpcConfig;
use tether_common::pool::WorkerPool;
use tether_common::protocol::{Result, TetherError};
use tether_server::{Dispatcher, RpcServer, SelectionPolicy, ServiceRegistry, ShutdownHandle};

use crate::component::Participants;
use crate::container::{Component, Container};

struct ServerState {
    container: Arc<Container>,
    registry: Arc<ServiceRegistry>,
    pool: Arc<WorkerPool>,
    shutdown: ShutdownHandle,
    serving: Mutex<Option<JoinHandle<Result<()>>>>,
    runtime: Option<Runtime>,
}

impl ServerState {
    fn runtime(&self) -> Result<&Runtime> {
        self.runtime.as_ref().ok_or(TetherError::NotInitialized)
    }
}

impl Drop for ServerState {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Server-side assembly: service components are registered with the
/// dispatcher and the listener starts once wiring succeeds. Remote
/// references are left unwired.
///
/// Infrastructure components: `rpcConfig`, `workerPool`, `serviceRegistry`.
/// Requests are dispatched on the io runtime's blocking threads, not on
/// `workerPool`; the pool is there for participants to autowire for their
/// own background work, and is shut down with the container.
pub struct ServerContainer {
    participants: Participants,
    config: RpcConfig,
    initialized: AtomicBool,
    state: RwLock<Option<Arc<ServerState>>>,
}

impl ServerContainer {
    pub fn new(participants: Participants, config: RpcConfig) -> Self {
        Self {
            participants,
            config,
            initialized: AtomicBool::new(false),
            state: RwLock::new(None),
        }
    }

    /// Builds the container, registers its services and starts serving in
    /// the background. Later calls return immediately.
    pub fn init(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.is_some() {
            return Ok(());
        }

        let started = self.start();
        match started {
            Ok(started) => {
                *state = Some(Arc::new(started));
                self.initialized.store(true, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Server container failed to start");
                Err(e)
            }
        }
    }

    fn start(&self) -> Result<ServerState> {
        let addr = self.config.socket_addr()?;
        let policy = SelectionPolicy::from_load_balancing(self.config.load_balancing);
        let registry = Arc::new(ServiceRegistry::new(policy));
        let pool = Arc::new(WorkerPool::new(self.config.pool.clone()));
        let infrastructure = vec![
            Component::infrastructure("rpcConfig", Arc::new(self.config.clone())),
            Component::infrastructure("workerPool", pool.clone()),
            Component::infrastructure("serviceRegistry", registry.clone()),
        ];

        let container = Container::assemble(&self.participants, infrastructure, None)?;
        for component in container.services() {
            for skeleton in component.exports() {
                registry.register(component.name(), component.weight(), skeleton.clone());
            }
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.io_threads.max(1))
            .thread_name("tether-server-io")
            .enable_all()
            .build()?;
        let dispatcher = Arc::new(Dispatcher::new(registry.clone()));
        let server = runtime
            .block_on(RpcServer::bind(&addr.to_string(), dispatcher))?
            .with_fault_policy(self.config.fault_policy);
        let shutdown = server.shutdown_handle()?;
        let serving = runtime.spawn(server.run());

        tracing::info!(
            addr = %shutdown.local_addr(),
            components = container.len(),
            interfaces = registry.interfaces().len(),
            "Server container initialized"
        );
        Ok(ServerState {
            container: Arc::new(container),
            registry,
            pool,
            shutdown,
            serving: Mutex::new(Some(serving)),
            runtime: Some(runtime),
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn state(&self) -> Result<Arc<ServerState>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(TetherError::NotInitialized)
    }

    pub fn container(&self) -> Result<Arc<Container>> {
        Ok(self.state()?.container.clone())
    }

    pub fn registry(&self) -> Result<Arc<ServiceRegistry>> {
        Ok(self.state()?.registry.clone())
    }

    pub fn pool(&self) -> Result<Arc<WorkerPool>> {
        Ok(self.state()?.pool.clone())
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.state()?.shutdown.local_addr())
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Blocks until the server stops. Must not be called from inside an
    /// async task.
    pub fn wait(&self) -> Result<()> {
        let state = self.state()?;
        let serving = state
            .serving
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match serving {
            Some(serving) => state
                .runtime()?
                .block_on(serving)
                .map_err(|e| TetherError::ServiceFailure(e.to_string()))?,
            None => Ok(()),
        }
    }

    /// Stops the listener and the worker pool, then releases the components.
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

        state.shutdown.shutdown();
        state.pool.shutdown();
        state.pool.join();
        tracing::info!("Server container closed");
    }
}

impl Drop for ServerContainer {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Autowired, Descriptor, Participant, Reference};
    use std::collections::HashMap;
    use std::thread;
    use std::time::Duration;
    use tether_client::{RemoteInterface, RpcClient, Stub};
    use tether_common::protocol::{FaultKind, Interface};
    use tether_server::{MethodTable, ServiceInterface};

    pub trait Greeter: Send + Sync {
        fn greet(&self, name: String) -> String;
    }

    impl Interface for dyn Greeter {
        const ID: &'static str = "test.Greeter";
    }

    impl ServiceInterface for dyn Greeter {
        fn method_table() -> MethodTable<Self> {
            MethodTable::new(Self::ID).method("greet", |s: &Self, (name,): (String,)| s.greet(name))
        }
    }

    impl RemoteInterface for dyn Greeter {
        fn stand_in(client: RpcClient) -> Arc<Self> {
            Arc::new(GreeterProxy(Stub::new(client)))
        }
    }

    struct GreeterProxy(Stub<dyn Greeter>);

    impl Greeter for GreeterProxy {
        fn greet(&self, name: String) -> String {
            self.0
                .invoke("greet", (name,))
                .unwrap_or_else(|e| format!("failed: {}", e))
        }
    }

    #[derive(Default)]
    struct English {
        config: Autowired<RpcConfig>,
        peer: Reference<dyn Greeter>,
    }

    impl Greeter for English {
        fn greet(&self, name: String) -> String {
            format!("Hello, {}", name)
        }
    }

    impl Participant for English {
        fn descriptor() -> Descriptor<Self> {
            Descriptor::<Self>::new()
                .server_entry()
                .weight(2)
                .service::<dyn Greeter>(|g| g)
                .autowired_named("config", "rpcConfig", |g| &g.config)
                .reference("peer", |g| &g.peer)
        }
    }

    #[derive(Default)]
    struct French;

    impl Greeter for French {
        fn greet(&self, name: String) -> String {
            format!("Bonjour, {}", name)
        }
    }

    impl Participant for French {
        fn descriptor() -> Descriptor<Self> {
            Descriptor::<Self>::new()
                .weight(0)
                .service::<dyn Greeter>(|g| g)
        }
    }

    #[derive(Default)]
    struct Janitor {
        pool: Autowired<WorkerPool>,
    }

    impl Participant for Janitor {
        fn descriptor() -> Descriptor<Self> {
            Descriptor::<Self>::new().autowired("pool", |j| &j.pool)
        }
    }

    fn config(load_balancing: bool) -> RpcConfig {
        RpcConfig::new()
            .with_port(0)
            .with_load_balancing(load_balancing)
            .with_io_threads(1)
    }

    fn client_for(container: &ServerContainer) -> RpcClient {
        let addr = container.local_addr().unwrap();
        let client = RpcClient::new(
            RpcConfig::new()
                .with_address(addr.ip().to_string())
                .with_port(addr.port()),
        )
        .unwrap();
        client.connect().unwrap();
        client
    }

    #[test]
    fn test_service_is_served() {
        let container = ServerContainer::new(Participants::new().with::<English>(), config(false));
        container.init().unwrap();

        let client = client_for(&container);
        let greeting: String = client
            .invoke(<dyn Greeter as Interface>::ID, "greet", ("Ada".to_string(),))
            .unwrap();
        assert_eq!(greeting, "Hello, Ada");

        let english = container.container().unwrap().get::<English>("english").unwrap().unwrap();
        assert_eq!(english.config.get().unwrap().port, 0);
        assert!(!english.peer.is_wired());
    }

    #[test]
    fn test_strict_registry_rejects_two_services() {
        let participants = Participants::new().with::<English>().with::<French>();
        let container = ServerContainer::new(participants, config(false));
        container.init().unwrap();
        assert_eq!(
            container.registry().unwrap().implementations("test.Greeter"),
            vec!["english", "french"]
        );

        let client = client_for(&container);
        let err = client
            .invoke::<_, String>("test.Greeter", "greet", ("Ada".to_string(),))
            .unwrap_err();
        assert!(matches!(
            err,
            TetherError::Remote { kind: FaultKind::AmbiguousImplementation, .. }
        ));
    }

    #[test]
    fn test_weighted_registry_uses_descriptor_weights() {
        let participants = Participants::new().with::<English>().with::<French>();
        let container = ServerContainer::new(participants, config(true));
        container.init().unwrap();

        let client = client_for(&container);
        let mut counts: HashMap<String, usize> = HashMap::new();
        // Two cycles of four slots: english 3, french 1
        for _ in 0..8 {
            let greeting: String = client
                .invoke("test.Greeter", "greet", ("Ada".to_string(),))
                .unwrap();
            *counts.entry(greeting).or_insert(0) += 1;
        }
        assert_eq!(counts["Hello, Ada"], 6);
        assert_eq!(counts["Bonjour, Ada"], 2);
    }

    #[test]
    fn test_init_is_idempotent() {
        let container = Arc::new(ServerContainer::new(
            Participants::new().with::<English>(),
            config(false),
        ));
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let container = container.clone();
                thread::spawn(move || {
                    container.init().unwrap();
                    container.local_addr().unwrap()
                })
            })
            .collect();
        let addrs: Vec<SocketAddr> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        assert!(addrs.iter().all(|a| *a == addrs[0]));
    }

    #[test]
    fn test_wait_returns_after_teardown() {
        let container = Arc::new(ServerContainer::new(
            Participants::new().with::<English>(),
            config(false),
        ));
        container.init().unwrap();

        let waiter = {
            let container = container.clone();
            thread::spawn(move || container.wait())
        };
        thread::sleep(Duration::from_millis(100));
        container.teardown();

        waiter.join().unwrap().unwrap();
        assert!(!container.is_initialized());
        assert!(matches!(container.local_addr(), Err(TetherError::NotInitialized)));
    }

    #[test]
    fn test_bad_address_fails_init() {
        let config = RpcConfig::new().with_address("not an address");
        let container = ServerContainer::new(Participants::new().with::<English>(), config);
        assert!(matches!(container.init(), Err(TetherError::InvalidConfig(_))));
        assert!(!container.is_initialized());
    }

    #[test]
    fn test_participants_share_the_worker_pool() {
        let participants = Participants::new().with::<English>().with::<Janitor>();
        let container = ServerContainer::new(participants, config(false));
        container.init().unwrap();

        let janitor = container.container().unwrap().get_by_type::<Janitor>().unwrap().unwrap();
        let pool = janitor.pool.get().unwrap();
        assert!(Arc::ptr_eq(&pool, &container.pool().unwrap()));

        let (tx, rx) = std::sync::mpsc::channel();
        pool.execute(move || tx.send("swept").unwrap()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "swept");

        container.teardown();
        assert!(pool.is_shutdown());
    }
}
