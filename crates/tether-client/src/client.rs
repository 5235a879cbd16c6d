use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::{Handle, Runtime};

use tether_common::config::RpcConfig;
use tether_common::protocol::{CallRequest, CallResult, Marshal, Params, Result, TetherError};
use tether_common::transport::{connect, MessageCodec, DEFAULT_CONNECT_TIMEOUT};

use crate::connection::Connection;

/// Blocking RPC client over one shared connection.
///
/// Every call holds the call lock from the moment its request is built
/// until its result arrives, so requests and responses strictly alternate
/// on the wire. Calls block the calling thread; do not call from inside an
/// async task.
///
/// Cloning is cheap and clones share the connection.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: RpcConfig,
    runtime: Mutex<Option<Runtime>>,
    call_lock: Mutex<()>,
    connection: Mutex<Option<Connection>>,
}

impl RpcClient {
    /// Create a client for `config.endpoint()`. The connection is opened by
    /// [`connect`](Self::connect).
    pub fn new(config: RpcConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.io_threads.max(1))
            .thread_name("tether-io")
            .enable_all()
            .build()?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                runtime: Mutex::new(Some(runtime)),
                call_lock: Mutex::new(()),
                connection: Mutex::new(None),
            }),
        })
    }

    pub fn config(&self) -> &RpcConfig {
        &self.inner.config
    }

    fn runtime_handle(&self) -> Result<Handle> {
        self.inner
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|rt| rt.handle().clone())
            .ok_or(TetherError::NoConnection)
    }

    /// Open the shared connection. Does nothing when one is already open.
    pub fn connect(&self) -> Result<()> {
        let mut connection = self
            .inner
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if connection.as_ref().is_some_and(Connection::is_open) {
            return Ok(());
        }

        let handle = self.runtime_handle()?;
        let endpoint = self.inner.config.endpoint();
        tracing::debug!(endpoint = %endpoint, "Connecting");
        let stream = handle.block_on(connect(&endpoint, DEFAULT_CONNECT_TIMEOUT))?;
        *connection = Some(Connection::open(stream, &handle)?);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(Connection::is_open)
    }

    fn current_connection(&self) -> Result<Connection> {
        self.inner
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|c| c.is_open())
            .cloned()
            .ok_or(TetherError::NoConnection)
    }

    /// Call `method` on the remote implementation of `interface` and wait
    /// for its result. Both null results and void methods decode as the
    /// null form of `R` (use an `Option` return type to observe them).
    pub fn invoke<P, R>(&self, interface: &str, method: &str, params: P) -> Result<R>
    where
        P: Params,
        R: Marshal,
    {
        self.call(interface, method, params)?.into_value()
    }

    /// Call a void-declared method.
    pub fn invoke_void<P: Params>(&self, interface: &str, method: &str, params: P) -> Result<()> {
        self.call(interface, method, params)?.into_unit()
    }

    /// One full request/response cycle.
    pub fn call<P: Params>(&self, interface: &str, method: &str, params: P) -> Result<CallResult> {
        let _call = self
            .inner
            .call_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let connection = self.current_connection()?;

        let request = CallRequest::new(interface, method, P::type_names(), params.into_payloads()?);
        let bytes = MessageCodec::encode_request(&request)?;
        tracing::debug!(interface, method, "Sending request");
        let handle = self.runtime_handle()?;
        let reply = connection.send(bytes)?;

        let outcome = match self.inner.config.call_timeout {
            None => reply.blocking_recv().map_err(|_| TetherError::ConnectionClosed)?,
            Some(timeout) => match handle.block_on(tokio::time::timeout(timeout, reply)) {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => return Err(TetherError::ConnectionClosed),
                Err(_) => {
                    // A late reply would be paired with the next request
                    connection.close("call timed out");
                    return Err(TetherError::Timeout(timeout.as_millis() as u64));
                }
            },
        };

        let result = outcome?;
        if let CallResult::Error(fault) = &result {
            tracing::debug!(interface, method, kind = ?fault.kind, "Remote call failed");
        }
        Ok(result)
    }

    /// Close the connection and stop the I/O runtime. Later calls fail with
    /// `NoConnection`.
    pub fn close(&self) {
        if let Some(connection) = self
            .inner
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            tracing::debug!(peer = %connection.peer(), "Closing client");
            connection.close("client closed");
        }
        if let Some(runtime) = self
            .inner
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            runtime.shutdown_background();
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(connection) = self
            .connection
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            connection.close("client dropped");
        }
        if let Some(runtime) = self
            .runtime
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::time::Duration;
    use tether_common::config::FaultPolicy;
    use tether_common::protocol::{FaultKind, Interface};
    use tether_server::{
        bind, Dispatcher, MethodTable, RpcServer, ServiceInterface, ServiceRegistry,
        ShutdownHandle,
    };

    pub trait Account: Send + Sync {
        fn deposit(&self, amount: i64) -> i64;
        fn owner(&self) -> Option<String>;
        fn reset(&self);
        fn stall(&self, millis: i64) -> i64;
    }

    impl Interface for dyn Account {
        const ID: &'static str = "test.Account";
    }

    impl ServiceInterface for dyn Account {
        fn method_table() -> MethodTable<Self> {
            MethodTable::new(Self::ID)
                .method("deposit", |s: &Self, (amount,): (i64,)| s.deposit(amount))
                .method("owner", |s, (): ()| s.owner())
                .procedure("reset", |s, (): ()| s.reset())
                .method("stall", |s, (millis,): (i64,)| s.stall(millis))
        }
    }

    #[derive(Default)]
    struct Memory {
        balance: AtomicI64,
    }

    impl Account for Memory {
        fn deposit(&self, amount: i64) -> i64 {
            self.balance.fetch_add(amount, Ordering::SeqCst) + amount
        }

        fn owner(&self) -> Option<String> {
            None
        }

        fn reset(&self) {
            self.balance.store(0, Ordering::SeqCst);
        }

        fn stall(&self, millis: i64) -> i64 {
            std::thread::sleep(Duration::from_millis(millis as u64));
            millis
        }
    }

    struct TestServer {
        runtime: Runtime,
        handle: ShutdownHandle,
    }

    impl TestServer {
        fn start(policy: FaultPolicy) -> Self {
            let runtime = Runtime::new().unwrap();
            let registry = Arc::new(ServiceRegistry::default());
            let target: Arc<dyn Account> = Arc::new(Memory::default());
            registry.register("memory", 1, bind(target));

            let server = runtime
                .block_on(RpcServer::bind("127.0.0.1:0", Arc::new(Dispatcher::new(registry))))
                .unwrap()
                .with_fault_policy(policy);
            let handle = server.shutdown_handle().unwrap();
            runtime.spawn(server.run());
            Self { runtime, handle }
        }

        fn config(&self) -> RpcConfig {
            let addr = self.handle.local_addr();
            RpcConfig::new()
                .with_address(addr.ip().to_string())
                .with_port(addr.port())
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            self.handle.shutdown();
        }
    }

    const ACCOUNT: &str = <dyn Account as Interface>::ID;

    #[test]
    fn test_call_before_connect() {
        let client = RpcClient::new(RpcConfig::new()).unwrap();
        let err = client.invoke::<(i64,), i64>(ACCOUNT, "deposit", (1,)).unwrap_err();
        assert!(matches!(err, TetherError::NoConnection));
        assert!(!client.is_connected());
    }

    #[test]
    fn test_sequential_calls() {
        let server = TestServer::start(FaultPolicy::Reply);
        let client = RpcClient::new(server.config()).unwrap();
        client.connect().unwrap();
        assert!(client.is_connected());

        assert_eq!(client.invoke::<_, i64>(ACCOUNT, "deposit", (5i64,)).unwrap(), 5);
        assert_eq!(client.invoke::<_, i64>(ACCOUNT, "deposit", (7i64,)).unwrap(), 12);
        client.invoke_void(ACCOUNT, "reset", ()).unwrap();
        assert_eq!(client.invoke::<_, i64>(ACCOUNT, "deposit", (1i64,)).unwrap(), 1);
    }

    #[test]
    fn test_null_and_void_results() {
        let server = TestServer::start(FaultPolicy::Reply);
        let client = RpcClient::new(server.config()).unwrap();
        client.connect().unwrap();

        assert_eq!(client.call(ACCOUNT, "owner", ()).unwrap(), CallResult::ExplicitNull);
        assert_eq!(client.call(ACCOUNT, "reset", ()).unwrap(), CallResult::NoReturn);
        assert_eq!(client.invoke::<_, Option<String>>(ACCOUNT, "owner", ()).unwrap(), None);
    }

    #[test]
    fn test_remote_fault() {
        let server = TestServer::start(FaultPolicy::Reply);
        let client = RpcClient::new(server.config()).unwrap();
        client.connect().unwrap();

        let err = client
            .invoke::<_, i64>(ACCOUNT, "withdraw", (1i64,))
            .unwrap_err();
        assert!(matches!(err, TetherError::Remote { kind: FaultKind::MethodNotFound, .. }));
        assert!(client.is_connected());
    }

    #[test]
    fn test_closed_connection_unblocks_caller() {
        let server = TestServer::start(FaultPolicy::Close);
        let client = RpcClient::new(server.config()).unwrap();
        client.connect().unwrap();

        let err = client
            .invoke::<_, i64>(ACCOUNT, "withdraw", (1i64,))
            .unwrap_err();
        assert!(matches!(err, TetherError::ConnectionClosed));

        // Reconnecting gives a fresh connection
        client.connect().unwrap();
        assert_eq!(client.invoke::<_, i64>(ACCOUNT, "deposit", (3i64,)).unwrap(), 3);
    }

    #[test]
    fn test_call_timeout_closes_connection() {
        let server = TestServer::start(FaultPolicy::Reply);
        let config = server.config().with_call_timeout(Duration::from_millis(50));
        let client = RpcClient::new(config).unwrap();
        client.connect().unwrap();

        let err = client.invoke::<_, i64>(ACCOUNT, "stall", (500i64,)).unwrap_err();
        assert!(matches!(err, TetherError::Timeout(50)));
        assert!(!client.is_connected());
    }

    #[test]
    fn test_concurrent_callers_are_serialized() {
        let server = TestServer::start(FaultPolicy::Reply);
        let client = RpcClient::new(server.config()).unwrap();
        client.connect().unwrap();

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let client = client.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        client.invoke::<_, i64>(ACCOUNT, "deposit", (1i64,)).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(client.invoke::<_, i64>(ACCOUNT, "deposit", (0i64,)).unwrap(), 100);
    }

    #[test]
    fn test_close_stops_client() {
        let server = TestServer::start(FaultPolicy::Reply);
        let client = RpcClient::new(server.config()).unwrap();
        client.connect().unwrap();
        client.close();

        assert!(!client.is_connected());
        assert!(matches!(
            client.invoke_void(ACCOUNT, "reset", ()),
            Err(TetherError::NoConnection)
        ));
        assert!(matches!(client.connect(), Err(TetherError::NoConnection)));
    }
}
