use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use tether_common::config::FaultPolicy;
use tether_common::protocol::{CallResult, Result, TetherError};
use tether_common::transport::{FrameCodec, MessageCodec};

use crate::dispatcher::Dispatcher;

/// Async TCP server for tether services.
///
/// Accepts connections in a loop and spawns a task per connection. Each
/// connection carries one request and one response per cycle; the call
/// itself runs on a blocking worker so a slow service never stalls frame
/// reading on other connections.
pub struct RpcServer {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    fault_policy: FaultPolicy,
    shutdown: Arc<watch::Sender<bool>>,
}

/// Stops a running [`RpcServer`] from another task or thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
    local_addr: SocketAddr,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        tracing::info!(addr = %self.local_addr, "Shutdown requested");
        self.sender.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl RpcServer {
    /// Creates a server bound to `bind_addr` (e.g. "127.0.0.1:9999").
    pub async fn bind(bind_addr: &str, dispatcher: Arc<Dispatcher>) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr).await.map_err(|e| {
            TetherError::Connection(format!("Failed to bind to {}: {}", bind_addr, e))
        })?;
        let (sender, _) = watch::channel(false);

        Ok(Self {
            listener,
            dispatcher,
            fault_policy: FaultPolicy::default(),
            shutdown: Arc::new(sender),
        })
    }

    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| TetherError::Connection(format!("Failed to get local addr: {}", e)))
    }

    pub fn shutdown_handle(&self) -> Result<ShutdownHandle> {
        Ok(ShutdownHandle {
            sender: self.shutdown.clone(),
            local_addr: self.local_addr()?,
        })
    }

    /// Serves connections until the shutdown handle fires. Open connections
    /// are closed once the server stops.
    pub async fn run(self) -> Result<()> {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            return Ok(());
        }

        tracing::info!(addr = ?self.listener.local_addr().ok(), policy = ?self.fault_policy, "Server listening");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };
                    tracing::info!(peer = %peer, "Connection established");

                    let connection = Connection {
                        stream,
                        peer,
                        dispatcher: self.dispatcher.clone(),
                        fault_policy: self.fault_policy,
                        shutdown: self.shutdown.subscribe(),
                    };
                    tokio::spawn(async move {
                        if let Err(e) = connection.serve().await {
                            tracing::warn!(peer = %peer, error = %e, "Connection error");
                        }
                    });
                }
                _ = shutdown.changed() => {
                    tracing::info!("Server stopped");
                    return Ok(());
                }
            }
        }
    }
}

struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    fault_policy: FaultPolicy,
    shutdown: watch::Receiver<bool>,
}

impl Connection {
    async fn serve(mut self) -> Result<()> {
        if let Err(e) = self.stream.set_nodelay(true) {
            tracing::debug!(peer = %self.peer, error = %e, "Failed to set TCP_NODELAY");
        }

        loop {
            let frame = tokio::select! {
                frame = FrameCodec::read_frame_async(&mut self.stream) => frame?,
                _ = self.shutdown.changed() => return Ok(()),
            };
            let Some(payload) = frame else {
                tracing::debug!(peer = %self.peer, "Connection closed by peer");
                return Ok(());
            };

            let result = self.dispatch(payload).await;
            if result.is_error() && self.fault_policy == FaultPolicy::Close {
                tracing::warn!(peer = %self.peer, "Closing connection after failed call");
                return Ok(());
            }

            let encoded = MessageCodec::encode_result(&result)?;
            FrameCodec::write_frame_async(&mut self.stream, &encoded).await?;
        }
    }

    async fn dispatch(&self, payload: Vec<u8>) -> CallResult {
        let dispatcher = self.dispatcher.clone();
        match tokio::task::spawn_blocking(move || dispatcher.dispatch_bytes(&payload)).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(peer = %self.peer, error = %e, "Dispatch task failed");
                CallResult::fault(&TetherError::ServiceFailure(e.to_string()))
            }
        }
    }
}
