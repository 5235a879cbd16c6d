//! The single shared connection behind an [`RpcClient`](crate::RpcClient).
//!
//! A reader task and a writer task own the two halves of the socket. The
//! calling thread hands an encoded request to the writer and parks on a
//! one-shot channel stored in the pending slot; the reader fills that slot
//! with the next decoded result. There is no request id on the wire, so at
//! most one slot exists at a time.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc as async_mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use tether_common::protocol::{CallResult, Result, TetherError};
use tether_common::transport::{FrameCodec, MessageCodec};

type Reply = Result<CallResult>;

/// Where the reader delivers the next result.
#[derive(Default)]
struct PendingSlot {
    waiter: Mutex<Option<oneshot::Sender<Reply>>>,
}

impl PendingSlot {
    fn arm(&self) -> Result<oneshot::Receiver<Reply>> {
        let mut waiter = self.waiter.lock().unwrap_or_else(PoisonError::into_inner);
        if waiter.is_some() {
            return Err(TetherError::Connection(
                "a call is already awaiting a response".to_string(),
            ));
        }
        let (tx, rx) = oneshot::channel();
        *waiter = Some(tx);
        Ok(rx)
    }

    fn take(&self) -> Option<oneshot::Sender<Reply>> {
        self.waiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn fail(&self, err: TetherError) {
        if let Some(waiter) = self.take() {
            let _ = waiter.send(Err(err));
        }
    }
}

struct Shared {
    peer: SocketAddr,
    pending: PendingSlot,
    open: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Shared {
    fn close(&self, reason: &str) {
        if !self.open.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!(peer = %self.peer, reason, "Closing connection");
        self.pending.fail(TetherError::ConnectionClosed);
        for task in self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
    }
}

/// Handle to an open connection. Clones share the same socket.
#[derive(Clone)]
pub(crate) struct Connection {
    outbound: async_mpsc::UnboundedSender<Vec<u8>>,
    shared: Arc<Shared>,
}

impl Connection {
    /// Splits `stream` and starts its reader and writer on `runtime`.
    pub(crate) fn open(stream: TcpStream, runtime: &Handle) -> Result<Self> {
        let peer = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();
        let (outbound, inbound) = async_mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            peer,
            pending: PendingSlot::default(),
            open: AtomicBool::new(true),
            tasks: Mutex::new(Vec::new()),
        });

        let reader = runtime.spawn(read_loop(read_half, shared.clone()));
        let writer = runtime.spawn(write_loop(write_half, inbound, shared.clone()));
        shared
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([reader, writer]);

        tracing::info!(peer = %peer, "Connected");
        Ok(Self { outbound, shared })
    }

    pub(crate) fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    pub(crate) fn peer(&self) -> SocketAddr {
        self.shared.peer
    }

    /// Registers the caller as the pending request and queues the frame.
    /// The returned receiver yields exactly one reply.
    pub(crate) fn send(&self, payload: Vec<u8>) -> Result<oneshot::Receiver<Reply>> {
        if !self.is_open() {
            return Err(TetherError::ConnectionClosed);
        }
        let reply = self.shared.pending.arm()?;
        if self.outbound.send(payload).is_err() {
            self.shared.pending.take();
            return Err(TetherError::ConnectionClosed);
        }
        Ok(reply)
    }

    pub(crate) fn close(&self, reason: &str) {
        self.shared.close(reason);
    }
}

async fn read_loop(mut read_half: OwnedReadHalf, shared: Arc<Shared>) {
    loop {
        let frame = match FrameCodec::read_frame_async(&mut read_half).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::debug!(peer = %shared.peer, "Connection closed by server");
                break;
            }
            Err(e) => {
                tracing::warn!(peer = %shared.peer, error = %e, "Failed to read response");
                break;
            }
        };

        let Some(waiter) = shared.pending.take() else {
            tracing::error!(peer = %shared.peer, error = %TetherError::NoPendingRequest, "Protocol desync");
            break;
        };

        let reply = MessageCodec::decode_result(&frame);
        if let Err(e) = &reply {
            tracing::warn!(peer = %shared.peer, error = %e, "Failed to decode response");
        }
        let _ = waiter.send(reply);
    }
    shared.close("reader stopped");
}

async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut inbound: async_mpsc::UnboundedReceiver<Vec<u8>>,
    shared: Arc<Shared>,
) {
    while let Some(payload) = inbound.recv().await {
        if let Err(e) = FrameCodec::write_frame_async(&mut write_half, &payload).await {
            tracing::warn!(peer = %shared.peer, error = %e, "Failed to send request");
            break;
        }
    }
    shared.close("writer stopped");
}
