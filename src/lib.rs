//! # Tether
//!
//! Blocking remote calls over plain Rust traits.
//!
//! - [`common`]: wire protocol, framing, configuration, worker pool
//! - [`server`]: method tables, weighted selection, dispatcher, TCP server
//! - [`client`]: shared-connection client and remote stand-ins
//! - [`container`]: participant wiring and the client/server applications

pub use tether_client as client;
pub use tether_common as common;
pub use tether_container as container;
pub use tether_server as server;

pub use tether_client::{RemoteInterface, RpcClient, Stub};
pub use tether_common::{
    document_value, CallRequest, CallResult, FaultPolicy, Interface, Marshal, PoolConfig,
    RpcConfig, TetherError, WorkerPool,
};
pub use tether_container::{
    Application, Autowired, Descriptor, Participant, Participants, Reference, Role,
};
pub use tether_server::{MethodTable, ServiceInterface};
