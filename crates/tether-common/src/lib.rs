//! Tether Common Types and Transport
//!
//! This crate provides the protocol definitions, framing, configuration and
//! worker pool shared by the tether client, server and container crates.
//!
//! # Overview
//!
//! Tether lets a process expose plain trait implementations as network
//! services and lets other processes call them through local stand-ins.
//! This crate contains the pieces both sides agree on:
//!
//! - **Protocol Layer**: call envelopes, value marshalling, error taxonomy
//! - **Transport Layer**: length-prefixed framing over TCP
//! - **Configuration**: `RpcConfig` and worker pool sizing
//! - **Worker Pool**: bounded, admission-controlled thread pool
//!
//! # Architecture
//!
//! - **Transport**: TCP, one connection per client, strict request/response alternation
//! - **Serialization**: postcard envelopes; values are structural or JSON documents
//! - **Message Format**: `[4-byte length prefix as u32 big-endian] + [payload]`
//! - **Max Message Size**: 100 MB
//!
//! # Example
//!
//! ```
//! use tether_common::{CallRequest, CallResult, Marshal, Params};
//! use tether_common::transport::MessageCodec;
//!
//! let request = CallRequest::new(
//!     "demo.PersonService",
//!     "number",
//!     <(i32,)>::type_names(),
//!     (5i32,).into_payloads().unwrap(),
//! );
//! let bytes = MessageCodec::encode_request(&request).unwrap();
//! assert_eq!(MessageCodec::decode_request(&bytes).unwrap(), request);
//!
//! let result = CallResult::returned(5i32.to_payload().unwrap());
//! assert_eq!(result.into_value::<i32>().unwrap(), 5);
//! ```

pub mod config;
pub mod pool;
pub mod protocol;
pub mod transport;

pub use config::{FaultPolicy, PoolConfig, RpcConfig};
pub use pool::{PoolStats, WorkerPool};
pub use protocol::*;
