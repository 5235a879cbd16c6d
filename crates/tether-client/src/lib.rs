//! Tether Client
//!
//! This crate provides the blocking RPC client used by remote stand-ins.
//! One [`RpcClient`] owns one connection; calls through it are strictly
//! serialised, one request and one response at a time.

pub mod client;
mod connection;
pub mod remote;

pub use client::RpcClient;
pub use remote::{stand_in, RemoteInterface, Stub};
