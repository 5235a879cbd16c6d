//! Tether Transport Layer
//!
//! This module provides the framing and codecs for sending/receiving calls.
//!
//! # Architecture
//!
//! - **Transport**: TCP, one long-lived connection per client
//! - **Envelope codec**: postcard
//! - **Wire Format**: `[4-byte length prefix as u32 big-endian] + [payload]`
//!
//! # Components
//!
//! - **[`FrameCodec`]**: length-prefixed framing (incremental, blocking and async)
//! - **[`MessageCodec`]**: `CallRequest` / `CallResult` envelopes
//! - **[`connect`]**: async connect helper
//!
//! # Message Size Limits
//!
//! Decoders refuse frames larger than [`MAX_FRAME_SIZE`] (100 MB) before
//! allocating the payload buffer.

pub mod codec;
pub mod frame;
pub mod tcp;

pub use codec::MessageCodec;
pub use frame::{FrameCodec, HEADER_LEN, MAX_FRAME_SIZE};
pub use tcp::{connect, map_io_error, DEFAULT_CONNECT_TIMEOUT};
