//! # sync-bridge
//!
//! Session bridge between a callback-driven chain-sync engine and callers
//! that can only make synchronous, poll-style calls (C FFI).
//!
//! ## Design
//!
//! - [`Bridge`] owns a tokio runtime, the engine and the [`Registry`] of live sessions
//! - Each session converts engine callbacks into a FIFO of [`SyncEvent`](chainsync_types::SyncEvent)s
//!   that callers drain one event per poll, with a bounded wait
//! - Start blocks the caller through the engine handshake; disconnects raised
//!   before the handshake returns are never observable
//! - Errors flatten to a [`StatusCode`] plus a human-readable message
//!
//! The C surface itself lives in `sync-ffi`; this crate has no `unsafe`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

pub mod bridge;
pub mod config;
pub mod error;
pub mod listener;
pub mod range;
pub mod registry;
pub mod session;

pub use bridge::Bridge;
pub use config::{BridgeConfig, ConfigError};
pub use error::{BridgeError, StatusCode};
pub use listener::{EventQueue, QueueListener};
pub use range::RangeSession;
pub use registry::{Registry, SessionTable};
pub use session::{SessionCore, SessionStatus, SyncSession};
