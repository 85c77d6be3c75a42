//! # sync-core
//!
//! Pure session logic for chainsync-bridge (no I/O, instant tests).
//!
//! This crate holds the rules the bridge enforces around every session
//! without touching the network or the engine:
//!
//! - [`Phase`] / [`Lifecycle`]: the Created → Starting → Started → Stopped
//!   state machine, applied with a single compare-and-swap per transition so
//!   concurrent callers from arbitrary foreign threads agree on the outcome.
//!   The same phase decides whether an engine disconnect is user-visible.
//! - [`PollTimeout`]: how a caller-supplied poll timeout becomes a bounded wait.
//!
//! The actual I/O (engine handshake, event queue) lives in `sync-bridge`,
//! which consults these types before and after each engine call.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod lifecycle;
pub mod timeout;

pub use lifecycle::{Lifecycle, LifecycleError, Phase, Transition};
pub use timeout::{PollTimeout, DEFAULT_POLL_TIMEOUT_MS, MAX_POLL_TIMEOUT_MS};
