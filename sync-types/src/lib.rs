//! # sync-types
//!
//! Value types shared by every chainsync-bridge crate.
//!
//! - [`ChainPoint`], [`ConnectionParams`] - where to sync from, whom to talk to
//! - [`SessionId`], [`SessionKind`] - registry identity
//! - [`SyncEvent`] - the closed set of events a poller can observe, and its JSON wire format
//! - [`Tip`], [`PeerAddress`], [`Network`] - lookup results and well-known network constants
//! - [`SyncError`] - error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod event;
mod ids;
mod network;
mod point;

pub use error::SyncError;
pub use event::{BlockEvent, NoBlockFoundEvent, RollbackEvent, SyncEvent};
pub use ids::{SessionId, SessionKind};
pub use network::{Network, PeerAddress, Tip};
pub use point::{ChainPoint, ConnectionParams};
