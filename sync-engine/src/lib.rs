//! # sync-engine
//!
//! The interface chainsync-bridge consumes from an external chain-sync engine.
//!
//! The engine owns everything protocol-shaped: the node handshake, the
//! chain-sync and block-fetch mini-protocols, CBOR decoding, tip finding and
//! peer sharing. The bridge only ever talks to it through these traits:
//!
//! - [`SyncEngine`] - opens connections and answers one-shot lookups
//! - [`EngineSession`] - one connection: start, fetch ranges, stop, shut down
//! - [`ChainSyncListener`] - push-style callbacks the engine invokes from its own tasks
//!
//! ## Example
//!
//! ```ignore
//! use chainsync_engine::{MockEngine, SyncEngine, SyncMode};
//!
//! let engine = MockEngine::new();
//! let session = engine.connect(&params, Some(well_known.clone())).await?;
//!
//! // Blocks until the handshake completes, then events flow to the listener
//! session.start(SyncMode::FromPoint(well_known), listener).await?;
//! session.stop();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;

pub use engine::{
    ChainSyncListener, EngineBlock, EngineError, EngineSession, MockEngine, MockSession,
    SyncEngine, SyncMode,
};
