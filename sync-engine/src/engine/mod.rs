//! Engine abstraction for chainsync-bridge.
//!
//! This module describes the external sync engine as a small set of traits
//! so the bridge can drive any implementation (a real node client, the
//! in-process mock for testing).
//!
//! # Design
//!
//! The engine is async and connection-oriented:
//! - `connect()` opens a connection to one node
//! - `start()` performs the handshake and begins delivering events; it only
//!   returns once the handshake has completed
//! - `fetch_range()` asks for a bounded span of blocks and returns once issued
//! - `stop()` disconnects and releases the connection
//!
//! Events flow the other way, pushed into a [`ChainSyncListener`] from the
//! engine's own tasks.

mod mock;

pub use mock::{MockEngine, MockSession};

use async_trait::async_trait;
use chainsync_types::{ChainPoint, ConnectionParams, PeerAddress, Tip};
use std::sync::Arc;
use thiserror::Error;

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Could not reach the node.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The node rejected or aborted the handshake.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The node does not know the requested start point.
    #[error("intersection not found for {0}")]
    IntersectNotFound(ChainPoint),

    /// The operation needs a started connection.
    #[error("not connected")]
    NotConnected,

    /// A bounded wait inside the engine expired.
    #[error("engine timeout")]
    Timeout,

    /// Unexpected protocol behaviour.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Where a started connection begins delivering events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMode {
    /// Intersect at the given point and follow the chain from there.
    FromPoint(ChainPoint),
    /// Follow the chain from the node's current tip.
    FromTip,
    /// Handshake only; blocks arrive through [`EngineSession::fetch_range`].
    OnDemand,
}

/// A block as the engine hands it over.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineBlock {
    /// Ledger era name.
    pub era: String,
    /// Slot of the block.
    pub slot: u64,
    /// Hex-encoded block hash.
    pub hash: String,
    /// Height of the block.
    pub block_number: u64,
    /// Raw block CBOR, if the engine kept it.
    pub cbor: Option<Vec<u8>>,
    /// Decoded transactions as structured records.
    pub transactions: Vec<serde_json::Value>,
}

impl EngineBlock {
    /// The point this block sits at.
    pub fn point(&self) -> ChainPoint {
        ChainPoint::new(self.slot, self.hash.clone())
    }
}

/// Push-style callbacks raised by the engine.
///
/// Called from engine-owned tasks or threads; implementations must not block.
pub trait ChainSyncListener: Send + Sync {
    /// A block was received.
    fn on_block(&self, block: EngineBlock);

    /// The chain rolled back to `slot`. `hash` is `None` for origin.
    fn on_rollback(&self, slot: u64, hash: Option<String>);

    /// The connection dropped or was closed.
    fn on_disconnect(&self);

    /// A range fetch began delivering blocks.
    fn batch_started(&self);

    /// A range fetch finished delivering blocks.
    fn batch_done(&self);

    /// A range fetch found no blocks between `from` and `to`.
    fn no_block_found(&self, from: ChainPoint, to: ChainPoint);
}

/// Entry point of an external sync engine.
#[async_trait]
pub trait SyncEngine: Send + Sync {
    /// Open a connection to a node.
    ///
    /// `well_known` is the trusted anchor continuous sessions were created with.
    async fn connect(
        &self,
        params: &ConnectionParams,
        well_known: Option<ChainPoint>,
    ) -> Result<Arc<dyn EngineSession>, EngineError>;

    /// One-shot: connect, report the node's tip, disconnect.
    async fn find_tip(
        &self,
        params: &ConnectionParams,
        well_known: ChainPoint,
    ) -> Result<Tip, EngineError>;

    /// One-shot: connect, ask for up to `request_amount` peers, disconnect.
    async fn discover_peers(
        &self,
        params: &ConnectionParams,
        request_amount: u32,
    ) -> Result<Vec<PeerAddress>, EngineError>;
}

/// One open connection to a node.
#[async_trait]
pub trait EngineSession: Send + Sync {
    /// Perform the handshake and begin delivering events to `listener`.
    ///
    /// Completes only once the handshake has finished. Disconnect callbacks
    /// may fire while this is still pending.
    async fn start(
        &self,
        mode: SyncMode,
        listener: Arc<dyn ChainSyncListener>,
    ) -> Result<(), EngineError>;

    /// Request blocks in `[from, to]`. Returns once the request is issued;
    /// results arrive through the listener.
    async fn fetch_range(&self, from: ChainPoint, to: ChainPoint) -> Result<(), EngineError>;

    /// Disconnect and release the connection.
    fn stop(&self);

    /// Tear the connection down for good because the host is going away.
    ///
    /// Unlike [`stop`](EngineSession::stop), this also aborts a `start` that
    /// is still in its handshake.
    fn shutdown(&self);

    /// Whether the connection is still live. May lag a stop briefly.
    fn is_running(&self) -> bool;
}
