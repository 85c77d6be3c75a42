//! Sync events and their JSON wire format.
//!
//! Every event serializes to a JSON object whose `type` field names the
//! variant. Optional fields that are absent are omitted, never `null`:
//!
//! ```text
//! {"type":"block","era":"Babbage","slot":4492900,"hash":"…","blockNumber":4490511,"transactions":[…]}
//! {"type":"rollback","slot":4492800,"hash":"…"}
//! {"type":"disconnect"}
//! {"type":"batch_started"}
//! {"type":"batch_done"}
//! {"type":"no_block_found","from":{"slot":100,"hash":"…"},"to":{"slot":100,"hash":"…"}}
//! {"type":"timeout"}
//! ```

use serde::{Deserialize, Serialize};

use crate::{ChainPoint, SyncError};

/// All events a poller can observe.
///
/// `Timeout` is never queued; poll synthesizes it when no event arrives
/// before the deadline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A block was received
    Block(BlockEvent),
    /// The chain rolled back; blocks after the point are invalid
    Rollback(RollbackEvent),
    /// The connection to the node was lost or closed
    Disconnect,
    /// A range fetch started delivering blocks
    BatchStarted,
    /// A range fetch finished delivering blocks
    BatchDone,
    /// A range fetch found nothing between the requested points
    NoBlockFound(NoBlockFoundEvent),
    /// No event arrived before the poll deadline
    Timeout,
}

impl SyncEvent {
    /// The wire discriminant of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncEvent::Block(_) => "block",
            SyncEvent::Rollback(_) => "rollback",
            SyncEvent::Disconnect => "disconnect",
            SyncEvent::BatchStarted => "batch_started",
            SyncEvent::BatchDone => "batch_done",
            SyncEvent::NoBlockFound(_) => "no_block_found",
            SyncEvent::Timeout => "timeout",
        }
    }

    /// Serialize to the JSON wire format.
    pub fn to_json(&self) -> Result<String, SyncError> {
        serde_json::to_string(self).map_err(SyncError::Serialization)
    }

    /// Parse from the JSON wire format.
    pub fn from_json(json: &str) -> Result<Self, SyncError> {
        serde_json::from_str(json).map_err(SyncError::Deserialization)
    }
}

/// A block delivered by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockEvent {
    /// Ledger era the block belongs to (e.g. "Babbage").
    pub era: String,
    /// Slot of the block.
    pub slot: u64,
    /// Hex-encoded block hash.
    pub hash: String,
    /// Height of the block.
    pub block_number: u64,
    /// Hex-encoded raw block CBOR, when the engine supplies it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_cbor: Option<String>,
    /// Transactions as structured records, passed through unchanged.
    #[serde(default)]
    pub transactions: Vec<serde_json::Value>,
}

impl BlockEvent {
    /// The point this block sits at.
    pub fn point(&self) -> ChainPoint {
        ChainPoint::new(self.slot, self.hash.clone())
    }
}

/// Target of a rollback. The hash is absent when rolling back to origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackEvent {
    /// Slot rolled back to.
    pub slot: u64,
    /// Hash of the block rolled back to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// The range a fetch was asked for when nothing was found in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoBlockFoundEvent {
    /// Requested lower bound.
    pub from: ChainPoint,
    /// Requested upper bound.
    pub to: ChainPoint,
}
