//! Listener-to-queue bridge.
//!
//! The engine pushes callbacks from its own tasks; foreign callers pull
//! events one at a time. [`QueueListener`] is the only producer into a
//! session's queue and [`EventQueue::next`] the only consumer.
//!
//! The queue is unbounded: a poller that stops polling lets it grow without
//! limit. Depth is logged at trace level on every push and pop.

use chainsync_core::Lifecycle;
use chainsync_engine::{ChainSyncListener, EngineBlock};
use chainsync_types::{
    BlockEvent, ChainPoint, NoBlockFoundEvent, RollbackEvent, SessionId, SessionKind, SyncEvent,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace};

/// FIFO of events for one session.
pub struct EventQueue {
    // Kept so the channel never closes while the session lives.
    tx: mpsc::UnboundedSender<SyncEvent>,
    rx: Mutex<mpsc::UnboundedReceiver<SyncEvent>>,
    depth: Arc<AtomicUsize>,
}

impl EventQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            depth: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Build a listener feeding this queue.
    ///
    /// Disconnects are only enqueued when `lifecycle` says the session has
    /// left the handshake.
    pub fn listener(
        &self,
        id: SessionId,
        kind: SessionKind,
        lifecycle: Arc<Lifecycle>,
    ) -> QueueListener {
        QueueListener {
            id,
            kind,
            lifecycle,
            tx: self.tx.clone(),
            depth: Arc::clone(&self.depth),
        }
    }

    /// Wait up to `timeout` for the next event.
    ///
    /// Returns `None` if nothing arrived in time.
    pub async fn next(&self, timeout: Duration) -> Option<SyncEvent> {
        let received = tokio::time::timeout(timeout, async {
            let mut rx = self.rx.lock().await;
            rx.recv().await
        })
        .await;

        match received {
            Ok(Some(event)) => {
                let depth = self.depth.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
                trace!(kind = event.kind(), depth, "event dequeued");
                Some(event)
            }
            _ => None,
        }
    }

    /// Number of events waiting.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine listener that turns every callback into one queued [`SyncEvent`].
pub struct QueueListener {
    id: SessionId,
    kind: SessionKind,
    lifecycle: Arc<Lifecycle>,
    tx: mpsc::UnboundedSender<SyncEvent>,
    depth: Arc<AtomicUsize>,
}

impl QueueListener {
    fn push(&self, event: SyncEvent) {
        let kind = event.kind();
        self.depth.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(event).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            return;
        }
        trace!(
            session = %self.id,
            kind,
            depth = self.depth.load(Ordering::SeqCst),
            "event queued"
        );
    }
}

impl ChainSyncListener for QueueListener {
    fn on_block(&self, block: EngineBlock) {
        self.push(SyncEvent::Block(BlockEvent {
            era: block.era,
            slot: block.slot,
            hash: block.hash,
            block_number: block.block_number,
            block_cbor: block.cbor.map(hex::encode),
            transactions: block.transactions,
        }));
    }

    fn on_rollback(&self, slot: u64, hash: Option<String>) {
        self.push(SyncEvent::Rollback(RollbackEvent { slot, hash }));
    }

    fn on_disconnect(&self) {
        let phase = self.lifecycle.phase();
        if phase.delivers_disconnect() {
            self.push(SyncEvent::Disconnect);
        } else {
            debug!(session = %self.id, kind = %self.kind, %phase, "disconnect suppressed");
        }
    }

    fn batch_started(&self) {
        self.push(SyncEvent::BatchStarted);
    }

    fn batch_done(&self) {
        self.push(SyncEvent::BatchDone);
    }

    fn no_block_found(&self, from: ChainPoint, to: ChainPoint) {
        self.push(SyncEvent::NoBlockFound(NoBlockFoundEvent { from, to }));
    }
}
