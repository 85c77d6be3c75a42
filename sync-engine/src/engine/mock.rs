//! Mock engine for testing.
//!
//! Serves a scripted chain from memory and lets tests inject the awkward
//! parts of a real node: slow handshakes, disconnect churn during the
//! handshake, unreachable hosts and failed starts.

use super::{ChainSyncListener, EngineBlock, EngineError, EngineSession, SyncEngine, SyncMode};
use async_trait::async_trait;
use chainsync_types::{ChainPoint, ConnectionParams, PeerAddress, Tip};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Slot distance between consecutive blocks of a generated chain.
const SLOT_STEP: u64 = 20;

/// Mock sync engine.
///
/// Clones share state, so a test can keep one handle for scripting and
/// inspection while the bridge owns another.
#[derive(Clone, Default)]
pub struct MockEngine {
    inner: Arc<Mutex<MockEngineInner>>,
}

#[derive(Default)]
struct MockEngineInner {
    chain: Vec<EngineBlock>,
    peers: Vec<PeerAddress>,
    unreachable: HashSet<String>,
    handshake_delay: Duration,
    handshake_disconnects: usize,
    block_interval: Duration,
    lookup_delay: Duration,
    fail_next_connect: Option<String>,
    fail_next_start: Option<String>,
    connect_count: usize,
    sessions: Vec<MockSession>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockEngine {
    /// Create a mock engine with an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a deterministic chain: the anchor block followed by `len` blocks.
    ///
    /// Slots advance by 20 and hashes are derived from the slot, so two
    /// chains built from the same anchor are identical.
    pub fn chain_from(anchor: &ChainPoint, len: usize) -> Vec<EngineBlock> {
        let base_height = anchor.slot / SLOT_STEP;
        let mut chain = Vec::with_capacity(len + 1);
        chain.push(mock_block(anchor.clone(), base_height));
        for i in 1..=len as u64 {
            let slot = anchor.slot + i * SLOT_STEP;
            let point = ChainPoint::from_hash_bytes(slot, &slot.to_be_bytes().repeat(4));
            chain.push(mock_block(point, base_height + i));
        }
        chain
    }

    /// Replace the served chain. Blocks must be in slot order.
    pub fn set_chain(&self, chain: Vec<EngineBlock>) {
        lock(&self.inner).chain = chain;
    }

    /// How long `start()` takes to complete the handshake.
    pub fn set_handshake_delay(&self, delay: Duration) {
        lock(&self.inner).handshake_delay = delay;
    }

    /// Number of disconnect callbacks raised while the handshake is in progress.
    pub fn set_handshake_disconnects(&self, count: usize) {
        lock(&self.inner).handshake_disconnects = count;
    }

    /// Pause between streamed blocks.
    pub fn set_block_interval(&self, interval: Duration) {
        lock(&self.inner).block_interval = interval;
    }

    /// How long tip and peer lookups take.
    pub fn set_lookup_delay(&self, delay: Duration) {
        lock(&self.inner).lookup_delay = delay;
    }

    /// Peers returned by peer discovery.
    pub fn set_peers(&self, peers: Vec<PeerAddress>) {
        lock(&self.inner).peers = peers;
    }

    /// Make every connection to `host` fail.
    pub fn mark_unreachable(&self, host: &str) {
        lock(&self.inner).unreachable.insert(host.to_string());
    }

    /// Cause the next connect() to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        lock(&self.inner).fail_next_connect = Some(error.to_string());
    }

    /// Cause the next start() to fail its handshake with the given error.
    pub fn fail_next_start(&self, error: &str) {
        lock(&self.inner).fail_next_start = Some(error.to_string());
    }

    /// Number of successful connects.
    pub fn connect_count(&self) -> usize {
        lock(&self.inner).connect_count
    }

    /// Every session opened so far, oldest first.
    pub fn sessions(&self) -> Vec<MockSession> {
        lock(&self.inner).sessions.clone()
    }

    /// Simulate every node dropping its connection.
    pub fn disconnect_all(&self) {
        for session in self.sessions() {
            session.drop_connection();
        }
    }

    fn check_reachable(&self, params: &ConnectionParams) -> Result<(), EngineError> {
        if lock(&self.inner).unreachable.contains(&params.host) {
            return Err(EngineError::ConnectionFailed(format!(
                "{} is unreachable",
                params.address()
            )));
        }
        Ok(())
    }

    async fn lookup_delay(&self) {
        let delay = lock(&self.inner).lookup_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn mock_block(point: ChainPoint, block_number: u64) -> EngineBlock {
    EngineBlock {
        era: "Babbage".to_string(),
        slot: point.slot,
        transactions: vec![json!({
            "txHash": point.hash,
            "fee": 170000,
            "outputs": [],
        })],
        hash: point.hash,
        block_number,
        cbor: Some(vec![0x82, 0x01, 0xa0]),
    }
}

#[async_trait]
impl SyncEngine for MockEngine {
    async fn connect(
        &self,
        params: &ConnectionParams,
        well_known: Option<ChainPoint>,
    ) -> Result<Arc<dyn EngineSession>, EngineError> {
        if let Some(error) = lock(&self.inner).fail_next_connect.take() {
            return Err(EngineError::ConnectionFailed(error));
        }
        self.check_reachable(params)?;

        let session = MockSession::new(Arc::clone(&self.inner), well_known);
        let mut inner = lock(&self.inner);
        inner.connect_count += 1;
        inner.sessions.push(session.clone());
        debug!(address = %params.address(), "mock connection opened");
        Ok(Arc::new(session))
    }

    async fn find_tip(
        &self,
        params: &ConnectionParams,
        well_known: ChainPoint,
    ) -> Result<Tip, EngineError> {
        self.check_reachable(params)?;
        self.lookup_delay().await;
        debug!(address = %params.address(), from = %well_known, "mock tip lookup");

        let inner = lock(&self.inner);
        let tip = match inner.chain.last() {
            Some(block) => Tip {
                slot: block.slot,
                hash: block.hash.clone(),
                block: block.block_number,
            },
            None => Tip {
                slot: well_known.slot,
                hash: well_known.hash,
                block: 0,
            },
        };
        Ok(tip)
    }

    async fn discover_peers(
        &self,
        params: &ConnectionParams,
        request_amount: u32,
    ) -> Result<Vec<PeerAddress>, EngineError> {
        self.check_reachable(params)?;
        self.lookup_delay().await;

        let inner = lock(&self.inner);
        Ok(inner
            .peers
            .iter()
            .take(request_amount as usize)
            .cloned()
            .collect())
    }
}

/// One mock connection.
///
/// Clones share state; the engine keeps a clone of every session it opens
/// so tests can inspect stop and fetch counters afterwards.
#[derive(Clone)]
pub struct MockSession {
    inner: Arc<MockSessionInner>,
}

struct MockSessionInner {
    engine: Arc<Mutex<MockEngineInner>>,
    anchor: Option<ChainPoint>,
    running: AtomicBool,
    listener: Mutex<Option<Arc<dyn ChainSyncListener>>>,
    // Held while a callback runs, so stop() never interleaves with an emit.
    emit: Mutex<()>,
    stream: Mutex<Option<JoinHandle<()>>>,
    start_count: AtomicUsize,
    stop_count: AtomicUsize,
    shutdown_count: AtomicUsize,
    shut_down: AtomicBool,
    fetch_count: AtomicUsize,
}

enum Streamed {
    Rollback(u64, Option<String>),
    Block(EngineBlock),
}

impl MockSessionInner {
    /// Run `f` against the listener unless the connection has gone away.
    fn emit(&self, f: impl FnOnce(&dyn ChainSyncListener)) -> bool {
        let _guard = lock(&self.emit);
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        let listener = lock(&self.listener).clone();
        match listener {
            Some(listener) => {
                f(listener.as_ref());
                true
            }
            None => false,
        }
    }

    /// Mark the connection closed and tell the listener, once.
    fn close(&self) {
        {
            let _guard = lock(&self.emit);
            if self.running.swap(false, Ordering::SeqCst) {
                if let Some(listener) = lock(&self.listener).clone() {
                    listener.on_disconnect();
                }
            }
        }
        if let Some(handle) = lock(&self.stream).take() {
            handle.abort();
        }
    }
}

impl MockSession {
    fn new(engine: Arc<Mutex<MockEngineInner>>, anchor: Option<ChainPoint>) -> Self {
        Self {
            inner: Arc::new(MockSessionInner {
                engine,
                anchor,
                running: AtomicBool::new(true),
                listener: Mutex::new(None),
                emit: Mutex::new(()),
                stream: Mutex::new(None),
                start_count: AtomicUsize::new(0),
                stop_count: AtomicUsize::new(0),
                shutdown_count: AtomicUsize::new(0),
                shut_down: AtomicBool::new(false),
                fetch_count: AtomicUsize::new(0),
            }),
        }
    }

    /// Well-known point the session was connected with.
    pub fn anchor(&self) -> Option<&ChainPoint> {
        self.inner.anchor.as_ref()
    }

    /// Number of start() calls.
    pub fn start_count(&self) -> usize {
        self.inner.start_count.load(Ordering::SeqCst)
    }

    /// Number of stop() calls.
    pub fn stop_count(&self) -> usize {
        self.inner.stop_count.load(Ordering::SeqCst)
    }

    /// Number of shutdown() calls.
    pub fn shutdown_count(&self) -> usize {
        self.inner.shutdown_count.load(Ordering::SeqCst)
    }

    /// Number of fetch_range() calls that reached the node.
    pub fn fetch_count(&self) -> usize {
        self.inner.fetch_count.load(Ordering::SeqCst)
    }

    /// Simulate the node closing the connection.
    pub fn drop_connection(&self) {
        self.inner.close();
    }

    fn resolve(&self, mode: &SyncMode, chain: &[EngineBlock]) -> Result<Vec<Streamed>, EngineError> {
        match mode {
            SyncMode::FromPoint(point) => {
                let index = chain
                    .iter()
                    .position(|block| block.slot == point.slot && block.hash == point.hash)
                    .ok_or_else(|| EngineError::IntersectNotFound(point.clone()))?;
                let mut events = vec![Streamed::Rollback(point.slot, Some(point.hash.clone()))];
                events.extend(chain[index + 1..].iter().cloned().map(Streamed::Block));
                Ok(events)
            }
            SyncMode::FromTip => Ok(vec![match chain.last() {
                Some(tip) => Streamed::Rollback(tip.slot, Some(tip.hash.clone())),
                None => Streamed::Rollback(0, None),
            }]),
            SyncMode::OnDemand => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl EngineSession for MockSession {
    async fn start(
        &self,
        mode: SyncMode,
        listener: Arc<dyn ChainSyncListener>,
    ) -> Result<(), EngineError> {
        self.inner.start_count.fetch_add(1, Ordering::SeqCst);
        *lock(&self.inner.listener) = Some(listener);

        let (delay, churn, interval, failure, chain) = {
            let mut engine = lock(&self.inner.engine);
            (
                engine.handshake_delay,
                engine.handshake_disconnects,
                engine.block_interval,
                engine.fail_next_start.take(),
                engine.chain.clone(),
            )
        };

        for _ in 0..churn {
            self.inner.emit(|l| l.on_disconnect());
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.inner.shut_down.load(Ordering::SeqCst) {
            return Err(EngineError::NotConnected);
        }
        if let Some(error) = failure {
            return Err(EngineError::HandshakeFailed(error));
        }

        let events = self.resolve(&mode, &chain)?;
        if events.is_empty() || !self.is_running() {
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            for (i, event) in events.into_iter().enumerate() {
                if i > 0 && !interval.is_zero() {
                    tokio::time::sleep(interval).await;
                }
                let delivered = match event {
                    Streamed::Rollback(slot, hash) => inner.emit(|l| l.on_rollback(slot, hash)),
                    Streamed::Block(block) => inner.emit(|l| l.on_block(block)),
                };
                if !delivered {
                    break;
                }
            }
        });
        *lock(&self.inner.stream) = Some(handle);
        Ok(())
    }

    async fn fetch_range(&self, from: ChainPoint, to: ChainPoint) -> Result<(), EngineError> {
        if !self.is_running() || lock(&self.inner.listener).is_none() {
            return Err(EngineError::NotConnected);
        }
        self.inner.fetch_count.fetch_add(1, Ordering::SeqCst);
        debug!(from = %from, to = %to, "mock range fetch");

        let chain = lock(&self.inner.engine).chain.clone();
        let find = |p: &ChainPoint| {
            chain
                .iter()
                .position(|block| block.slot == p.slot && block.hash == p.hash)
        };

        match (find(&from), find(&to)) {
            (Some(start), Some(end)) if start <= end => {
                let batch = chain[start..=end].to_vec();
                self.inner.emit(move |l| {
                    l.batch_started();
                    for block in batch {
                        l.on_block(block);
                    }
                    l.batch_done();
                });
            }
            _ => {
                self.inner.emit(|l| l.no_block_found(from, to));
            }
        }
        Ok(())
    }

    fn stop(&self) {
        self.inner.stop_count.fetch_add(1, Ordering::SeqCst);
        self.inner.close();
    }

    fn shutdown(&self) {
        self.inner.shutdown_count.fetch_add(1, Ordering::SeqCst);
        self.inner.shut_down.store(true, Ordering::SeqCst);
        self.inner.close();
    }

    fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }
}
