//! Bridge facade.
//!
//! [`Bridge`] is the Rust-side shape of the C surface: every method
//! corresponds to one entry point, takes caller arguments as they arrive
//! (optional strings, signed integers) and returns either a payload or a
//! [`BridgeError`] carrying its status code.
//!
//! The bridge owns the tokio runtime engine tasks run on. Callers are
//! expected to be plain threads; blocking methods must not be called from
//! inside that runtime.

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::range::RangeSession;
use crate::registry::Registry;
use crate::session::{SessionStatus, SyncSession};
use chainsync_core::PollTimeout;
use chainsync_engine::SyncEngine;
use chainsync_types::{ChainPoint, ConnectionParams, PeerAddress, SessionId, Tip};
use std::sync::Arc;
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info};

/// Owns the runtime, the engine and every live session.
pub struct Bridge {
    config: BridgeConfig,
    poll_timeout: PollTimeout,
    runtime: Runtime,
    engine: Arc<dyn SyncEngine>,
    registry: Registry,
}

impl Bridge {
    /// Build a bridge around `engine`.
    pub fn new(config: BridgeConfig, engine: Arc<dyn SyncEngine>) -> Result<Self, BridgeError> {
        config
            .validate()
            .map_err(|e| BridgeError::InvalidArgument(e.to_string()))?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.runtime.worker_threads)
            .thread_name(config.runtime.thread_name.clone())
            .enable_all()
            .build()
            .map_err(|e| BridgeError::General(format!("failed to start runtime: {}", e)))?;

        info!(
            workers = config.runtime.worker_threads,
            poll_default_ms = config.poll.default_timeout_ms,
            poll_max_ms = config.poll.max_timeout_ms,
            "bridge initialized"
        );
        Ok(Self {
            poll_timeout: config.poll_timeout(),
            config,
            runtime,
            engine,
            registry: Registry::new(),
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Session tables.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn handle(&self) -> &Handle {
        self.runtime.handle()
    }

    // ===========================================
    // One-shot lookups
    // ===========================================

    /// Connect, report the node's tip, disconnect.
    pub fn tip_find(
        &self,
        host: Option<String>,
        port: i32,
        protocol_magic: u64,
        well_known_slot: u64,
        well_known_hash: Option<String>,
        timeout_ms: i64,
    ) -> Result<Tip, BridgeError> {
        let params = ConnectionParams::new(host, port, protocol_magic)?;
        let well_known = ChainPoint::required(well_known_slot, well_known_hash, "Well-known hash")?;
        let timeout = self.config.tip_timeout(timeout_ms);
        debug!(address = %params.address(), ?timeout, "tip lookup");

        self.handle()
            .block_on(async {
                tokio::time::timeout(timeout, self.engine.find_tip(&params, well_known)).await
            })
            .map_err(|_| {
                BridgeError::Timeout(format!("Tip finder timed out after {} ms", timeout.as_millis()))
            })?
            .map_err(|e| BridgeError::lookup("Tip finder", e))
    }

    /// Connect, ask for up to `request_amount` peers, disconnect.
    pub fn peer_discovery(
        &self,
        host: Option<String>,
        port: i32,
        protocol_magic: u64,
        request_amount: i32,
        timeout_ms: i64,
    ) -> Result<Vec<PeerAddress>, BridgeError> {
        let params = ConnectionParams::new(host, port, protocol_magic)?;
        let request_amount = u32::try_from(request_amount).map_err(|_| {
            BridgeError::InvalidArgument(format!("Invalid request amount: {}", request_amount))
        })?;
        let timeout = self.config.peer_timeout(timeout_ms);
        debug!(address = %params.address(), request_amount, ?timeout, "peer discovery");

        self.handle()
            .block_on(async {
                tokio::time::timeout(
                    timeout,
                    self.engine.discover_peers(&params, request_amount),
                )
                .await
            })
            .map_err(|_| {
                BridgeError::Timeout(format!(
                    "Peer discovery timed out after {} ms",
                    timeout.as_millis()
                ))
            })?
            .map_err(|e| BridgeError::lookup("Peer discovery", e))
    }

    // ===========================================
    // Continuous sync sessions
    // ===========================================

    /// Register a continuous session. Nothing is contacted yet.
    pub fn block_sync_create(
        &self,
        host: Option<String>,
        port: i32,
        protocol_magic: u64,
        well_known_slot: u64,
        well_known_hash: Option<String>,
    ) -> Result<SessionId, BridgeError> {
        let params = ConnectionParams::new(host, port, protocol_magic)?;
        let well_known = ChainPoint::required(well_known_slot, well_known_hash, "Well-known hash")?;

        let id = self.registry.allocate()?;
        info!(session = %id, address = %params.address(), %well_known, "block sync session created");
        self.registry
            .continuous
            .put(id, Arc::new(SyncSession::new(id, params, well_known)));
        Ok(id)
    }

    /// Start a continuous session from a point. Blocks through the handshake.
    pub fn block_sync_start(
        &self,
        id: SessionId,
        from_slot: u64,
        from_hash: Option<String>,
    ) -> Result<(), BridgeError> {
        let session = self.registry.continuous.require(id)?;
        session.core().ensure_startable()?;
        let from = ChainPoint::required(from_slot, from_hash, "From hash")?;
        session.start(self.handle(), self.engine.as_ref(), from)
    }

    /// Start a continuous session from the node's tip. Blocks through the handshake.
    pub fn block_sync_start_from_tip(&self, id: SessionId) -> Result<(), BridgeError> {
        let session = self.registry.continuous.require(id)?;
        session.core().ensure_startable()?;
        session.start_from_tip(self.handle(), self.engine.as_ref())
    }

    /// Wait for one event and return it as JSON.
    pub fn block_sync_poll(&self, id: SessionId, timeout_ms: i64) -> Result<String, BridgeError> {
        let session = self.registry.continuous.require(id)?;
        session.poll(self.handle(), self.poll_timeout.resolve(timeout_ms))
    }

    /// Stop a continuous session. It stays registered and may be restarted.
    pub fn block_sync_stop(&self, id: SessionId) -> Result<(), BridgeError> {
        self.registry.continuous.require(id)?.stop();
        Ok(())
    }

    /// Unregister a continuous session, stopping it first if needed.
    pub fn block_sync_destroy(&self, id: SessionId) -> Result<(), BridgeError> {
        let session = self
            .registry
            .continuous
            .remove(id)
            .ok_or(BridgeError::SessionNotFound(i64::from(id.value())))?;
        session.stop();
        info!(session = %id, "block sync session destroyed");
        Ok(())
    }

    /// Current status of a continuous session.
    pub fn block_sync_status(&self, id: SessionId) -> Result<SessionStatus, BridgeError> {
        Ok(self.registry.continuous.require(id)?.status())
    }

    // ===========================================
    // Range sync sessions
    // ===========================================

    /// Register a range session. Nothing is contacted yet.
    pub fn block_range_sync_create(
        &self,
        host: Option<String>,
        port: i32,
        protocol_magic: u64,
    ) -> Result<SessionId, BridgeError> {
        let params = ConnectionParams::new(host, port, protocol_magic)?;

        let id = self.registry.allocate()?;
        info!(session = %id, address = %params.address(), "block range sync session created");
        self.registry
            .range
            .put(id, Arc::new(RangeSession::new(id, params)));
        Ok(id)
    }

    /// Connect and handshake a range session. Blocks through the handshake.
    pub fn block_range_sync_start(&self, id: SessionId) -> Result<(), BridgeError> {
        let session = self.registry.range.require(id)?;
        session.core().ensure_startable()?;
        session.start(self.handle(), self.engine.as_ref())
    }

    /// Request the blocks in `[from, to]`. Returns once the request is issued.
    pub fn block_range_sync_fetch(
        &self,
        id: SessionId,
        from_slot: u64,
        from_hash: Option<String>,
        to_slot: u64,
        to_hash: Option<String>,
    ) -> Result<(), BridgeError> {
        let session = self.registry.range.require(id)?;
        session.core().ensure_started()?;
        let from = ChainPoint::required(from_slot, from_hash, "From hash")?;
        let to = ChainPoint::required(to_slot, to_hash, "To hash")?;
        session.fetch(self.handle(), from, to)
    }

    /// Wait for one event and return it as JSON.
    pub fn block_range_sync_poll(
        &self,
        id: SessionId,
        timeout_ms: i64,
    ) -> Result<String, BridgeError> {
        let session = self.registry.range.require(id)?;
        session.poll(self.handle(), self.poll_timeout.resolve(timeout_ms))
    }

    /// Stop a range session. It stays registered and may be restarted.
    pub fn block_range_sync_stop(&self, id: SessionId) -> Result<(), BridgeError> {
        self.registry.range.require(id)?.stop();
        Ok(())
    }

    /// Unregister a range session, stopping it first if needed.
    pub fn block_range_sync_destroy(&self, id: SessionId) -> Result<(), BridgeError> {
        let session = self
            .registry
            .range
            .remove(id)
            .ok_or(BridgeError::SessionNotFound(i64::from(id.value())))?;
        session.stop();
        info!(session = %id, "block range sync session destroyed");
        Ok(())
    }

    /// Current status of a range session.
    pub fn block_range_sync_status(&self, id: SessionId) -> Result<SessionStatus, BridgeError> {
        Ok(self.registry.range.require(id)?.status())
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        let continuous = self.registry.continuous.drain();
        let range = self.registry.range.drain();
        if !continuous.is_empty() || !range.is_empty() {
            info!(
                continuous = continuous.len(),
                range = range.len(),
                "shutting down sessions"
            );
        }
        continuous.iter().for_each(|s| s.shutdown());
        range.iter().for_each(|s| s.shutdown());
    }
}
