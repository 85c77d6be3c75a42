//! Range sync sessions.
//!
//! A range session performs the handshake once and then serves any number
//! of bounded fetches. Every fetch appends to the same queue:
//!
//! ```text
//! batch_started, block, block, ..., batch_done     (blocks found)
//! no_block_found{from, to}                         (nothing in range)
//! ```

use crate::error::BridgeError;
use crate::session::{SessionCore, SessionStatus};
use chainsync_engine::{SyncEngine, SyncMode};
use chainsync_types::{ChainPoint, ConnectionParams, SessionId, SessionKind};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::debug;

/// An on-demand block range session.
pub struct RangeSession {
    core: SessionCore,
}

impl RangeSession {
    /// Create a session in the Created phase. Nothing is contacted yet.
    pub fn new(id: SessionId, params: ConnectionParams) -> Self {
        Self {
            core: SessionCore::new(id, SessionKind::Range, params),
        }
    }

    /// Shared session state.
    pub fn core(&self) -> &SessionCore {
        &self.core
    }

    /// Connect and handshake. Blocks until the handshake completes.
    pub fn start(&self, runtime: &Handle, engine: &dyn SyncEngine) -> Result<(), BridgeError> {
        self.core.start(runtime, engine, None, SyncMode::OnDemand)
    }

    /// Request the blocks in `[from, to]`. Returns once the request is issued.
    ///
    /// Fails with NotStarted, without touching the engine, unless the session
    /// is Started.
    pub fn fetch(
        &self,
        runtime: &Handle,
        from: ChainPoint,
        to: ChainPoint,
    ) -> Result<(), BridgeError> {
        self.core.ensure_started()?;
        let connection = self
            .core
            .connection()
            .ok_or(BridgeError::SessionNotStarted(self.core.id()))?;

        debug!(session = %self.core.id(), %from, %to, "fetching range");
        runtime.block_on(connection.fetch_range(from, to))?;
        Ok(())
    }

    /// See [`SessionCore::poll`].
    pub fn poll(&self, runtime: &Handle, timeout: Duration) -> Result<String, BridgeError> {
        self.core.poll(runtime, timeout)
    }

    /// See [`SessionCore::stop`].
    pub fn stop(&self) {
        self.core.stop()
    }

    /// See [`SessionCore::shutdown`].
    pub fn shutdown(&self) {
        self.core.shutdown()
    }

    /// See [`SessionCore::status`].
    pub fn status(&self) -> SessionStatus {
        self.core.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainsync_engine::MockEngine;
    use chainsync_types::SyncEvent;
    use tokio::runtime::Runtime;

    fn anchor() -> ChainPoint {
        ChainPoint::new(1000, "a1".repeat(32))
    }

    fn setup(chain_len: usize) -> (Runtime, MockEngine, RangeSession) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let engine = MockEngine::new();
        engine.set_chain(MockEngine::chain_from(&anchor(), chain_len));
        let params = ConnectionParams::new(Some("relay.local".to_string()), 3001, 1).unwrap();
        (rt, engine, RangeSession::new(SessionId::new(2).unwrap(), params))
    }

    fn next(session: &RangeSession, rt: &Runtime) -> SyncEvent {
        let json = session.poll(rt.handle(), Duration::from_millis(500)).unwrap();
        SyncEvent::from_json(&json).unwrap()
    }

    #[test]
    fn fetch_before_start_is_not_started() {
        let (rt, engine, session) = setup(3);
        let err = session.fetch(rt.handle(), anchor(), anchor()).unwrap_err();
        assert!(matches!(err, BridgeError::SessionNotStarted(_)));
        assert_eq!(engine.connect_count(), 0);
    }

    #[test]
    fn fetch_delivers_bracketed_batch() {
        let (rt, engine, session) = setup(5);
        let chain = MockEngine::chain_from(&anchor(), 5);
        session.start(rt.handle(), &engine).unwrap();

        session
            .fetch(rt.handle(), chain[2].point(), chain[4].point())
            .unwrap();

        assert_eq!(next(&session, &rt), SyncEvent::BatchStarted);
        for expected in &chain[2..=4] {
            match next(&session, &rt) {
                SyncEvent::Block(block) => assert_eq!(block.point(), expected.point()),
                other => panic!("expected block, got {:?}", other),
            }
        }
        assert_eq!(next(&session, &rt), SyncEvent::BatchDone);
        assert_eq!(next(&session, &rt), SyncEvent::Timeout);
    }

    #[test]
    fn empty_range_reports_no_block_found() {
        let (rt, engine, session) = setup(3);
        session.start(rt.handle(), &engine).unwrap();

        let point = ChainPoint::new(100, "hashA");
        session.fetch(rt.handle(), point.clone(), point.clone()).unwrap();

        let json = session.poll(rt.handle(), Duration::from_millis(500)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "no_block_found",
                "from": {"slot": 100, "hash": "hashA"},
                "to": {"slot": 100, "hash": "hashA"},
            })
        );
    }

    #[test]
    fn repeated_fetches_share_one_queue() {
        let (rt, engine, session) = setup(3);
        let chain = MockEngine::chain_from(&anchor(), 3);
        session.start(rt.handle(), &engine).unwrap();

        session
            .fetch(rt.handle(), chain[1].point(), chain[1].point())
            .unwrap();
        session
            .fetch(rt.handle(), chain[3].point(), chain[3].point())
            .unwrap();

        let kinds: Vec<&str> = (0..6).map(|_| next(&session, &rt).kind()).collect();
        assert_eq!(
            kinds,
            vec!["batch_started", "block", "batch_done", "batch_started", "block", "batch_done"]
        );
        assert_eq!(engine.sessions()[0].fetch_count(), 2);
    }

    #[test]
    fn fetch_after_stop_is_not_started() {
        let (rt, engine, session) = setup(1);
        session.start(rt.handle(), &engine).unwrap();
        session.stop();

        let err = session.fetch(rt.handle(), anchor(), anchor()).unwrap_err();
        assert!(matches!(err, BridgeError::SessionNotStarted(_)));
        assert_eq!(engine.sessions()[0].fetch_count(), 0);
    }

    #[test]
    fn range_start_is_on_demand() {
        let (rt, engine, session) = setup(3);
        session.start(rt.handle(), &engine).unwrap();
        assert!(session.status().started);
        assert!(engine.sessions()[0].anchor().is_none());
        assert_eq!(next(&session, &rt), SyncEvent::Timeout);
    }
}
