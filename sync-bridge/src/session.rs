//! Continuous sync sessions.
//!
//! [`SessionCore`] holds what both session kinds share: lifecycle, event
//! queue and the connection slot. [`SyncSession`] adds the well-known point
//! and the two ways of starting a continuous sync.
//!
//! Every blocking operation takes the bridge runtime's [`Handle`] and blocks
//! the calling (foreign) thread on it.

use crate::error::BridgeError;
use crate::listener::EventQueue;
use chainsync_core::{Lifecycle, LifecycleError, Phase, Transition};
use chainsync_engine::{EngineSession, SyncEngine, SyncMode};
use chainsync_types::{ChainPoint, ConnectionParams, SessionId, SessionKind, SyncEvent};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// Snapshot returned by the status operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    /// Session id.
    pub id: SessionId,
    /// Whether the handshake completed and no stop followed.
    pub started: bool,
    /// Whether the engine connection is still live.
    pub running: bool,
}

type Connection = Arc<dyn EngineSession>;

/// The live connection plus the number of the start attempt that owns it.
///
/// Every start and every stop bumps `attempt` under the lock, so a start
/// whose number is no longer current has lost its session.
#[derive(Default)]
struct Slot {
    attempt: u64,
    connection: Option<Connection>,
}

/// State shared by continuous and range sessions.
pub struct SessionCore {
    id: SessionId,
    kind: SessionKind,
    params: ConnectionParams,
    lifecycle: Arc<Lifecycle>,
    queue: EventQueue,
    slot: Mutex<Slot>,
}

impl SessionCore {
    /// Create a session core in the Created phase.
    pub fn new(id: SessionId, kind: SessionKind, params: ConnectionParams) -> Self {
        Self {
            id,
            kind,
            params,
            lifecycle: Arc::new(Lifecycle::new()),
            queue: EventQueue::new(),
            slot: Mutex::new(Slot::default()),
        }
    }

    /// Session id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Where this session connects.
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    /// Whether the session is Started.
    pub fn is_started(&self) -> bool {
        self.lifecycle.is_started()
    }

    /// Fail with AlreadyStarted unless a start could be claimed right now.
    ///
    /// Checked before argument validation; the claim itself happens later
    /// with a compare-and-swap, so a racing start can still lose.
    pub fn ensure_startable(&self) -> Result<(), BridgeError> {
        match self.phase() {
            Phase::Starting | Phase::Started => Err(BridgeError::SessionAlreadyStarted(self.id)),
            Phase::Created | Phase::Stopped => Ok(()),
        }
    }

    /// Fail with NotStarted unless the session is Started.
    pub fn ensure_started(&self) -> Result<(), BridgeError> {
        if self.is_started() {
            Ok(())
        } else {
            Err(BridgeError::SessionNotStarted(self.id))
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Clone of the live connection, if any.
    pub fn connection(&self) -> Option<Connection> {
        self.slot().connection.clone()
    }

    /// Connect, run the blocking handshake and install the listener.
    ///
    /// Returns only once the engine handshake has completed. A failed start
    /// leaves the session in Created with no connection.
    pub fn start(
        &self,
        runtime: &Handle,
        engine: &dyn SyncEngine,
        well_known: Option<ChainPoint>,
        mode: SyncMode,
    ) -> Result<(), BridgeError> {
        let attempt = {
            let mut slot = self.slot();
            self.lifecycle
                .apply(Transition::BeginStart)
                .map_err(|e| BridgeError::lifecycle(self.id, e))?;
            slot.attempt += 1;
            slot.attempt
        };
        debug!(session = %self.id, kind = %self.kind, address = %self.params.address(), ?mode, attempt, "starting session");

        let connection = match runtime.block_on(engine.connect(&self.params, well_known)) {
            Ok(connection) => connection,
            Err(err) => {
                warn!(session = %self.id, error = %err, "connect failed");
                self.fail_start(attempt);
                return Err(err.into());
            }
        };

        // A stop (and possibly a newer start) may have raced the connect.
        {
            let mut slot = self.slot();
            if slot.attempt != attempt {
                drop(slot);
                connection.stop();
                return Err(self.superseded());
            }
            slot.connection = Some(Arc::clone(&connection));
        }

        let listener = Arc::new(self.queue.listener(
            self.id,
            self.kind,
            Arc::clone(&self.lifecycle),
        ));
        if let Err(err) = runtime.block_on(connection.start(mode, listener)) {
            warn!(session = %self.id, error = %err, "handshake failed");
            // When superseded, the stop that bumped the attempt already
            // stopped this connection.
            if let Some(connection) = self.fail_start(attempt) {
                connection.stop();
            }
            return Err(err.into());
        }

        let slot = self.slot();
        if slot.attempt != attempt {
            return Err(self.superseded());
        }
        match self.lifecycle.apply(Transition::HandshakeDone) {
            Ok(_) => {
                info!(session = %self.id, kind = %self.kind, "session started");
                Ok(())
            }
            Err(err) => Err(BridgeError::lifecycle(self.id, err)),
        }
    }

    /// Undo a start attempt that is still current; returns its connection.
    fn fail_start(&self, attempt: u64) -> Option<Connection> {
        let mut slot = self.slot();
        if slot.attempt != attempt {
            return None;
        }
        if let Err(err) = self.lifecycle.apply(Transition::HandshakeFailed) {
            debug!(session = %self.id, error = %err, "lifecycle after failed start");
        }
        slot.connection.take()
    }

    fn superseded(&self) -> BridgeError {
        info!(session = %self.id, "session stopped during handshake");
        BridgeError::lifecycle(self.id, LifecycleError::StoppedWhileStarting)
    }

    /// Wait up to `timeout` for one event and encode it.
    ///
    /// An empty queue yields the timeout event, not an error.
    pub fn poll(&self, runtime: &Handle, timeout: Duration) -> Result<String, BridgeError> {
        let event = runtime
            .block_on(self.queue.next(timeout))
            .unwrap_or(SyncEvent::Timeout);
        event.to_json().map_err(|err| {
            error!(session = %self.id, kind = event.kind(), error = %err, "event serialization failed");
            BridgeError::from(err)
        })
    }

    /// Stop the session. The engine connection, if any, is stopped exactly once.
    pub fn stop(&self) {
        let previous = self.phase();
        match self.detach() {
            Some(connection) => {
                connection.stop();
                info!(session = %self.id, kind = %self.kind, %previous, "session stopped");
            }
            None => debug!(session = %self.id, kind = %self.kind, "stop without connection"),
        }
    }

    /// Stop the session for good, shutting the engine connection down.
    pub fn shutdown(&self) {
        if let Some(connection) = self.detach() {
            connection.shutdown();
            info!(session = %self.id, kind = %self.kind, "session shut down");
        }
    }

    /// Move to Stopped, invalidate any start in flight and hand back the connection.
    fn detach(&self) -> Option<Connection> {
        let mut slot = self.slot();
        if let Err(err) = self.lifecycle.apply(Transition::Stop) {
            debug!(session = %self.id, error = %err, "stop transition rejected");
        }
        slot.attempt += 1;
        slot.connection.take()
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            id: self.id,
            started: self.is_started(),
            running: self.connection().is_some_and(|c| c.is_running()),
        }
    }

    /// Events waiting to be polled.
    pub fn queued(&self) -> usize {
        self.queue.depth()
    }
}

/// A continuous chain-sync session.
pub struct SyncSession {
    core: SessionCore,
    well_known: ChainPoint,
}

impl SyncSession {
    /// Create a session in the Created phase. Nothing is contacted yet.
    pub fn new(id: SessionId, params: ConnectionParams, well_known: ChainPoint) -> Self {
        Self {
            core: SessionCore::new(id, SessionKind::Continuous, params),
            well_known,
        }
    }

    /// Shared session state.
    pub fn core(&self) -> &SessionCore {
        &self.core
    }

    /// Trusted anchor the session was created with.
    pub fn well_known(&self) -> &ChainPoint {
        &self.well_known
    }

    /// Start syncing from `from`. Blocks until the handshake completes.
    pub fn start(
        &self,
        runtime: &Handle,
        engine: &dyn SyncEngine,
        from: ChainPoint,
    ) -> Result<(), BridgeError> {
        self.core.start(
            runtime,
            engine,
            Some(self.well_known.clone()),
            SyncMode::FromPoint(from),
        )
    }

    /// Start syncing from the node's tip. Blocks until the handshake completes.
    pub fn start_from_tip(&self, runtime: &Handle, engine: &dyn SyncEngine) -> Result<(), BridgeError> {
        self.core
            .start(runtime, engine, Some(self.well_known.clone()), SyncMode::FromTip)
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
    use serde_json::Value;
    use std::sync::Barrier;
    use std::thread;
    use tokio::runtime::Runtime;

    const WELL_KNOWN_HASH: &str =
        "7f3e2b1a0c9d8e7f6a5b4c3d2e1f0a9b8c7d6e5f4a3b2c1d0e9f8a7b6c5d4e3f";

    fn well_known() -> ChainPoint {
        ChainPoint::new(4492800, WELL_KNOWN_HASH)
    }

    fn runtime() -> Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap()
    }

    fn setup(chain_len: usize) -> (Runtime, MockEngine, SyncSession) {
        let engine = MockEngine::new();
        engine.set_chain(MockEngine::chain_from(&well_known(), chain_len));
        let params = ConnectionParams::new(Some("relay.local".to_string()), 3001, 2).unwrap();
        let session = SyncSession::new(SessionId::new(1).unwrap(), params, well_known());
        (runtime(), engine, session)
    }

    fn poll_json(session: &SyncSession, rt: &Runtime, ms: u64) -> Value {
        let json = session.poll(rt.handle(), Duration::from_millis(ms)).unwrap();
        serde_json::from_str(&json).unwrap()
    }

    // ===========================================
    // Start Tests
    // ===========================================

    #[test]
    fn start_from_well_known_streams_rollback_then_blocks() {
        let (rt, engine, session) = setup(5);
        session.start(rt.handle(), &engine, well_known()).unwrap();
        assert!(session.status().started);

        let first = poll_json(&session, &rt, 1000);
        assert_eq!(first["type"], "rollback");
        assert_eq!(first["slot"], 4492800);
        assert_eq!(first["hash"], WELL_KNOWN_HASH);

        let second = poll_json(&session, &rt, 1000);
        let third = poll_json(&session, &rt, 1000);
        assert_eq!(second["type"], "block");
        assert_eq!(third["type"], "block");
        assert!(second["slot"].as_u64().unwrap() > 4492800);
        assert!(third["slot"].as_u64().unwrap() > second["slot"].as_u64().unwrap());
        assert_eq!(engine.sessions()[0].anchor(), Some(&well_known()));
    }

    #[test]
    fn start_from_tip_rolls_back_to_tip() {
        let (rt, engine, session) = setup(3);
        let tip = MockEngine::chain_from(&well_known(), 3)[3].point();
        session.start_from_tip(rt.handle(), &engine).unwrap();

        let event = poll_json(&session, &rt, 1000);
        assert_eq!(event["type"], "rollback");
        assert_eq!(event["slot"], tip.slot);
    }

    #[test]
    fn start_twice_is_already_started() {
        let (rt, engine, session) = setup(0);
        session.start(rt.handle(), &engine, well_known()).unwrap();

        let err = session.start(rt.handle(), &engine, well_known()).unwrap_err();
        assert!(matches!(err, BridgeError::SessionAlreadyStarted(_)));
        assert!(session.core().ensure_startable().is_err());
        assert_eq!(engine.connect_count(), 1);
    }

    #[test]
    fn concurrent_starts_admit_one() {
        let (rt, engine, session) = setup(0);
        engine.set_handshake_delay(Duration::from_millis(50));
        let session = Arc::new(session);
        let rt = Arc::new(rt);
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let (session, rt, engine, barrier) = (
                    Arc::clone(&session),
                    Arc::clone(&rt),
                    engine.clone(),
                    Arc::clone(&barrier),
                );
                thread::spawn(move || {
                    barrier.wait();
                    session.start(rt.handle(), &engine, well_known())
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, BridgeError::SessionAlreadyStarted(_))));
        assert_eq!(engine.connect_count(), 1);
    }

    #[test]
    fn failed_handshake_returns_to_created() {
        let (rt, engine, session) = setup(0);
        engine.fail_next_start("version mismatch");

        let err = session.start(rt.handle(), &engine, well_known()).unwrap_err();
        assert_eq!(err.status_code(), crate::StatusCode::General);
        assert!(err.to_string().contains("version mismatch"));
        assert_eq!(session.core().phase(), Phase::Created);
        assert!(session.core().connection().is_none());
        assert_eq!(engine.sessions()[0].stop_count(), 1);

        // A later start succeeds
        session.start(rt.handle(), &engine, well_known()).unwrap();
        assert!(session.status().started);
    }

    #[test]
    fn failed_connect_returns_to_created() {
        let (rt, engine, session) = setup(0);
        engine.fail_next_connect("refused");

        let err = session.start(rt.handle(), &engine, well_known()).unwrap_err();
        assert!(matches!(err, BridgeError::General(_)));
        assert_eq!(session.core().phase(), Phase::Created);
    }

    #[test]
    fn unknown_start_point_is_general_failure() {
        let (rt, engine, session) = setup(2);
        let err = session
            .start(rt.handle(), &engine, ChainPoint::new(5, "00".repeat(32)))
            .unwrap_err();
        assert!(err.to_string().contains("intersection not found"));
        assert!(!session.status().started);
    }

    // ===========================================
    // Disconnect Gate Tests
    // ===========================================

    #[test]
    fn handshake_churn_is_never_observable() {
        let (rt, engine, session) = setup(0);
        engine.set_handshake_disconnects(3);
        session.start(rt.handle(), &engine, well_known()).unwrap();

        let first = poll_json(&session, &rt, 200);
        assert_eq!(first["type"], "rollback");
        assert_eq!(poll_json(&session, &rt, 50)["type"], "timeout");
    }

    #[test]
    fn disconnect_after_start_is_observable() {
        let (rt, engine, session) = setup(0);
        engine.set_handshake_disconnects(2);
        session.start(rt.handle(), &engine, well_known()).unwrap();
        assert_eq!(poll_json(&session, &rt, 200)["type"], "rollback");

        engine.disconnect_all();
        assert_eq!(poll_json(&session, &rt, 200)["type"], "disconnect");
        assert!(!session.status().running);
    }

    // ===========================================
    // Poll Tests
    // ===========================================

    #[test]
    fn poll_on_idle_session_times_out() {
        let (rt, _engine, session) = setup(0);
        let started = std::time::Instant::now();
        let event = poll_json(&session, &rt, 50);
        assert_eq!(event, serde_json::json!({"type": "timeout"}));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(1000));
    }

    #[test]
    fn blocks_arrive_in_slot_order() {
        let (rt, engine, session) = setup(10);
        session.start(rt.handle(), &engine, well_known()).unwrap();

        assert_eq!(poll_json(&session, &rt, 1000)["type"], "rollback");
        let mut last = 4492800;
        for _ in 0..10 {
            let event = poll_json(&session, &rt, 1000);
            assert_eq!(event["type"], "block");
            let slot = event["slot"].as_u64().unwrap();
            assert!(slot > last);
            last = slot;
        }
    }

    // ===========================================
    // Stop and Status Tests
    // ===========================================

    #[test]
    fn stop_stops_engine_once() {
        let (rt, engine, session) = setup(0);
        session.start(rt.handle(), &engine, well_known()).unwrap();

        session.stop();
        session.stop();

        assert_eq!(engine.sessions()[0].stop_count(), 1);
        let status = session.status();
        assert!(!status.started);
        assert!(!status.running);
    }

    #[test]
    fn stop_before_start_only_sets_flag() {
        let (_rt, engine, session) = setup(0);
        session.stop();
        assert_eq!(session.core().phase(), Phase::Stopped);
        assert_eq!(engine.connect_count(), 0);
    }

    #[test]
    fn restart_after_stop() {
        let (rt, engine, session) = setup(0);
        session.start(rt.handle(), &engine, well_known()).unwrap();
        session.stop();
        session.start(rt.handle(), &engine, well_known()).unwrap();

        assert!(session.status().started);
        assert_eq!(engine.connect_count(), 2);
    }

    #[test]
    fn stop_during_handshake_fails_start() {
        let (rt, engine, session) = setup(0);
        engine.set_handshake_delay(Duration::from_millis(200));
        let session = Arc::new(session);
        let rt = Arc::new(rt);

        let starter = {
            let (session, rt, engine) = (Arc::clone(&session), Arc::clone(&rt), engine.clone());
            thread::spawn(move || session.start(rt.handle(), &engine, well_known()))
        };
        thread::sleep(Duration::from_millis(50));
        session.stop();

        let err = starter.join().unwrap().unwrap_err();
        assert!(err.to_string().contains("stopped while starting"));
        assert_eq!(session.core().phase(), Phase::Stopped);
        assert_eq!(engine.sessions()[0].stop_count(), 1);
    }

    #[test]
    fn restart_during_stale_handshake_keeps_newer_connection() {
        let (rt, engine, session) = setup(0);
        engine.set_handshake_delay(Duration::from_millis(200));
        let session = Arc::new(session);
        let rt = Arc::new(rt);
        let spawn_start = || {
            let (session, rt, engine) = (Arc::clone(&session), Arc::clone(&rt), engine.clone());
            thread::spawn(move || session.start(rt.handle(), &engine, well_known()))
        };

        let first = spawn_start();
        thread::sleep(Duration::from_millis(50));
        session.stop();
        thread::sleep(Duration::from_millis(20));
        let second = spawn_start();

        let first = first.join().unwrap();
        let second = second.join().unwrap();
        let err = first.unwrap_err();
        assert_eq!(err.status_code(), crate::StatusCode::General);
        assert!(err.to_string().contains("stopped while starting"));
        second.unwrap();

        let status = session.status();
        assert!(status.started);
        assert!(status.running);

        let sessions = engine.sessions();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].stop_count(), 1);
        assert!(!sessions[0].is_running());
        assert_eq!(sessions[1].stop_count(), 0);
        assert!(sessions[1].is_running());

        session.stop();
        assert_eq!(sessions[1].stop_count(), 1);
    }

    #[test]
    fn shutdown_releases_connection_once() {
        let (rt, engine, session) = setup(0);
        session.start(rt.handle(), &engine, well_known()).unwrap();

        session.shutdown();
        session.stop();

        let conn = &engine.sessions()[0];
        assert_eq!(conn.shutdown_count(), 1);
        assert_eq!(conn.stop_count(), 0);
        assert_eq!(session.core().phase(), Phase::Stopped);
        assert!(!session.status().running);
    }

    #[test]
    fn status_serializes_with_id() {
        let (rt, engine, session) = setup(0);
        session.start(rt.handle(), &engine, well_known()).unwrap();

        let json = serde_json::to_value(session.status()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": 1, "started": true, "running": true})
        );
    }
}
