//! Session lifecycle state machine.
//!
//! [`Phase::on`] is a pure transition function. [`Lifecycle`] stores the
//! current phase in an atomic and applies transitions with compare-and-swap,
//! so a transition is either fully observed by every thread or not at all.
//!
//! ```text
//!   Created ──BeginStart──▶ Starting ──HandshakeDone──▶ Started
//!      ▲                       │                           │
//!      └────HandshakeFailed────┘                           │
//!   Stopped ◀───────────────────────Stop───────────────────┘
//!      └──BeginStart──▶ Starting
//! ```
//!
//! Stop is accepted from every phase. Engine disconnects are only
//! user-visible once the session has left the handshake window.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use thiserror::Error;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    /// Registered, never started (or last start failed).
    Created = 0,
    /// A start call is blocked in the engine handshake.
    Starting = 1,
    /// The handshake completed and the engine is delivering events.
    Started = 2,
    /// Stopped by the caller; may be started again.
    Stopped = 3,
}

/// Inputs to the lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A caller wants to start the session.
    BeginStart,
    /// The blocking engine handshake returned successfully.
    HandshakeDone,
    /// The blocking engine handshake returned an error.
    HandshakeFailed,
    /// A caller stopped (or destroyed) the session.
    Stop,
}

/// Rejected lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// Start requested while a start is in progress or already done.
    #[error("session already started")]
    AlreadyStarted,

    /// The session was stopped while its handshake was still running.
    #[error("session stopped while starting")]
    StoppedWhileStarting,

    /// Transition makes no sense from the current phase.
    #[error("invalid transition {transition:?} from {from}")]
    InvalidTransition {
        /// Phase the session was in.
        from: Phase,
        /// Transition that was attempted.
        transition: Transition,
    },
}

impl Phase {
    /// Compute the next phase. Pure function, no side effects.
    pub fn on(self, transition: Transition) -> Result<Phase, LifecycleError> {
        match (self, transition) {
            (Phase::Created | Phase::Stopped, Transition::BeginStart) => Ok(Phase::Starting),
            (Phase::Starting | Phase::Started, Transition::BeginStart) => {
                Err(LifecycleError::AlreadyStarted)
            }

            (Phase::Starting, Transition::HandshakeDone) => Ok(Phase::Started),
            (Phase::Stopped, Transition::HandshakeDone) => {
                Err(LifecycleError::StoppedWhileStarting)
            }

            (Phase::Starting, Transition::HandshakeFailed) => Ok(Phase::Created),
            // A stop raced the failing handshake; stay stopped.
            (Phase::Stopped, Transition::HandshakeFailed) => Ok(Phase::Stopped),

            (_, Transition::Stop) => Ok(Phase::Stopped),

            (from, transition) => Err(LifecycleError::InvalidTransition { from, transition }),
        }
    }

    /// Whether the externally observable `started` flag is set.
    pub fn is_started(self) -> bool {
        self == Phase::Started
    }

    /// Whether an engine-raised disconnect should reach the poller.
    ///
    /// Disconnects raised during handshake churn (Starting) or by a
    /// connection whose start failed (Created) are dropped.
    pub fn delivers_disconnect(self) -> bool {
        matches!(self, Phase::Started | Phase::Stopped)
    }

    fn from_u8(raw: u8) -> Phase {
        match raw {
            0 => Phase::Created,
            1 => Phase::Starting,
            2 => Phase::Started,
            _ => Phase::Stopped,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Created => "created",
            Phase::Starting => "starting",
            Phase::Started => "started",
            Phase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Thread-safe holder of a session's [`Phase`].
#[derive(Debug)]
pub struct Lifecycle {
    phase: AtomicU8,
}

impl Lifecycle {
    /// Create a lifecycle in the Created phase.
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(Phase::Created as u8),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// Apply a transition atomically.
    ///
    /// Returns `(previous, next)` on success. On failure the phase is unchanged.
    pub fn apply(&self, transition: Transition) -> Result<(Phase, Phase), LifecycleError> {
        let mut current = self.phase();
        loop {
            let next = current.on(transition)?;
            match self.phase.compare_exchange(
                current as u8,
                next as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok((current, next)),
                Err(actual) => current = Phase::from_u8(actual),
            }
        }
    }

    /// Whether the session is Started.
    pub fn is_started(&self) -> bool {
        self.phase().is_started()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
