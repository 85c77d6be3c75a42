//! Session identity types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a sync session.
///
/// Issued by the session registry from a process-wide monotonic counter.
/// Always positive, never reused after the session is destroyed.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u32);

impl SessionId {
    /// Create a SessionId from a counter value.
    ///
    /// Returns `None` for zero, which is never issued.
    pub fn new(value: u32) -> Option<Self> {
        if value == 0 {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Interpret a raw id received over the C ABI.
    ///
    /// Non-positive values can never name a live session.
    pub fn from_raw(raw: i32) -> Option<Self> {
        u32::try_from(raw).ok().and_then(Self::new)
    }

    /// Get the numeric value of this SessionId.
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

/// The two kinds of session the registry keeps apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    /// Continuous chain-sync from a point or from the tip.
    Continuous,
    /// On-demand fetches of bounded block ranges.
    Range,
}

impl SessionKind {
    /// Short name used in log lines and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Continuous => "block_sync",
            SessionKind::Range => "block_range_sync",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
