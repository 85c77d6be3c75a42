//! Chain coordinates and connection parameters.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::SyncError;

/// A position on the chain: a slot plus the hex-encoded hash of the block
/// at that slot.
///
/// Equality is structural. The bridge never interprets the hash beyond
/// checking that it is present; the engine decides whether it names a
/// real block.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainPoint {
    /// Absolute slot number.
    pub slot: u64,
    /// Hex-encoded block hash.
    pub hash: String,
}

impl ChainPoint {
    /// Create a new ChainPoint.
    pub fn new(slot: u64, hash: impl Into<String>) -> Self {
        Self {
            slot,
            hash: hash.into(),
        }
    }

    /// Create a ChainPoint from raw hash bytes.
    pub fn from_hash_bytes(slot: u64, hash: &[u8]) -> Self {
        Self::new(slot, hex::encode(hash))
    }

    /// Build a point from caller-supplied parts, rejecting a missing hash.
    ///
    /// `what` names the argument in the error message ("From hash", ...).
    pub fn required(slot: u64, hash: Option<String>, what: &str) -> Result<Self, SyncError> {
        match hash {
            Some(hash) if !hash.is_empty() => Ok(Self::new(slot, hash)),
            _ => Err(SyncError::InvalidArgument(format!("{} is required", what))),
        }
    }

    /// Decode the hash into raw bytes.
    pub fn hash_bytes(&self) -> Result<Vec<u8>, SyncError> {
        hex::decode(&self.hash).map_err(|source| SyncError::InvalidHash {
            hash: self.hash.clone(),
            source,
        })
    }
}

impl fmt::Display for ChainPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.hash.get(..16).unwrap_or(&self.hash);
        write!(f, "{}@{}", self.slot, short)
    }
}

impl fmt::Debug for ChainPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainPoint({})", self)
    }
}

/// Where a session connects: a node address plus the network's protocol magic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Node hostname or IP address.
    pub host: String,
    /// Node TCP port.
    pub port: u16,
    /// Network discriminator sent during the handshake.
    pub protocol_magic: u64,
}

impl ConnectionParams {
    /// Validate caller-supplied connection arguments.
    ///
    /// The host must be present and non-empty and the port must fit a TCP port.
    pub fn new(host: Option<String>, port: i32, protocol_magic: u64) -> Result<Self, SyncError> {
        let host = match host {
            Some(host) if !host.is_empty() => host,
            _ => return Err(SyncError::InvalidArgument("Host is required".to_string())),
        };
        let port = u16::try_from(port)
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| SyncError::InvalidArgument(format!("Invalid port: {}", port)))?;
        Ok(Self {
            host,
            port,
            protocol_magic,
        })
    }

    /// `host:port` form used in log lines.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "4e9bbbb67e3ae262133d94c3da5bffce7b1127fc436e7433b87668dba34c354a";

    #[test]
    fn points_compare_structurally() {
        assert_eq!(ChainPoint::new(10, HASH), ChainPoint::new(10, HASH));
        assert_ne!(ChainPoint::new(10, HASH), ChainPoint::new(11, HASH));
    }

    #[test]
    fn required_rejects_missing_and_empty_hash() {
        let err = ChainPoint::required(1, None, "From hash").unwrap_err();
        assert_eq!(err.to_string(), "invalid argument: From hash is required");
        assert!(ChainPoint::required(1, Some(String::new()), "To hash").is_err());
        assert_eq!(
            ChainPoint::required(1, Some(HASH.to_string()), "From hash").unwrap(),
            ChainPoint::new(1, HASH)
        );
    }

    #[test]
    fn hash_bytes_roundtrip() {
        let point = ChainPoint::from_hash_bytes(5, &[0xAB; 32]);
        assert_eq!(point.hash.len(), 64);
        assert_eq!(point.hash_bytes().unwrap(), vec![0xAB; 32]);
    }

    #[test]
    fn hash_bytes_rejects_non_hex() {
        let err = ChainPoint::new(100, "hashA").hash_bytes().unwrap_err();
        assert!(matches!(err, SyncError::InvalidHash { .. }));
    }

    #[test]
    fn display_truncates_hash() {
        assert_eq!(ChainPoint::new(7, HASH).to_string(), "7@4e9bbbb67e3ae262");
        assert_eq!(ChainPoint::new(7, "abc").to_string(), "7@abc");
    }

    #[test]
    fn connection_params_validation() {
        let params = ConnectionParams::new(Some("relay.local".to_string()), 3001, 2).unwrap();
        assert_eq!(params.address(), "relay.local:3001");

        let err = ConnectionParams::new(None, 3001, 2).unwrap_err();
        assert_eq!(err.to_string(), "invalid argument: Host is required");
        assert!(ConnectionParams::new(Some(String::new()), 3001, 2).is_err());
        assert!(ConnectionParams::new(Some("h".to_string()), 0, 2).is_err());
        assert!(ConnectionParams::new(Some("h".to_string()), 70000, 2).is_err());
        assert!(ConnectionParams::new(Some("h".to_string()), -1, 2).is_err());
    }
}
