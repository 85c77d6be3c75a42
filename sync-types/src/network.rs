//! Network constants and lookup results.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ChainPoint;

/// Public networks with a known protocol magic and sync anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    /// Production network.
    Mainnet,
    /// Pre-production test network.
    Preprod,
    /// Preview test network.
    Preview,
}

impl Network {
    /// All known networks.
    pub const ALL: [Network; 3] = [Network::Mainnet, Network::Preprod, Network::Preview];

    /// Protocol magic sent during the handshake.
    pub fn protocol_magic(&self) -> u64 {
        match self {
            Network::Mainnet => 764824073,
            Network::Preprod => 1,
            Network::Preview => 2,
        }
    }

    /// Trusted point to start syncing from without negotiating from genesis.
    pub fn well_known_point(&self) -> ChainPoint {
        match self {
            Network::Mainnet => ChainPoint::new(
                16588737,
                "4e9bbbb67e3ae262133d94c3da5bffce7b1127fc436e7433b87668dba34c354a",
            ),
            Network::Preprod => ChainPoint::new(
                87480,
                "528c3e6a00c82dd5331b116103b6e427acf447891ce3ade6c4c7a61d2f0a2b1c",
            ),
            Network::Preview => ChainPoint::new(
                8000,
                "70da683c00985e23903da00656fae96644e1f31dce914aab4ed50e35e4c4842d",
            ),
        }
    }

    /// Look up a network by its protocol magic.
    pub fn from_magic(magic: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.protocol_magic() == magic)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Mainnet => "mainnet",
            Network::Preprod => "preprod",
            Network::Preview => "preview",
        };
        f.write_str(name)
    }
}

/// The current tip of a node's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tip {
    /// Slot of the tip block.
    pub slot: u64,
    /// Hex-encoded hash of the tip block.
    pub hash: String,
    /// Height of the tip block.
    pub block: u64,
}

impl Tip {
    /// The tip as a chain point.
    pub fn point(&self) -> ChainPoint {
        ChainPoint::new(self.slot, self.hash.clone())
    }
}

/// A peer advertised by a node through peer sharing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAddress {
    /// Address family, "IPv4" or "IPv6".
    #[serde(rename = "type")]
    pub kind: String,
    /// IP address in textual form.
    pub address: String,
    /// TCP port.
    pub port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_lookup_roundtrip() {
        for network in Network::ALL {
            assert_eq!(Network::from_magic(network.protocol_magic()), Some(network));
        }
        assert_eq!(Network::from_magic(42), None);
    }

    #[test]
    fn well_known_hashes_are_32_byte_hex() {
        for network in Network::ALL {
            let point = network.well_known_point();
            assert_eq!(point.hash_bytes().unwrap().len(), 32, "{}", network);
        }
    }

    #[test]
    fn tip_serializes_with_block_height() {
        let tip = Tip {
            slot: 1000,
            hash: "ab".to_string(),
            block: 900,
        };
        assert_eq!(
            serde_json::to_string(&tip).unwrap(),
            r#"{"slot":1000,"hash":"ab","block":900}"#
        );
        assert_eq!(tip.point(), ChainPoint::new(1000, "ab"));
    }

    #[test]
    fn peer_address_uses_type_key() {
        let peer = PeerAddress {
            kind: "IPv4".to_string(),
            address: "10.0.0.1".to_string(),
            port: 3001,
        };
        assert_eq!(
            serde_json::to_string(&peer).unwrap(),
            r#"{"type":"IPv4","address":"10.0.0.1","port":3001}"#
        );
    }
}
