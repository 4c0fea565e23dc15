//! Core type definitions for Fabric identity provenance

use std::fmt;

/// Block info, shared across multiple messages
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockInfo {
    /// Block number
    pub number: u64,

    /// Hash of the previous block header
    pub previous_hash: Vec<u8>,

    /// Hash of the block data
    pub data_hash: Vec<u8>,
}

/// Which part of the network an identity signed for
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Ordering service node, seen in block signature metadata
    Orderer,

    /// Endorsing peer, seen in transaction endorsements
    Peer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Orderer => write!(f, "orderer"),
            Role::Peer => write!(f, "peer"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "orderer" => Ok(Role::Orderer),
            "peer" => Ok(Role::Peer),
            _ => Err(format!("Unknown role '{s}'")),
        }
    }
}

/// Identity attributed to a signature
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Identity {
    pub role: Role,

    /// Certificate subject common name
    pub common_name: String,

    /// Certificate serial number, upper-case hex
    pub serial_number: String,

    /// DER encoded certificate
    pub certificate: Vec<u8>,
}

impl Identity {
    pub fn new(
        role: Role,
        common_name: impl Into<String>,
        serial_number: impl Into<String>,
        certificate: Vec<u8>,
    ) -> Self {
        Self {
            role,
            common_name: common_name.into(),
            serial_number: serial_number.into(),
            certificate,
        }
    }
}

/// One attribution of a signature to an identity.
/// Orderer observations carry the block number they signed, endorser
/// observations carry none.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IdentityObservation {
    pub identity: Identity,
    pub block_number: Option<u64>,
}
