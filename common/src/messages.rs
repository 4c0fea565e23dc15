//! Definition of provenance bus messages

use crate::types::*;

// Caryatid core messages which we re-export
pub use caryatid_module_clock::messages::ClockTickMessage;
pub use caryatid_module_rest_server::messages::{GetRESTResponse, RESTRequest, RESTResponse};

/// Raw block message, in its protobuf wire form
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RawBlockMessage {
    /// Encoded `common.Block`
    pub raw: Vec<u8>,
}

/// Identities attributed from one block, in extraction order
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IdentityObservationsMessage {
    pub observations: Vec<IdentityObservation>,
}

/// Fabric messages which pertain to a block
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum FabricMessage {
    BlockAvailable(RawBlockMessage),                   // Block available from the source
    IdentityObservations(IdentityObservationsMessage), // Identities signing a block
}

// === Global message enum ===
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Message {
    None(()), // Just so we have a simple default

    // Caryatid standard messages
    Clock(ClockTickMessage),      // Clock tick
    RESTRequest(RESTRequest),     // REST request
    RESTResponse(RESTResponse),   // REST response

    // Fabric messages with common BlockInfo
    Fabric((BlockInfo, FabricMessage)),
}

impl Default for Message {
    fn default() -> Self {
        Self::None(())
    }
}

// Casts from specific Caryatid messages
impl From<ClockTickMessage> for Message {
    fn from(msg: ClockTickMessage) -> Self {
        Message::Clock(msg)
    }
}

impl From<RESTRequest> for Message {
    fn from(msg: RESTRequest) -> Self {
        Message::RESTRequest(msg)
    }
}

impl From<RESTResponse> for Message {
    fn from(msg: RESTResponse) -> Self {
        Message::RESTResponse(msg)
    }
}

// Casts from Fabric messages with their block
impl From<(BlockInfo, FabricMessage)> for Message {
    fn from(msg: (BlockInfo, FabricMessage)) -> Self {
        Message::Fabric(msg)
    }
}

// Extract a REST response for the REST server
impl GetRESTResponse for Message {
    fn get_rest_response(&self) -> Option<RESTResponse> {
        if let Message::RESTResponse(result) = self {
            Some(result.clone())
        } else {
            None
        }
    }
}
