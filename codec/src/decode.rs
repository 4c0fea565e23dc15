//! Layer-by-layer decoding of Fabric blocks.
//! Each step fails with a [`DecodeError`] naming the layer it stopped at.

use crate::proto::*;
use prost::Message;
use provenance_common::BlockInfo;
use std::fmt;
use thiserror::Error;

/// The layer of the block encoding a decode step works on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Block,
    Metadata,
    SignatureHeader,
    Envelope,
    Payload,
    ChannelHeader,
    Transaction,
    ActionPayload,
    ChaincodeEvent,
    ChaincodeActionPayload,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Layer::Block => "block",
            Layer::Metadata => "metadata",
            Layer::SignatureHeader => "signature header",
            Layer::Envelope => "envelope",
            Layer::Payload => "payload",
            Layer::ChannelHeader => "channel header",
            Layer::Transaction => "peer transaction",
            Layer::ActionPayload => "action payload",
            Layer::ChaincodeEvent => "chaincode event",
            Layer::ChaincodeActionPayload => "chaincode action payload",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Can't decode block: {0}")]
    Block(prost::DecodeError),

    #[error("No metadata in block")]
    NoMetadata,

    #[error("No metadata at index {0:?}")]
    NoMetadataAtIndex(BlockMetadataIndex),

    #[error("Can't decode metadata: {0}")]
    Metadata(prost::DecodeError),

    #[error("Can't decode signature header: {0}")]
    SignatureHeader(prost::DecodeError),

    #[error("Can't decode envelope: {0}")]
    Envelope(prost::DecodeError),

    #[error("Can't decode payload: {0}")]
    Payload(prost::DecodeError),

    #[error("Payload has no header")]
    MissingPayloadHeader,

    #[error("Can't decode channel header: {0}")]
    ChannelHeader(prost::DecodeError),

    #[error("Can't decode peer transaction: {0}")]
    Transaction(prost::DecodeError),

    #[error("Can't decode chaincode action payload: {0}")]
    ChaincodeActionPayload(prost::DecodeError),

    #[error("No endorsed action in chaincode action payload")]
    MissingEndorsedAction,

    #[error("Can't decode proposal response payload: {0}")]
    ProposalResponsePayload(prost::DecodeError),

    #[error("Proposal response payload is missing extension")]
    MissingExtension,

    #[error("Can't decode chaincode action: {0}")]
    ChaincodeAction(prost::DecodeError),

    #[error("Can't decode chaincode event: {0}")]
    ChaincodeEvent(prost::DecodeError),

    #[error("Can't decode chaincode action payload for endorsements: {0}")]
    EndorsementPayload(prost::DecodeError),

    #[error("No endorsed action to take endorsements from")]
    MissingEndorsements,
}

/// Decode a block from its wire form
pub fn decode_block(raw: &[u8]) -> Result<Block, DecodeError> {
    Block::decode(raw).map_err(DecodeError::Block)
}

/// Summary of the block header for bus messages
pub fn block_info(block: &Block) -> BlockInfo {
    match &block.header {
        Some(header) => BlockInfo {
            number: header.number,
            previous_hash: header.previous_hash.clone(),
            data_hash: header.data_hash.clone(),
        },
        None => BlockInfo::default(),
    }
}

/// Decode the metadata entry stored at `index`
pub fn block_metadata(block: &Block, index: BlockMetadataIndex) -> Result<Metadata, DecodeError> {
    let metadata = block.metadata.as_ref().ok_or(DecodeError::NoMetadata)?;
    let raw = metadata
        .metadata
        .get(index as usize)
        .ok_or(DecodeError::NoMetadataAtIndex(index))?;
    Metadata::decode(raw.as_slice()).map_err(DecodeError::Metadata)
}

pub fn signature_header(signature: &MetadataSignature) -> Result<SignatureHeader, DecodeError> {
    SignatureHeader::decode(signature.signature_header.as_slice())
        .map_err(DecodeError::SignatureHeader)
}

pub fn envelope(raw: &[u8]) -> Result<Envelope, DecodeError> {
    Envelope::decode(raw).map_err(DecodeError::Envelope)
}

pub fn payload(envelope: &Envelope) -> Result<Payload, DecodeError> {
    Payload::decode(envelope.payload.as_slice()).map_err(DecodeError::Payload)
}

pub fn channel_header(payload: &Payload) -> Result<ChannelHeader, DecodeError> {
    let header = payload.header.as_ref().ok_or(DecodeError::MissingPayloadHeader)?;
    ChannelHeader::decode(header.channel_header.as_slice()).map_err(DecodeError::ChannelHeader)
}

/// Decode the peer transaction carried as payload data
pub fn transaction(payload: &Payload) -> Result<Transaction, DecodeError> {
    Transaction::decode(payload.data.as_slice()).map_err(DecodeError::Transaction)
}

/// Unwrap an action down to the chaincode action its endorsers agreed on:
/// chaincode action payload, then proposal response payload, then its extension
pub fn chaincode_action(action: &TransactionAction) -> Result<ChaincodeAction, DecodeError> {
    let payload = ChaincodeActionPayload::decode(action.payload.as_slice())
        .map_err(DecodeError::ChaincodeActionPayload)?;
    let endorsed = payload.action.ok_or(DecodeError::MissingEndorsedAction)?;
    if endorsed.proposal_response_payload.is_empty() {
        return Err(DecodeError::MissingEndorsedAction);
    }

    let response = ProposalResponsePayload::decode(endorsed.proposal_response_payload.as_slice())
        .map_err(DecodeError::ProposalResponsePayload)?;
    if response.extension.is_empty() {
        return Err(DecodeError::MissingExtension);
    }

    ChaincodeAction::decode(response.extension.as_slice()).map_err(DecodeError::ChaincodeAction)
}

pub fn chaincode_event(action: &ChaincodeAction) -> Result<ChaincodeEvent, DecodeError> {
    ChaincodeEvent::decode(action.events.as_slice()).map_err(DecodeError::ChaincodeEvent)
}

/// Decode the raw chaincode action payload of an action and return its
/// endorsements, in order
pub fn endorsements(action: &TransactionAction) -> Result<Vec<Endorsement>, DecodeError> {
    let payload = ChaincodeActionPayload::decode(action.payload.as_slice())
        .map_err(DecodeError::EndorsementPayload)?;
    payload
        .action
        .map(|endorsed| endorsed.endorsements)
        .ok_or(DecodeError::MissingEndorsements)
}

impl DecodeError {
    /// Layer at which decoding stopped
    pub fn layer(&self) -> Layer {
        match self {
            DecodeError::Block(_) => Layer::Block,
            DecodeError::NoMetadata
            | DecodeError::NoMetadataAtIndex(_)
            | DecodeError::Metadata(_) => Layer::Metadata,
            DecodeError::SignatureHeader(_) => Layer::SignatureHeader,
            DecodeError::Envelope(_) => Layer::Envelope,
            DecodeError::Payload(_) => Layer::Payload,
            DecodeError::MissingPayloadHeader | DecodeError::ChannelHeader(_) => {
                Layer::ChannelHeader
            }
            DecodeError::Transaction(_) => Layer::Transaction,
            DecodeError::ChaincodeActionPayload(_)
            | DecodeError::MissingEndorsedAction
            | DecodeError::ProposalResponsePayload(_)
            | DecodeError::MissingExtension
            | DecodeError::ChaincodeAction(_) => Layer::ActionPayload,
            DecodeError::ChaincodeEvent(_) => Layer::ChaincodeEvent,
            DecodeError::EndorsementPayload(_) | DecodeError::MissingEndorsements => {
                Layer::ChaincodeActionPayload
            }
        }
    }
}
