//! Builders for Fabric blocks and fixture identities used across module tests

use prost::Message;
use provenance_codec::proto::*;

/// Self-signed P-256 certificate, CN `orderer0.example.com`, serial `01AB`
pub const ORDERER0_PEM: &str = include_str!("../fixtures/orderer0.pem");

/// Self-signed P-256 certificate, CN `peer0.org1.example.com`, serial `1001`
pub const PEER0_PEM: &str = include_str!("../fixtures/peer0.pem");

/// Self-signed P-256 certificate, CN `peer1.org2.example.com`, serial `2002`
pub const PEER1_PEM: &str = include_str!("../fixtures/peer1.pem");

/// `PEER1_PEM` as bare DER
pub const PEER1_DER: &[u8] = include_bytes!("../fixtures/peer1.der");

/// A length-delimited field claiming more bytes than follow; fails to
/// decode as any message
pub const TRUNCATED: &[u8] = &[0x0a, 0x05, 0x01];

pub fn serialized_identity(mspid: &str, pem: &str) -> Vec<u8> {
    SerializedIdentity {
        mspid: mspid.to_string(),
        id_bytes: pem.as_bytes().to_vec(),
    }
    .encode_to_vec()
}

pub fn orderer0() -> Vec<u8> {
    serialized_identity("OrdererMSP", ORDERER0_PEM)
}

pub fn peer0() -> Vec<u8> {
    serialized_identity("Org1MSP", PEER0_PEM)
}

pub fn peer1() -> Vec<u8> {
    serialized_identity("Org2MSP", PEER1_PEM)
}

/// Block assembled from signature headers and raw transactions
pub struct BlockBuilder {
    number: u64,
    signature_headers: Vec<Vec<u8>>,
    transactions: Vec<Vec<u8>>,
    metadata: bool,
}

impl BlockBuilder {
    pub fn new(number: u64) -> Self {
        Self {
            number,
            signature_headers: Vec::new(),
            transactions: Vec::new(),
            metadata: true,
        }
    }

    /// Add a block signature whose header names `creator`
    pub fn signed_by(self, creator: Vec<u8>) -> Self {
        let header = SignatureHeader {
            creator,
            nonce: vec![0x4e],
        };
        self.raw_signature_header(header.encode_to_vec())
    }

    pub fn raw_signature_header(mut self, header: Vec<u8>) -> Self {
        self.signature_headers.push(header);
        self
    }

    pub fn transaction(mut self, raw: Vec<u8>) -> Self {
        self.transactions.push(raw);
        self
    }

    /// Leave out the metadata section entirely
    pub fn without_metadata(mut self) -> Self {
        self.metadata = false;
        self
    }

    pub fn build(self) -> Block {
        let signatures = Metadata {
            value: Vec::new(),
            signatures: self
                .signature_headers
                .into_iter()
                .map(|signature_header| MetadataSignature {
                    signature_header,
                    signature: vec![0x30],
                    identifier_header: Vec::new(),
                })
                .collect(),
        };

        Block {
            header: Some(BlockHeader {
                number: self.number,
                previous_hash: vec![0x11; 32],
                data_hash: vec![0x22; 32],
            }),
            data: Some(BlockData {
                data: self.transactions,
            }),
            metadata: self.metadata.then(|| BlockMetadata {
                metadata: vec![signatures.encode_to_vec()],
            }),
        }
    }

    pub fn encode(self) -> Vec<u8> {
        self.build().encode_to_vec()
    }
}

/// Envelope around a peer transaction
pub struct TransactionBuilder {
    header_type: i32,
    channel: String,
    actions: Vec<TransactionAction>,
}

impl TransactionBuilder {
    pub fn endorser(channel: &str) -> Self {
        Self {
            header_type: HeaderType::EndorserTransaction as i32,
            channel: channel.to_string(),
            actions: Vec::new(),
        }
    }

    pub fn header_type(mut self, header_type: HeaderType) -> Self {
        self.header_type = header_type as i32;
        self
    }

    /// Add an action on `chaincode_id` endorsed by `endorsers`, in order
    pub fn action(self, chaincode_id: &str, endorsers: Vec<Vec<u8>>) -> Self {
        self.raw_action(chaincode_action(chaincode_id, endorsers))
    }

    pub fn raw_action(mut self, action: TransactionAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let channel_header = ChannelHeader {
            r#type: self.header_type,
            version: 0,
            timestamp: Some(Timestamp {
                seconds: 1_700_000_000,
                nanos: 0,
            }),
            channel_id: self.channel,
            tx_id: "4f3c".to_string(),
            epoch: 0,
            extension: Vec::new(),
            tls_cert_hash: Vec::new(),
        };
        let payload = Payload {
            header: Some(Header {
                channel_header: channel_header.encode_to_vec(),
                signature_header: Vec::new(),
            }),
            data: Transaction {
                actions: self.actions,
            }
            .encode_to_vec(),
        };
        Envelope {
            payload: payload.encode_to_vec(),
            signature: vec![0x30],
        }
        .encode_to_vec()
    }
}

/// Action whose chaincode event names `chaincode_id`
pub fn chaincode_action(chaincode_id: &str, endorsers: Vec<Vec<u8>>) -> TransactionAction {
    let event = ChaincodeEvent {
        chaincode_id: chaincode_id.to_string(),
        tx_id: "4f3c".to_string(),
        event_name: "Transfer".to_string(),
        payload: Vec::new(),
    };
    chaincode_action_with_events(event.encode_to_vec(), endorsers)
}

/// Action carrying `events` verbatim as its chaincode event bytes
pub fn chaincode_action_with_events(events: Vec<u8>, endorsers: Vec<Vec<u8>>) -> TransactionAction {
    let action = ChaincodeAction {
        results: Vec::new(),
        events,
        response: Some(Response {
            status: 200,
            message: String::new(),
            payload: Vec::new(),
        }),
        chaincode_id: None,
    };
    let response = ProposalResponsePayload {
        proposal_hash: vec![0x33; 32],
        extension: action.encode_to_vec(),
    };
    let payload = ChaincodeActionPayload {
        chaincode_proposal_payload: Vec::new(),
        action: Some(ChaincodeEndorsedAction {
            proposal_response_payload: response.encode_to_vec(),
            endorsements: endorsers
                .into_iter()
                .map(|endorser| Endorsement {
                    endorser,
                    signature: vec![0x30],
                })
                .collect(),
        }),
    };
    TransactionAction {
        header: Vec::new(),
        payload: payload.encode_to_vec(),
    }
}
