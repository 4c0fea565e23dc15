//! Block disassembly: attributes block signatures to orderers and
//! endorsements of the tracked chaincode to peers

use provenance_codec::{
    block_metadata, chaincode_action, chaincode_event, channel_header, decode_signer_identity,
    endorsements, envelope, payload, proto::*, signature_header, transaction, DecodeError, Layer,
};
use provenance_common::{IdentityObservationSink, Role};
use tracing::{debug, error};

/// Where in the block a decode failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// The block's signature metadata as a whole
    SignatureMetadata,

    /// Signature entry by index
    Signature(usize),

    /// Transaction by index in the block data
    Transaction(usize),

    /// Action by index within a transaction
    Action { transaction: usize, action: usize },
}

/// A logged decode failure; the unit it names was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeFailure {
    pub location: Location,
    pub layer: Layer,
    pub message: String,
}

/// Outcome of disassembling one block
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DisassemblyReport {
    pub block_number: u64,
    pub orderer_observations: usize,
    pub peer_observations: usize,
    pub failures: Vec<DecodeFailure>,
}

impl DisassemblyReport {
    fn failed(&mut self, location: Location, error: &DecodeError) {
        error!(
            block = self.block_number,
            location = ?location,
            layer = %error.layer(),
            "{error}"
        );
        self.failures.push(DecodeFailure {
            location,
            layer: error.layer(),
            message: error.to_string(),
        });
    }
}

/// Extracts signer identities from blocks of one channel, counting
/// endorsements of one chaincode only
#[derive(Debug, Clone)]
pub struct BlockDisassembler {
    channel: String,
    chaincode_id: String,
}

impl BlockDisassembler {
    pub fn new(channel: impl Into<String>, chaincode_id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            chaincode_id: chaincode_id.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn chaincode_id(&self) -> &str {
        &self.chaincode_id
    }

    /// Run both passes over a block. Never fails: anything undecodable is
    /// logged, listed in the report and skipped.
    pub fn disassemble<S>(&self, block: &Block, sink: &S) -> DisassemblyReport
    where
        S: IdentityObservationSink + ?Sized,
    {
        let mut report = DisassemblyReport {
            block_number: block.number(),
            ..Default::default()
        };
        self.extract_orderer_signatures(block, sink, &mut report);
        self.extract_endorsers(block, sink, &mut report);
        report
    }

    /// Signature-header pass. Orderer signatures are block scoped, so each
    /// is tagged with the block number. Not filtered by channel.
    pub fn extract_orderer_signatures<S>(
        &self,
        block: &Block,
        sink: &S,
        report: &mut DisassemblyReport,
    ) where
        S: IdentityObservationSink + ?Sized,
    {
        let number = block.number();
        let metadata = match block_metadata(block, BlockMetadataIndex::Signatures) {
            Ok(metadata) => metadata,
            Err(e) => {
                report.failed(Location::SignatureMetadata, &e);
                return;
            }
        };

        for (index, signature) in metadata.signatures.iter().enumerate() {
            let header = match signature_header(signature) {
                Ok(header) => header,
                Err(e) => {
                    report.failed(Location::Signature(index), &e);
                    continue;
                }
            };

            if let Some(signer) = decode_signer_identity(&header.creator) {
                debug!(
                    "Block {number} => Orderer CN: {}; serial number: {}",
                    signer.common_name, signer.serial_number
                );
                sink.build_up(signer.into_identity(Role::Orderer), Some(number));
                report.orderer_observations += 1;
            }
        }
    }

    /// Transaction pass. Endorsements are reported without a block number.
    pub fn extract_endorsers<S>(&self, block: &Block, sink: &S, report: &mut DisassemblyReport)
    where
        S: IdentityObservationSink + ?Sized,
    {
        for (tx_index, raw) in block.transactions().iter().enumerate() {
            let tx = match self.unwrap_transaction(raw) {
                Ok(Some(tx)) => tx,
                Ok(None) => continue,
                Err(e) => {
                    report.failed(Location::Transaction(tx_index), &e);
                    continue;
                }
            };

            for (action_index, action) in tx.actions.iter().enumerate() {
                let endorsements = match self.tracked_endorsements(action) {
                    Ok(Some(endorsements)) => endorsements,
                    Ok(None) => continue,
                    Err(e) => {
                        let location = Location::Action {
                            transaction: tx_index,
                            action: action_index,
                        };
                        report.failed(location, &e);
                        continue;
                    }
                };

                for endorsement in endorsements {
                    if let Some(signer) = decode_signer_identity(&endorsement.endorser) {
                        debug!(
                            "Endorser CN: {}; serial number: {}",
                            signer.common_name, signer.serial_number
                        );
                        sink.build_up(signer.into_identity(Role::Peer), None);
                        report.peer_observations += 1;
                    }
                }
            }
        }
    }

    /// Unwrap a raw transaction to its peer transaction, or `None` if it
    /// isn't an endorser transaction on our channel
    fn unwrap_transaction(&self, raw: &[u8]) -> Result<Option<Transaction>, DecodeError> {
        let envelope = envelope(raw)?;
        let payload = payload(&envelope)?;
        let header = channel_header(&payload)?;

        if header.r#type != HeaderType::EndorserTransaction as i32 {
            return Ok(None);
        }
        if header.channel_id != self.channel {
            return Ok(None);
        }

        transaction(&payload).map(Some)
    }

    /// Endorsements of an action, or `None` if its chaincode event isn't
    /// for the tracked chaincode
    fn tracked_endorsements(
        &self,
        action: &TransactionAction,
    ) -> Result<Option<Vec<Endorsement>>, DecodeError> {
        let chaincode_action = chaincode_action(action)?;
        let event = chaincode_event(&chaincode_action)?;

        // Score only the selected chaincode
        if event.chaincode_id != self.chaincode_id {
            return Ok(None);
        }

        endorsements(action).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;
    use provenance_common::{IdentityObservation, ObservationBatch};
    use provenance_test_utils::*;

    const CHANNEL: &str = "mychannel";
    const CHAINCODE: &str = "basic";

    fn disassembler() -> BlockDisassembler {
        BlockDisassembler::new(CHANNEL, CHAINCODE)
    }

    fn run(block: &Block) -> (Vec<IdentityObservation>, DisassemblyReport) {
        let batch = ObservationBatch::new();
        let report = disassembler().disassemble(block, &batch);
        (batch.drain(), report)
    }

    fn names(observations: &[IdentityObservation]) -> Vec<&str> {
        observations.iter().map(|o| o.identity.common_name.as_str()).collect()
    }

    #[test]
    fn orderer_signature_is_tagged_with_block_number() {
        let block = BlockBuilder::new(42).signed_by(orderer0()).build();

        let (observations, report) = run(&block);

        assert_eq!(observations.len(), 1);
        let observation = &observations[0];
        assert_eq!(observation.identity.role, Role::Orderer);
        assert_eq!(observation.identity.common_name, "orderer0.example.com");
        assert_eq!(observation.identity.serial_number, "01AB");
        assert!(!observation.identity.certificate.is_empty());
        assert_eq!(observation.block_number, Some(42));
        assert_eq!(report.orderer_observations, 1);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn block_without_signatures_emits_nothing() {
        let (observations, report) = run(&BlockBuilder::new(1).build());
        assert!(observations.is_empty());
        assert!(report.failures.is_empty());
    }

    #[test]
    fn missing_metadata_is_logged_once() {
        let block = BlockBuilder::new(1).without_metadata().build();

        let (observations, report) = run(&block);

        assert!(observations.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].location, Location::SignatureMetadata);
        assert_eq!(report.failures[0].layer, Layer::Metadata);
    }

    #[test]
    fn malformed_signature_header_skips_only_that_entry() {
        let block = BlockBuilder::new(5)
            .raw_signature_header(TRUNCATED.to_vec())
            .signed_by(orderer0())
            .build();

        let (observations, report) = run(&block);

        assert_eq!(names(&observations), vec!["orderer0.example.com"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].location, Location::Signature(0));
        assert_eq!(report.failures[0].layer, Layer::SignatureHeader);
    }

    #[test]
    fn unattributable_creator_is_skipped_silently() {
        let block = BlockBuilder::new(5)
            .signed_by(serialized_identity("OrdererMSP", "garbage"))
            .build();

        let (observations, report) = run(&block);

        assert!(observations.is_empty());
        assert!(report.failures.is_empty());
    }

    #[test]
    fn endorsers_follow_endorsement_order_without_block_number() {
        let tx = TransactionBuilder::endorser(CHANNEL)
            .action(CHAINCODE, vec![peer0(), peer1()])
            .build();
        let block = BlockBuilder::new(7).transaction(tx).build();

        let (observations, report) = run(&block);

        assert_eq!(
            names(&observations),
            vec!["peer0.org1.example.com", "peer1.org2.example.com"]
        );
        assert!(observations.iter().all(|o| o.identity.role == Role::Peer));
        assert!(observations.iter().all(|o| o.block_number.is_none()));
        assert_eq!(observations[0].identity.serial_number, "1001");
        assert_eq!(report.peer_observations, 2);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn other_channel_is_filtered_without_logging() {
        let tx = TransactionBuilder::endorser("other-channel")
            .action(CHAINCODE, vec![peer0(), peer1()])
            .build();
        let block = BlockBuilder::new(7).transaction(tx).build();

        let (observations, report) = run(&block);

        assert!(observations.is_empty());
        assert!(report.failures.is_empty());
    }

    #[test]
    fn non_endorser_transactions_are_filtered_without_logging() {
        for header_type in [HeaderType::Config, HeaderType::OrdererTransaction, HeaderType::Message]
        {
            let tx = TransactionBuilder::endorser(CHANNEL)
                .header_type(header_type)
                .action(CHAINCODE, vec![peer0()])
                .build();
            let block = BlockBuilder::new(8).transaction(tx).build();

            let (observations, report) = run(&block);

            assert!(observations.is_empty(), "{header_type:?}");
            assert!(report.failures.is_empty(), "{header_type:?}");
        }
    }

    #[test]
    fn other_chaincode_endorsements_are_never_visited() {
        let tx = TransactionBuilder::endorser(CHANNEL)
            .action("marbles", vec![peer0(), peer1()])
            .build();
        let block = BlockBuilder::new(9).transaction(tx).build();

        let (observations, report) = run(&block);

        assert!(observations.is_empty());
        assert_eq!(report.peer_observations, 0);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn malformed_transaction_does_not_suppress_others() {
        let good = TransactionBuilder::endorser(CHANNEL)
            .action(CHAINCODE, vec![peer0()])
            .build();
        let block = BlockBuilder::new(10)
            .transaction(good.clone())
            .transaction(TRUNCATED.to_vec())
            .transaction(good)
            .build();

        let (observations, report) = run(&block);

        assert_eq!(
            names(&observations),
            vec!["peer0.org1.example.com", "peer0.org1.example.com"]
        );
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].location, Location::Transaction(1));
        assert_eq!(report.failures[0].layer, Layer::Envelope);
    }

    fn envelope_around(payload: Payload) -> Vec<u8> {
        Envelope {
            payload: payload.encode_to_vec(),
            signature: vec![0x30],
        }
        .encode_to_vec()
    }

    #[test]
    fn each_transaction_layer_failure_skips_only_its_transaction() {
        let bad_payload = Envelope {
            payload: TRUNCATED.to_vec(),
            signature: vec![0x30],
        }
        .encode_to_vec();
        let bad_channel_header = envelope_around(Payload {
            header: Some(Header {
                channel_header: TRUNCATED.to_vec(),
                signature_header: Vec::new(),
            }),
            data: Vec::new(),
        });
        let no_header = envelope_around(Payload {
            header: None,
            data: Vec::new(),
        });
        let bad_peer_transaction = envelope_around(Payload {
            header: Some(Header {
                channel_header: ChannelHeader {
                    r#type: HeaderType::EndorserTransaction as i32,
                    channel_id: CHANNEL.to_string(),
                    ..Default::default()
                }
                .encode_to_vec(),
                signature_header: Vec::new(),
            }),
            data: TRUNCATED.to_vec(),
        });
        let good = TransactionBuilder::endorser(CHANNEL)
            .action(CHAINCODE, vec![peer0()])
            .build();
        let block = BlockBuilder::new(12)
            .transaction(bad_payload)
            .transaction(bad_channel_header)
            .transaction(no_header)
            .transaction(bad_peer_transaction)
            .transaction(good)
            .build();

        let (observations, report) = run(&block);

        assert_eq!(names(&observations), vec!["peer0.org1.example.com"]);
        assert_eq!(report.peer_observations, 1);
        let failures: Vec<_> = report.failures.iter().map(|f| (f.location, f.layer)).collect();
        assert_eq!(
            failures,
            vec![
                (Location::Transaction(0), Layer::Payload),
                (Location::Transaction(1), Layer::ChannelHeader),
                (Location::Transaction(2), Layer::ChannelHeader),
                (Location::Transaction(3), Layer::Transaction),
            ]
        );
    }

    #[test]
    fn malformed_action_does_not_suppress_sibling_actions() {
        let broken_payload = TransactionAction {
            header: Vec::new(),
            payload: TRUNCATED.to_vec(),
        };
        let broken_event = chaincode_action_with_events(TRUNCATED.to_vec(), vec![peer0()]);
        let tx = TransactionBuilder::endorser(CHANNEL)
            .raw_action(broken_payload)
            .raw_action(broken_event)
            .action(CHAINCODE, vec![peer1()])
            .build();
        let block = BlockBuilder::new(11).transaction(tx).build();

        let (observations, report) = run(&block);

        assert_eq!(names(&observations), vec!["peer1.org2.example.com"]);
        let failures: Vec<_> = report.failures.iter().map(|f| (f.location, f.layer)).collect();
        assert_eq!(
            failures,
            vec![
                (
                    Location::Action {
                        transaction: 0,
                        action: 0
                    },
                    Layer::ActionPayload
                ),
                (
                    Location::Action {
                        transaction: 0,
                        action: 1
                    },
                    Layer::ChaincodeEvent
                ),
            ]
        );
    }

    #[test]
    fn unattributable_endorser_is_skipped_silently() {
        let tx = TransactionBuilder::endorser(CHANNEL)
            .action(CHAINCODE, vec![TRUNCATED.to_vec(), peer1()])
            .build();
        let block = BlockBuilder::new(12).transaction(tx).build();

        let (observations, report) = run(&block);

        assert_eq!(names(&observations), vec!["peer1.org2.example.com"]);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn orderer_signatures_ignore_the_channel_filter() {
        let tx = TransactionBuilder::endorser("other-channel")
            .action(CHAINCODE, vec![peer0()])
            .build();
        let block = BlockBuilder::new(13).signed_by(orderer0()).transaction(tx).build();

        let (observations, _) = run(&block);

        assert_eq!(names(&observations), vec!["orderer0.example.com"]);
    }

    #[test]
    fn disassembly_is_repeatable() {
        let tx = TransactionBuilder::endorser(CHANNEL)
            .action(CHAINCODE, vec![peer0(), peer1()])
            .build();
        let block = BlockBuilder::new(14)
            .signed_by(orderer0())
            .transaction(tx)
            .transaction(TRUNCATED.to_vec())
            .build();

        let first = run(&block);
        let second = run(&block);

        assert_eq!(first, second);
        assert_eq!(first.0.len(), 3);
    }
}
