//! Fabric block disassembler module for Caryatid
//! Attributes block signatures to orderers and chaincode endorsements to
//! peers, publishing the identities found in each block

use anyhow::Result;
use caryatid_sdk::{module, Context, Subscription};
use config::Config;
use provenance_codec::decode_block;
use provenance_common::{
    messages::{FabricMessage, IdentityObservationsMessage, Message, RawBlockMessage},
    BlockInfo, ObservationBatch,
};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, Instrument};

mod configuration;
mod disassembler;

use configuration::BlockDisassemblerConfig;
pub use disassembler::{BlockDisassembler, DecodeFailure, DisassemblyReport, Location};

/// Block disassembler module
#[module(
    message_type(Message),
    name = "block-disassembler",
    description = "Orderer and endorser identity extraction"
)]
pub struct BlockDisassemblerModule;

impl BlockDisassemblerModule {
    /// Disassemble one raw block into the message to publish, or `None` if
    /// the block itself can't be decoded
    fn handle_block(
        disassembler: &BlockDisassembler,
        block_info: &BlockInfo,
        block_msg: &RawBlockMessage,
    ) -> Option<Message> {
        let block = match decode_block(&block_msg.raw) {
            Ok(block) => block,
            Err(e) => {
                error!("Can't decode block {}: {e}", block_info.number);
                return None;
            }
        };

        let batch = ObservationBatch::new();
        let report = disassembler.disassemble(&block, &batch);
        debug!(
            orderers = report.orderer_observations,
            peers = report.peer_observations,
            failures = report.failures.len(),
            "Disassembled block {}",
            report.block_number
        );

        Some(Message::Fabric((
            block_info.clone(),
            FabricMessage::IdentityObservations(IdentityObservationsMessage {
                observations: batch.drain(),
            }),
        )))
    }

    /// Run loop
    async fn run(
        context: Arc<Context<Message>>,
        cfg: BlockDisassemblerConfig,
        disassembler: BlockDisassembler,
        mut subscription: Box<dyn Subscription<Message>>,
    ) -> Result<()> {
        loop {
            let (_, message) = subscription.read().await?;
            match message.as_ref() {
                Message::Fabric((block_info, FabricMessage::BlockAvailable(block_msg))) => {
                    let span =
                        info_span!("block_disassembler.handle_block", block = block_info.number);
                    async {
                        if let Some(message) =
                            Self::handle_block(&disassembler, block_info, block_msg)
                        {
                            context
                                .publish(&cfg.publish_topic, Arc::new(message))
                                .await
                                .unwrap_or_else(|e| error!("Failed to publish: {e}"));
                        }
                    }
                    .instrument(span)
                    .await;
                }

                _ => error!("Unexpected message type: {message:?}"),
            }
        }
    }

    /// Main init function
    pub async fn init(&self, context: Arc<Context<Message>>, config: Arc<Config>) -> Result<()> {
        let cfg = BlockDisassemblerConfig::try_load(&config)?;
        info!(
            channel = %cfg.channel,
            chaincode = %cfg.chaincode_id,
            "Disassembling blocks from '{}', publishing identities on '{}'",
            cfg.subscribe_topic,
            cfg.publish_topic
        );

        let disassembler = BlockDisassembler::new(cfg.channel.clone(), cfg.chaincode_id.clone());
        let subscription = context.subscribe(&cfg.subscribe_topic).await?;

        let run_context = context.clone();
        context.run(async move {
            Self::run(run_context, cfg, disassembler, subscription)
                .await
                .unwrap_or_else(|e| error!("Failed: {e}"));
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provenance_common::Role;
    use provenance_test_utils::*;

    fn block_message(raw: Vec<u8>) -> (BlockInfo, RawBlockMessage) {
        let info = BlockInfo {
            number: 42,
            ..Default::default()
        };
        (info, RawBlockMessage { raw })
    }

    #[test]
    fn publishes_identities_found_in_block() {
        let disassembler = BlockDisassembler::new("mychannel", "basic");
        let tx = TransactionBuilder::endorser("mychannel")
            .action("basic", vec![peer0()])
            .build();
        let raw = BlockBuilder::new(42).signed_by(orderer0()).transaction(tx).encode();
        let (info, block_msg) = block_message(raw);

        let message = BlockDisassemblerModule::handle_block(&disassembler, &info, &block_msg);

        match message {
            Some(Message::Fabric((block, FabricMessage::IdentityObservations(msg)))) => {
                assert_eq!(block.number, 42);
                let roles: Vec<_> = msg.observations.iter().map(|o| o.identity.role).collect();
                assert_eq!(roles, vec![Role::Orderer, Role::Peer]);
                assert_eq!(msg.observations[0].block_number, Some(42));
            }
            other => panic!("Expected IdentityObservations message, got {other:?}"),
        }
    }

    #[test]
    fn undecodable_block_publishes_nothing() {
        let disassembler = BlockDisassembler::new("mychannel", "basic");
        let (info, block_msg) = block_message(TRUNCATED.to_vec());

        assert!(BlockDisassemblerModule::handle_block(&disassembler, &info, &block_msg).is_none());
    }
}
