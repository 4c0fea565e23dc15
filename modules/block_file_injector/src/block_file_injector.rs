//! Fabric block file injector module for Caryatid
//! Publishes blocks read from files into the system after startup

use anyhow::{anyhow, Result};
use caryatid_sdk::{module, Context};
use config::Config;
use glob::glob;
use provenance_codec::{block_info, decode_block};
use provenance_common::{
    messages::{FabricMessage, Message, RawBlockMessage},
    BlockInfo,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

const CONFIG_STARTUP_TOPIC: (&str, &str) = ("startup-topic", "fabric.sequence.start");
const CONFIG_BLOCK_PUBLISH_TOPIC: (&str, &str) = ("block-publish-topic", "fabric.block.available");
const CONFIG_BLOCK_FILES: &str = "block-files";

/// Block file injector module
#[module(
    message_type(Message),
    name = "block-file-injector",
    description = "Block file injector"
)]
pub struct BlockFileInjector;

impl BlockFileInjector {
    /// Files matching the pattern, in lexicographic order
    fn block_files(pattern: &str) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in glob(pattern).map_err(|e| anyhow!("Bad block-files pattern: {}", e.msg))? {
            match entry {
                Ok(path) => files.push(path),
                Err(e) => warn!("Can't read {}: {e}", e.path().display()),
            }
        }

        files.sort();
        Ok(files)
    }

    /// Read and decode one block file into the message to publish
    fn load_block(path: &Path) -> Result<(BlockInfo, RawBlockMessage)> {
        let raw = fs::read(path)?;
        let block = decode_block(&raw)?;
        Ok((block_info(&block), RawBlockMessage { raw }))
    }

    /// Read and publish all the blocks, skipping any that can't be read
    async fn process_blocks(
        context: Arc<Context<Message>>,
        files: Vec<PathBuf>,
        block_publish_topic: &str,
    ) -> usize {
        let mut published = 0;
        for path in files {
            let (block_info, message) = match Self::load_block(&path) {
                Ok(loaded) => loaded,
                Err(e) => {
                    error!("Skipping {}: {e}", path.display());
                    continue;
                }
            };
            info!("  {} -> block {}", path.display(), block_info.number);

            let message_enum =
                Message::Fabric((block_info, FabricMessage::BlockAvailable(message)));
            context
                .publish(block_publish_topic, Arc::new(message_enum))
                .await
                .unwrap_or_else(|e| error!("Failed to publish block message: {e}"));
            published += 1;
        }
        published
    }

    /// Main init function
    pub async fn init(&self, context: Arc<Context<Message>>, config: Arc<Config>) -> Result<()> {
        let Ok(file_pattern) = config.get_string(CONFIG_BLOCK_FILES) else {
            error!("No block-files pattern given");
            return Err(anyhow!("No block-files"));
        };

        let startup_topic = config
            .get_string(CONFIG_STARTUP_TOPIC.0)
            .unwrap_or(CONFIG_STARTUP_TOPIC.1.to_string());
        info!("Creating startup subscriber on '{startup_topic}'");

        let block_publish_topic = config
            .get_string(CONFIG_BLOCK_PUBLISH_TOPIC.0)
            .unwrap_or(CONFIG_BLOCK_PUBLISH_TOPIC.1.to_string());
        info!("Publishing blocks on '{block_publish_topic}'");

        let mut subscription = context.subscribe(&startup_topic).await?;

        context.clone().run(async move {
            let Ok(_) = subscription.read().await else {
                return;
            };
            info!("Received startup message");

            let span = info_span!("block_file_injector.process_blocks", pattern = %file_pattern);
            async {
                match Self::block_files(&file_pattern) {
                    Ok(files) => {
                        let found = files.len();
                        let published =
                            Self::process_blocks(context, files, &block_publish_topic).await;
                        info!(found, published, "Block files injected");
                    }
                    Err(e) => error!("Failed to scan block files: {e}"),
                }
            }
            .instrument(span)
            .await;
        });

        Ok(())
    }
}
