use anyhow::{bail, Result};
use config::Config;

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BlockDisassemblerConfig {
    pub subscribe_topic: String,
    pub publish_topic: String,

    /// Only endorser transactions on this channel are unwrapped
    pub channel: String,

    /// Only endorsements whose chaincode event names this chaincode are counted
    pub chaincode_id: String,
}

impl BlockDisassemblerConfig {
    pub fn try_load(config: &Config) -> Result<Self> {
        let full_config = Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config.default.toml"),
                config::FileFormat::Toml,
            ))
            .add_source(config.clone())
            .build()?;
        let cfg: Self = full_config.try_deserialize()?;

        if cfg.channel.is_empty() {
            bail!("Block disassembler needs a target channel");
        }
        if cfg.chaincode_id.is_empty() {
            bail!("Block disassembler needs a target chaincode-id");
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(toml: &str) -> Result<BlockDisassemblerConfig> {
        let config = Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        BlockDisassemblerConfig::try_load(&config)
    }

    #[test]
    fn defaults_topics_and_reads_targets() {
        let cfg = load("channel = \"mychannel\"\nchaincode-id = \"basic\"").unwrap();
        assert_eq!(cfg.subscribe_topic, "fabric.block.available");
        assert_eq!(cfg.publish_topic, "fabric.identity.observations");
        assert_eq!(cfg.channel, "mychannel");
        assert_eq!(cfg.chaincode_id, "basic");
    }

    #[test]
    fn topics_can_be_overridden() {
        let cfg = load("channel = \"c\"\nchaincode-id = \"cc\"\npublish-topic = \"custom\"").unwrap();
        assert_eq!(cfg.publish_topic, "custom");
    }

    #[test]
    fn targets_are_required() {
        assert!(load("chaincode-id = \"basic\"").is_err());
        assert!(load("channel = \"mychannel\"").is_err());
        assert!(load("channel = \"\"\nchaincode-id = \"basic\"").is_err());
    }
}
