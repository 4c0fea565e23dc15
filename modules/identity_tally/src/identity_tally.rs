//! Fabric identity tally module for Caryatid
//! Counts block signatures per orderer and endorsements per peer

use anyhow::Result;
use caryatid_sdk::{module, Context, Subscription};
use config::Config;
use futures::{pin_mut, stream, Stream, StreamExt};
use provenance_common::{
    messages::{FabricMessage, Message},
    rest_helper::handle_rest,
    Role,
};
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};

mod rest;
mod tally;

use rest::handle_identities;
pub use tally::{IdentityRecord, IdentityTally};

const DEFAULT_SUBSCRIBE_TOPIC: (&str, &str) =
    ("subscribe-topic", "fabric.identity.observations");
const DEFAULT_CLOCK_TICK_SUBSCRIBE_TOPIC: (&str, &str) =
    ("clock-tick-subscribe-topic", "clock.tick");
const DEFAULT_SUMMARY_INTERVAL: (&str, i64) = ("summary-interval", 60);
const DEFAULT_HANDLE_IDENTITIES_TOPIC: (&str, &str) =
    ("handle-topic-identities", "rest.get.identities");
const DEFAULT_HANDLE_IDENTITIES_BY_ROLE_TOPIC: (&str, &str) =
    ("handle-topic-identities-by-role", "rest.get.identities.*");

/// Identity tally module
#[module(
    message_type(Message),
    name = "identity-tally",
    description = "Orderer and endorser signature counts"
)]
pub struct IdentityTallyModule;

impl IdentityTallyModule {
    /// Run loop
    async fn run(
        tally: Arc<IdentityTally>,
        mut subscription: Box<dyn Subscription<Message>>,
    ) -> Result<()> {
        loop {
            let (_, message) = subscription.read().await?;
            match message.as_ref() {
                Message::Fabric((block_info, FabricMessage::IdentityObservations(msg))) => {
                    let span = info_span!(
                        "identity_tally.handle_observations",
                        block = block_info.number
                    );
                    async {
                        for observation in &msg.observations {
                            tally.record(observation.identity.clone(), observation.block_number);
                        }
                    }
                    .instrument(span)
                    .await;
                }

                _ => error!("Unexpected message type: {message:?}"),
            }
        }
    }

    fn log_summary(tally: &IdentityTally) {
        for role in [Role::Orderer, Role::Peer] {
            let leader = tally.ranking(role).into_iter().next();
            info!(
                %role,
                identities = tally.identities(role),
                signatures = tally.total(role),
                most_active = leader.as_ref().map(|r| r.common_name.as_str()).unwrap_or("-"),
                "Identity tally"
            );
        }
    }

    /// Log a summary every `interval` clock ticks until the tick stream ends.
    /// Returns the number of summaries logged.
    async fn run_clock(
        tally: Arc<IdentityTally>,
        interval: u64,
        ticks: impl Stream<Item = Arc<Message>>,
    ) -> usize {
        pin_mut!(ticks);
        let mut summaries = 0;
        while let Some(tick_message) = ticks.next().await {
            if let Message::Clock(tick_message) = tick_message.as_ref() {
                if tick_message.number % interval == 0 {
                    Self::log_summary(&tally);
                    summaries += 1;
                }
            }
        }
        summaries
    }

    /// Main init function
    pub async fn init(&self, context: Arc<Context<Message>>, config: Arc<Config>) -> Result<()> {
        let subscribe_topic = config
            .get_string(DEFAULT_SUBSCRIBE_TOPIC.0)
            .unwrap_or(DEFAULT_SUBSCRIBE_TOPIC.1.to_string());
        info!("Creating subscriber on '{subscribe_topic}'");

        let clock_tick_subscribe_topic = config
            .get_string(DEFAULT_CLOCK_TICK_SUBSCRIBE_TOPIC.0)
            .unwrap_or(DEFAULT_CLOCK_TICK_SUBSCRIBE_TOPIC.1.to_string());
        info!("Creating subscriber on '{clock_tick_subscribe_topic}'");

        let summary_interval = config
            .get_int(DEFAULT_SUMMARY_INTERVAL.0)
            .unwrap_or(DEFAULT_SUMMARY_INTERVAL.1)
            .max(1) as u64;

        let handle_identities_topic = config
            .get_string(DEFAULT_HANDLE_IDENTITIES_TOPIC.0)
            .unwrap_or(DEFAULT_HANDLE_IDENTITIES_TOPIC.1.to_string());
        info!("Creating request handler on '{handle_identities_topic}'");

        let handle_identities_by_role_topic = config
            .get_string(DEFAULT_HANDLE_IDENTITIES_BY_ROLE_TOPIC.0)
            .unwrap_or(DEFAULT_HANDLE_IDENTITIES_BY_ROLE_TOPIC.1.to_string());
        info!("Creating request handler on '{handle_identities_by_role_topic}'");

        let tally = Arc::new(IdentityTally::new());

        handle_rest(context.clone(), &handle_identities_topic, {
            let tally = tally.clone();
            move |params| handle_identities(tally.clone(), params)
        });

        handle_rest(context.clone(), &handle_identities_by_role_topic, {
            let tally = tally.clone();
            move |params| handle_identities(tally.clone(), params)
        });

        let subscription = context.subscribe(&subscribe_topic).await?;
        let tally_run = tally.clone();
        context.run(async move {
            Self::run(tally_run, subscription).await.unwrap_or_else(|e| error!("Failed: {e}"));
        });

        let clock_tick_subscription = context.subscribe(&clock_tick_subscribe_topic).await?;
        let ticks = stream::unfold(clock_tick_subscription, |mut subscription| async move {
            match subscription.read().await {
                Ok((_, message)) => Some((message, subscription)),
                Err(e) => {
                    error!("Identity tally clock tick subscription closed: {e}");
                    None
                }
            }
        });
        context.run(async move {
            Self::run_clock(tally, summary_interval, ticks).await;
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clock_loop_ends_with_its_subscription() {
        let tally = Arc::new(IdentityTally::new());
        let ticks = stream::iter(vec![Arc::new(Message::None(())), Arc::new(Message::None(()))]);

        let summaries = IdentityTallyModule::run_clock(tally, 60, ticks).await;

        assert_eq!(summaries, 0);
    }
}
