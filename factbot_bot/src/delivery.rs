//! One delivery cycle: fetch a payload once and hand it to every registered channel.

use std::fmt;

use poise::async_trait;
use tracing::{event, Level};

use factbot_storage::prelude::Destination;

use crate::content::{ContentSources, Payload};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("'{0}' is not a valid channel id")]
    InvalidChannelId(String),
    #[error("Channel {channel_id} could not be resolved: {reason}")]
    ChannelNotFound { channel_id: String, reason: String },
    #[error("Sending to channel {channel_id} failed: {reason}")]
    Send { channel_id: String, reason: String },
}

impl DeliveryError {
    /// The destination can't be reached at all, as opposed to a send that was attempted and failed.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, DeliveryError::InvalidChannelId(_) | DeliveryError::ChannelNotFound { .. })
    }
}

/// Resolves a destination and puts a payload in it.
#[async_trait]
pub trait Courier: Send + Sync {
    async fn deliver(&self, destination: &Destination, payload: &Payload) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Sent,
    /// The channel could not be resolved.
    Skipped(DeliveryError),
    /// The channel was resolved but the message did not go out.
    Failed(DeliveryError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationOutcome {
    pub destination: Destination,
    pub outcome: Outcome,
}

/// What happened during one cycle, per destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub outcomes: Vec<DestinationOutcome>,
    pub used_fallback_fact: bool,
    pub image_attached: bool,
}

impl DeliveryReport {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn sent(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Sent))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed(_)))
    }

    fn count(&self, predicate: impl Fn(&Outcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| predicate(&o.outcome)).count()
    }
}

impl fmt::Display for DeliveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Attempted: {} - Sent: {} - Skipped: {} - Failed: {}",
            self.attempted(),
            self.sent(),
            self.skipped(),
            self.failed()
        )
    }
}

/// Fetch one payload and deliver it to each destination in order.
///
/// A failing destination is recorded in the report and the remaining ones are still attempted. Nothing is retried.
pub async fn run_cycle(
    destinations: Vec<Destination>,
    content: &ContentSources,
    courier: &dyn Courier,
) -> DeliveryReport {
    event!(Level::INFO, "Sending to {} channel(s)", destinations.len());

    if destinations.is_empty() {
        return DeliveryReport::default();
    }

    let payload = content.payload().await;
    let mut report = DeliveryReport {
        outcomes: Vec::with_capacity(destinations.len()),
        used_fallback_fact: payload.fact.is_fallback,
        image_attached: payload.image_url.is_some(),
    };

    for destination in destinations {
        let outcome = match courier.deliver(&destination, &payload).await {
            Ok(()) => {
                event!(Level::INFO, guild_id = %destination.guild_id, channel_id = %destination.channel_id, "Sent daily fact");
                Outcome::Sent
            }
            Err(error) if error.is_unreachable() => {
                event!(Level::WARN, guild_id = %destination.guild_id, %error, "Skipping destination");
                Outcome::Skipped(error)
            }
            Err(error) => {
                event!(Level::ERROR, guild_id = %destination.guild_id, %error, "Error sending daily fact");
                Outcome::Failed(error)
            }
        };

        report.outcomes.push(DestinationOutcome { destination, outcome });
    }

    report
}
