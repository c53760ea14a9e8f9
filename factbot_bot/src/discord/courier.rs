use std::num::NonZeroU64;
use std::sync::Arc;

use poise::async_trait;
use poise::serenity_prelude as serenity;
use tracing::{event, Level};

use factbot_storage::prelude::Destination;

use crate::content::Payload;
use crate::delivery::{Courier, DeliveryError};
use crate::discord::messages;

/// Delivers payloads through the Discord REST API.
pub struct DiscordCourier {
    http: Arc<serenity::Http>,
}

impl DiscordCourier {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

/// Parses a stored channel id. Zero and anything that isn't a number are rejected.
pub fn parse_channel_id(raw: &str) -> Result<serenity::ChannelId, DeliveryError> {
    raw.trim()
        .parse::<NonZeroU64>()
        .map(serenity::ChannelId::from)
        .map_err(|_| DeliveryError::InvalidChannelId(raw.to_string()))
}

#[async_trait]
impl Courier for DiscordCourier {
    async fn deliver(&self, destination: &Destination, payload: &Payload) -> Result<(), DeliveryError> {
        let channel_id = parse_channel_id(&destination.channel_id)?;

        let channel = channel_id
            .to_channel(&self.http).await
            .map_err(|e| DeliveryError::ChannelNotFound {
                channel_id: destination.channel_id.clone(),
                reason: e.to_string(),
            })?;

        let Some(guild_channel) = channel.guild() else {
            return Err(DeliveryError::ChannelNotFound {
                channel_id: destination.channel_id.clone(),
                reason: "not a server channel".into(),
            });
        };

        guild_channel
            .send_message(&self.http, messages::fact_message(payload)).await
            .map_err(|e| DeliveryError::Send {
                channel_id: destination.channel_id.clone(),
                reason: e.to_string(),
            })?;

        event!(Level::DEBUG, guild_id = %destination.guild_id, "Sent daily fact to #{}", guild_channel.name);

        Ok(())
    }
}
