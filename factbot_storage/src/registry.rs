use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use tracing::{event, field, Level, Span};

use crate::model::DeliveryState;

/// Guild id to channel id, in registration order.
pub type ChannelMap = IndexMap<String, String>;

/// Durable storage for the channel registry. The whole map is loaded and saved at once.
#[async_trait]
pub trait ChannelStore: Send + Sync {
    /// Load all registrations. A store that was never written returns an empty map.
    async fn load_channels(&self) -> Result<ChannelMap>;
    /// Overwrite all registrations with `channels`.
    async fn save_channels(&self, channels: &ChannelMap) -> Result<()>;
}

/// Durable storage for the [`DeliveryState`] of the daily job.
#[async_trait]
pub trait DeliveryLedger: Send + Sync {
    async fn last_delivery(&self) -> Result<Option<DeliveryState>>;
    async fn record_delivery(&self, state: &DeliveryState) -> Result<()>;
}

/// One registered destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub guild_id: String,
    pub channel_id: String,
}

/// Outcome of [`ChannelRegistry::remove`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    /// The guild had a channel, which is now forgotten.
    Removed { channel_id: String },
    /// Nothing was registered for the guild.
    NotEnabled,
}

/// Which channel receives the daily fact, per guild.
///
/// At most one channel is kept per guild. Every mutation is written to the backing store before it becomes
/// visible, so a failed write leaves the registry as it was.
pub struct ChannelRegistry {
    channels: ChannelMap,
    store: Arc<dyn ChannelStore>,
}

impl ChannelRegistry {
    /// Create a registry with the current contents of `store`.
    pub async fn load(store: Arc<dyn ChannelStore>) -> Result<Self> {
        let channels = store
            .load_channels().await
            .with_context(|| "Error loading the channel registry")?;

        event!(Level::DEBUG, "Loaded {} registered channel(s)", channels.len());

        Ok(Self { channels, store })
    }

    /// The channel registered for `guild_id`, if any.
    pub fn get(&self, guild_id: &str) -> Option<&str> {
        self.channels.get(guild_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// A copy of all destinations in registration order.
    pub fn snapshot(&self) -> Vec<Destination> {
        self.channels
            .iter()
            .map(|(guild_id, channel_id)| Destination {
                guild_id: guild_id.clone(),
                channel_id: channel_id.clone(),
            })
            .collect()
    }

    /// Register `channel_id` for `guild_id`, replacing any earlier registration. Returns the replaced channel.
    #[tracing::instrument(level = "trace", name = "factbot.registry.register", skip(self), fields(previous = field::Empty))]
    pub async fn register(&mut self, guild_id: String, channel_id: String) -> Result<Option<String>> {
        let mut next = self.channels.clone();
        let previous = next.insert(guild_id, channel_id);
        if let Some(previous) = &previous {
            Span::current().record("previous", field::display(previous));
        }

        self.persist(next).await?;
        event!(Level::DEBUG, "Registered channel");

        Ok(previous)
    }

    /// Forget the channel of `guild_id`.
    #[tracing::instrument(level = "trace", name = "factbot.registry.remove", skip(self))]
    pub async fn remove(&mut self, guild_id: &str) -> Result<Removal> {
        if !self.channels.contains_key(guild_id) {
            event!(Level::DEBUG, "Guild has no registered channel");
            return Ok(Removal::NotEnabled);
        }

        let mut next = self.channels.clone();
        let removal = match next.shift_remove(guild_id) {
            Some(channel_id) => Removal::Removed { channel_id },
            None => Removal::NotEnabled,
        };

        self.persist(next).await?;
        event!(Level::DEBUG, "Removed channel");

        Ok(removal)
    }

    async fn persist(&mut self, next: ChannelMap) -> Result<()> {
        self.store
            .save_channels(&next).await
            .with_context(|| "Error saving the channel registry")?;
        self.channels = next;

        Ok(())
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry").field("channels", &self.channels).finish_non_exhaustive()
    }
}
