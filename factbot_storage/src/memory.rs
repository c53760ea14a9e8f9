use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::model::DeliveryState;
use crate::registry::{ChannelMap, ChannelStore, DeliveryLedger};

/// A store that lives as long as the process. No backend setting selects it, it backs the tests of this and
/// the bot crate.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryContents>,
}

#[derive(Debug, Default)]
struct MemoryContents {
    channels: ChannelMap,
    delivery: Option<DeliveryState>,
    saves: usize,
}

impl MemoryStore {
    /// How many times the channels were written.
    #[cfg(test)]
    pub(crate) async fn save_count(&self) -> usize {
        self.inner.lock().await.saves
    }
}

#[async_trait]
impl ChannelStore for MemoryStore {
    async fn load_channels(&self) -> Result<ChannelMap> {
        Ok(self.inner.lock().await.channels.clone())
    }

    async fn save_channels(&self, channels: &ChannelMap) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.channels = channels.clone();
        inner.saves += 1;

        Ok(())
    }
}

#[async_trait]
impl DeliveryLedger for MemoryStore {
    async fn last_delivery(&self) -> Result<Option<DeliveryState>> {
        Ok(self.inner.lock().await.delivery)
    }

    async fn record_delivery(&self, state: &DeliveryState) -> Result<()> {
        self.inner.lock().await.delivery = Some(*state);

        Ok(())
    }
}
