use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{event, Level};

use factbot_common::prelude::*;
use factbot_storage::prelude::*;

/// The configured backend, seen through the two storage traits.
#[derive(Clone)]
pub struct StoreHandles {
    pub channels: Arc<dyn ChannelStore>,
    pub ledger: Arc<dyn DeliveryLedger>,
}

impl StoreHandles {
    fn from_store<S>(store: S) -> Self
    where
        S: ChannelStore + DeliveryLedger + 'static,
    {
        let store = Arc::new(store);
        Self { channels: store.clone(), ledger: store }
    }
}

/// Open the backend selected in `config`.
pub fn open_store(config: &StorageConfig) -> Result<StoreHandles> {
    match config.backend {
        StorageBackend::File => {
            event!(Level::DEBUG, "Using channel file {}", config.channels_file);
            Ok(StoreHandles::from_store(JsonFileStore::new(&config.channels_file, &config.state_file)))
        }
        StorageBackend::Redis => {
            event!(Level::DEBUG, "Connecting to KV Store");
            let url = config.redis_url.as_deref().ok_or(ConfigError::MissingRedisUrl)?;
            let client = KVClient::new(url).with_context(|| "Error building redis client")?;
            Ok(StoreHandles::from_store(client))
        }
    }
}
