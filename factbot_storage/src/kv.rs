use std::fmt::Debug;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, ConnectionLike};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::*;

use crate::model::DeliveryState;
use crate::registry::{ChannelMap, ChannelStore, DeliveryLedger};

pub type KVIdentity = String;

/// A generic KV store client.
///
/// ## Creation
/// Create a new client by calling `KVClient::new` with a redis url.
#[derive(Debug, Clone)]
pub struct KVClient {
    client: Client,
}

/// Marks an object as identifyable to the KV Client.
pub trait Identifiable {
    fn kv_key(&self) -> KVIdentity;
}

/// The whole channel registry, stored as a single json document.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(transparent)]
struct ChannelRecord(ChannelMap);

impl Identifiable for ChannelRecord {
    fn kv_key(&self) -> KVIdentity {
        "factbot_channels".to_string()
    }
}

impl KVClient {
    /// Create a new `KVClient` for the redis instance at `redis_url`.
    #[instrument(level = "trace")]
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;

        Ok(Self { client })
    }

    /// Save complex objects as json in redis.
    #[instrument(level = "trace", name = "storage.kv_client", skip(self, record), fields(save_key = field::Empty))]
    pub async fn save_json<T>(&self, record: &T) -> Result<()>
    where
        T: Identifiable + Serialize + Send + Sync + Debug,
    {
        event!(Level::TRACE, "Saving a record to the KV store in json mode");

        let json = serde_json::to_string(record)?;

        let con = &mut self.client.get_multiplexed_async_connection().await?;

        let save_key = record.kv_key();
        Span::current().record("save_key", field::debug(&save_key));

        match con.set(&save_key, json).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(?e, "Error saving value to kv store");

                Err(anyhow!(e))
            }
        }
    }

    /// Retrieve a complex record for the given key.
    #[instrument(level = "trace", name = "storage.kv_client", skip(self, record), fields(object_key = field::Empty))]
    pub async fn get_json<T>(&self, record: &T) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send + Sync + Debug + Identifiable,
    {
        let key = record.kv_key();
        Span::current().record("object_key", &key);

        event!(Level::TRACE, "Retrieving a record from the kv store");

        let con = &mut self.client.get_multiplexed_async_connection().await?;

        if !con.exists(&key).await? {
            return Ok(None);
        }

        let json: String = con.get(key).await?;

        let record = serde_json::from_str(json.as_str())?;

        Ok(Some(record))
    }

    /// Perform a connection check.
    /// If we can obtain an open connection in 15 seconds, we return `Ok()`.
    pub async fn connection_check(&self) -> Result<()> {
        let connection_result = self.client.get_connection_with_timeout(Duration::from_secs(15));

        match connection_result {
            Ok(conn) => {
                if conn.is_open() {
                    Ok(())
                } else {
                    Err(anyhow!("Could not open connection"))
                }
            },
            Err(e) => Err(anyhow!(e))
        }
    }
}

#[async_trait]
impl ChannelStore for KVClient {
    async fn load_channels(&self) -> Result<ChannelMap> {
        let record = self.get_json(&ChannelRecord::default()).await?;

        Ok(record.map(|r| r.0).unwrap_or_default())
    }

    async fn save_channels(&self, channels: &ChannelMap) -> Result<()> {
        self.save_json(&ChannelRecord(channels.clone())).await
    }
}

#[async_trait]
impl DeliveryLedger for KVClient {
    async fn last_delivery(&self) -> Result<Option<DeliveryState>> {
        self.get_json(&DeliveryState::default()).await
    }

    async fn record_delivery(&self, state: &DeliveryState) -> Result<()> {
        self.save_json(state).await
    }
}
