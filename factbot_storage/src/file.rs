use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{event, Level};

use crate::model::DeliveryState;
use crate::registry::{ChannelMap, ChannelStore, DeliveryLedger};

/// Keeps the registry and the delivery state in two flat json files.
///
/// Files are read whole and rewritten whole. A file that doesn't exist yet reads as empty.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    channels_path: PathBuf,
    state_path: PathBuf,
}

impl JsonFileStore {
    pub fn new(channels_path: impl Into<PathBuf>, state_path: impl Into<PathBuf>) -> Self {
        Self { channels_path: channels_path.into(), state_path: state_path.into() }
    }

    #[cfg(test)]
    fn channels_path(&self) -> &Path {
        &self.channels_path
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            event!(Level::DEBUG, "{} does not exist yet", path.display());
            return Ok(None);
        }
        Err(e) => return Err(e).with_context(|| format!("Error reading {}", path.display())),
    };

    let value = serde_json::from_str(&contents)
        .with_context(|| format!("Error parsing {}", path.display()))?;

    Ok(Some(value))
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await
            .with_context(|| format!("Error creating directory {}", parent.display()))?;
    }

    let json = serde_json::to_string(value)?;
    event!(Level::TRACE, "Writing {} bytes to {}", json.len(), path.display());

    tokio::fs::write(path, json).await
        .with_context(|| format!("Error writing {}", path.display()))
}

#[async_trait]
impl ChannelStore for JsonFileStore {
    async fn load_channels(&self) -> Result<ChannelMap> {
        Ok(read_json(&self.channels_path).await?.unwrap_or_default())
    }

    async fn save_channels(&self, channels: &ChannelMap) -> Result<()> {
        write_json(&self.channels_path, channels).await
    }
}

#[async_trait]
impl DeliveryLedger for JsonFileStore {
    async fn last_delivery(&self) -> Result<Option<DeliveryState>> {
        read_json(&self.state_path).await
    }

    async fn record_delivery(&self, state: &DeliveryState) -> Result<()> {
        write_json(&self.state_path, state).await
    }
}
