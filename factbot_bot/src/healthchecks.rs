use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use tracing::{event, Level};

use factbot_storage::prelude::*;

use crate::content::FactSource;

#[derive(Serialize, Debug)]
pub struct HealthCheck {
    pub time: i64,
    pub check_type: CheckType,
    pub success: bool,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub enum CheckType {
    FactApi,
    Storage,
    Redis,
}

/// Runs every check and returns them as pretty printed json.
///
/// `kv` is only set when the redis backend is configured, and adds a connection check.
pub async fn perform_healthchecks(
    facts: &dyn FactSource,
    channels: &dyn ChannelStore,
    kv: Option<&KVClient>,
) -> Result<String> {
    let checks = run_checks(facts, channels, kv).await;

    let result = serde_json::to_string_pretty(&checks)
        .with_context(|| "Error serializing health check json")?;
    Ok(result)
}

async fn run_checks(facts: &dyn FactSource, channels: &dyn ChannelStore, kv: Option<&KVClient>) -> Vec<HealthCheck> {
    event!(Level::DEBUG, "Performing health checks");

    let mut checks: Vec<HealthCheck> = Vec::<HealthCheck>::with_capacity(3);

    let fact_check_start = Utc::now();
    event!(Level::TRACE, %fact_check_start, "Starting fact API health check");
    let fact_result = facts.fetch_fact().await;
    let fact_check_end = Utc::now();

    if let Err(error) = &fact_result {
        event!(Level::WARN, %error, "Fact API health check failed");
    }

    checks.push(HealthCheck {
        check_type: CheckType::FactApi,
        time: (fact_check_end - fact_check_start).num_milliseconds(),
        success: fact_result.is_ok(),
    });

    event!(Level::TRACE, "Finished fact API health check");

    let storage_check_start = Utc::now();
    event!(Level::TRACE, %storage_check_start, "Starting storage health check");
    let storage_result = channels.load_channels().await;
    let storage_check_end = Utc::now();

    if let Err(error) = &storage_result {
        event!(Level::WARN, "Storage health check failed: {:?}", error);
    }

    event!(Level::TRACE, %storage_check_end, "Finished storage health check");
    checks.push(HealthCheck {
        success: storage_result.is_ok(),
        check_type: CheckType::Storage,
        time: (storage_check_end - storage_check_start).num_milliseconds(),
    });

    if let Some(kv_client) = kv {
        let kv_check_start = Utc::now();
        event!(Level::TRACE, %kv_check_start, "Starting KV health check");
        let conn_check = kv_client.connection_check().await;
        let kv_check_end = Utc::now();

        event!(Level::TRACE, %kv_check_end, "Finished KV health check");
        checks.push(HealthCheck {
            success: conn_check.is_ok(),
            check_type: CheckType::Redis,
            time: (kv_check_end - kv_check_start).num_milliseconds(),
        });
    }

    checks
}
