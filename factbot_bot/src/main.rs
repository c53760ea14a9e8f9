use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use poise::serenity_prelude::{self as serenity, ActivityData};
use tokio::sync::{Notify, RwLock};
use tracing::*;

use factbot_common::{cli, cli::Commands, prelude::*};
use factbot_storage::prelude::*;

use crate::backend::open_store;
use crate::content::{ContentSources, FactClient};
use crate::discord::commands::{bothelp, checktime, fact, info, ping, removechannel, setchannel};
use crate::discord::courier::DiscordCourier;
use crate::healthchecks::perform_healthchecks;
use crate::job::{job_scheduler, Job, JobArgs, SharedRegistry};
use crate::schedule::Schedule;

mod backend;
mod content;
mod delivery;
mod discord;
mod healthchecks;
mod job;
mod liveness;
mod schedule;

pub struct ServerData {
    pub registry: SharedRegistry,
    pub content: Arc<ContentSources>,
    pub schedule: Schedule,
    pub command_prefix: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = cli::Args::parse();
    let config_file_path = args.config;

    event!(Level::DEBUG, %config_file_path, "Reading configuration");
    // Load application config
    let config = BotConfig::from_env_and_file(&config_file_path)?;

    // Storage setup
    let stores = open_store(&config.storage)?;

    if let Some(Commands::Healthcheck) = args.command {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.fetch_timeout_secs))
            .build()?;
        let facts = FactClient::new(http, config.fact_api_url.as_str());
        let kv_client = match (config.storage.backend, config.storage.redis_url.as_deref()) {
            (StorageBackend::Redis, Some(url)) => Some(KVClient::new(url)?),
            _ => None,
        };
        let checks_output = perform_healthchecks(&facts, stores.channels.as_ref(), kv_client.as_ref()).await?;
        println!("{}", checks_output);
        return Ok(());
    }

    let timezone = config.validate()?;
    let schedule = Schedule::new(timezone, config.post_hour, config.post_minute)
        .with_context(|| "Error computing the trigger time")?;

    let registry: SharedRegistry = Arc::new(RwLock::new(ChannelRegistry::load(stores.channels.clone()).await?));
    let content = Arc::new(ContentSources::from_config(&config)?);

    // Discord setup
    event!(Level::DEBUG, "Discord client setup");

    let ready = Arc::new(Notify::new());
    let server_data = ServerData {
        registry: registry.clone(),
        content: content.clone(),
        schedule,
        command_prefix: config.command_prefix.clone(),
    };
    let session_ready = ready.clone();

    let framework = poise::Framework
        ::builder()
        .options(poise::FrameworkOptions {
            commands: vec![fact(), ping(), checktime(), setchannel(), removechannel(), bothelp(), info()],
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(config.command_prefix.clone()),
                ..Default::default()
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            ctx.set_activity(Some(ActivityData::watching("the clock")));

            info!("Bot is online! Logged in as {}", ready.user.name);
            info!("Bot ID: {}", ready.user.id);
            info!("Connected to {} server(s)", ready.guilds.len());

            Box::pin(async move {
                poise::builtins
                    ::register_globally(ctx, &framework.options().commands).await
                    .with_context(|| "Error registering commands")?;

                info!("Currently posting to {} channel(s)", server_data.registry.read().await.len());
                session_ready.notify_one();

                Ok(server_data)
            })
        })
        .build();

    // Set up background scheduling
    event!(Level::INFO, "Setting up background jobs");

    let jobs: Vec<Box<dyn Job>> = vec![discord::jobs::daily_fact()];

    let token = config.discord_token.as_str();
    let intents =
        serenity::GatewayIntents::non_privileged() | serenity::GatewayIntents::MESSAGE_CONTENT;
    let mut discord_client = serenity::ClientBuilder::new(token, intents).framework(framework).await?;
    let http_client = Arc::new(serenity::HttpBuilder::new(token).build());

    let job_args = JobArgs::new(registry, content, Arc::new(DiscordCourier::new(http_client)));
    let liveness = async {
        if config.liveness.enabled {
            liveness::serve(&config.liveness).await
        } else {
            std::future::pending().await
        }
    };

    tokio::select! {
        discord_result = discord_client.start_autosharded() => {
            if let Err(discord_error) = discord_result {
                event!(Level::ERROR, "{:?}", &discord_error);
            }
        }
        scheduler_result = job_scheduler(schedule, &jobs, job_args, stores.ledger.clone(), ready, Utc::now) => {
            if let Err(scheduler_err) = scheduler_result {
                event!(Level::ERROR, "{:?}", &scheduler_err);
            }
        }
        liveness_result = liveness => {
            if let Err(liveness_err) = liveness_result {
                event!(Level::ERROR, "{:?}", &liveness_err);
            }
        }
    }

    Ok(())
}
