use anyhow::{anyhow, Result};
use chrono::Utc;
use poise::serenity_prelude::{self as serenity, Mentionable};
use poise::CreateReply;
use tracing::{event, Level};

use factbot_storage::prelude::Removal;

use crate::discord::courier::parse_channel_id;
use crate::discord::messages::{self, ChannelStatus};
use crate::discord::Context;

/// Get a random fact right now.
#[poise::command(prefix_command, slash_command)]
pub async fn fact(ctx: Context<'_>) -> Result<()> {
    ctx.defer().await?;

    let payload = ctx.data().content.payload().await;
    ctx.send(CreateReply::default().embed(messages::fact_embed(&payload))).await?;

    Ok(())
}

/// Check whether the bot is responsive.
#[poise::command(prefix_command, slash_command)]
pub async fn ping(ctx: Context<'_>) -> Result<()> {
    let latency = ctx.ping().await;
    ctx.say(format!("🏓 Pong! Latency: {}ms", latency.as_millis())).await?;

    Ok(())
}

/// Show the current time and when the daily fact is posted.
#[poise::command(prefix_command, slash_command)]
pub async fn checktime(ctx: Context<'_>) -> Result<()> {
    let embed = messages::time_embed(Utc::now(), &ctx.data().schedule);
    ctx.send(CreateReply::default().embed(embed)).await?;

    Ok(())
}

/// Post the daily fact in this channel (admin only).
#[poise::command(prefix_command, slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn setchannel(ctx: Context<'_>) -> Result<()> {
    let guild_id = ctx.guild_id().ok_or_else(|| anyhow!("Could not determine the guild id"))?;
    let channel_id = ctx.channel_id();

    let previous = ctx.data()
        .registry
        .write().await
        .register(guild_id.to_string(), channel_id.to_string()).await?;

    event!(Level::INFO, %guild_id, %channel_id, ?previous, "Channel set");

    ctx.say(messages::channel_set_reply(&channel_id.mention().to_string(), &ctx.data().schedule)).await?;

    Ok(())
}

/// Stop posting daily facts in this server (admin only).
#[poise::command(prefix_command, slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn removechannel(ctx: Context<'_>) -> Result<()> {
    let guild_id = ctx.guild_id().ok_or_else(|| anyhow!("Could not determine the guild id"))?;

    let removal = ctx.data()
        .registry
        .write().await
        .remove(&guild_id.to_string()).await?;

    match removal {
        Removal::Removed { channel_id } => {
            event!(Level::INFO, %guild_id, %channel_id, "Channel removed");
            ctx.say("✅ Daily facts have been disabled for this server.").await?;
        }
        Removal::NotEnabled => {
            ctx.say("❌ Daily facts are not currently enabled in this server.").await?;
        }
    }

    Ok(())
}

/// Show all available commands.
#[poise::command(prefix_command, slash_command)]
pub async fn bothelp(ctx: Context<'_>) -> Result<()> {
    let data = ctx.data();
    ctx.send(CreateReply::default().embed(messages::help_embed(&data.schedule, &data.command_prefix))).await?;

    Ok(())
}

/// Show how daily facts are set up in this server.
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn info(ctx: Context<'_>) -> Result<()> {
    let guild_id = ctx.guild_id().ok_or_else(|| anyhow!("Could not determine the guild id"))?;
    let guild_name = ctx.guild().map(|g| g.name.clone()).unwrap_or_else(|| "this server".to_string());

    let registered = ctx.data().registry.read().await.get(&guild_id.to_string()).map(str::to_string);
    let status = match registered {
        Some(raw_channel_id) => channel_status(ctx, &raw_channel_id).await,
        None => ChannelStatus::NotEnabled,
    };

    let data = ctx.data();
    let embed = messages::info_embed(&guild_name, &status, &data.schedule, &data.command_prefix);
    ctx.send(CreateReply::default().embed(embed)).await?;

    Ok(())
}

async fn channel_status(ctx: Context<'_>, raw_channel_id: &str) -> ChannelStatus {
    let Ok(channel_id) = parse_channel_id(raw_channel_id) else {
        return ChannelStatus::Missing;
    };

    match channel_id.to_channel(ctx.serenity_context()).await {
        Ok(serenity::Channel::Guild(channel)) => ChannelStatus::Enabled { mention: channel.mention().to_string() },
        Ok(_) => ChannelStatus::Missing,
        Err(error) => {
            event!(Level::DEBUG, %error, "Registered channel {} could not be resolved", raw_channel_id);
            ChannelStatus::Missing
        }
    }
}
