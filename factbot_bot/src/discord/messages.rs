//! The messages and embeds the bot posts.

use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;

use crate::content::Payload;
use crate::schedule::Schedule;

pub const FACT_TITLE: &str = "📚 Fact of the Day";

/// The embed for one fact, with its picture when there is one.
pub fn fact_embed(payload: &Payload) -> serenity::CreateEmbed {
    let embed = serenity::CreateEmbed::new()
        .title(FACT_TITLE)
        .description(&payload.fact.text)
        .colour(serenity::Colour::BLUE);

    match &payload.image_url {
        Some(url) => embed.image(url),
        None => embed,
    }
}

pub fn fact_message(payload: &Payload) -> serenity::CreateMessage {
    serenity::CreateMessage::new().embed(fact_embed(payload))
}

/// Whether daily facts are set up in a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Registered and the channel still exists.
    Enabled { mention: String },
    /// Registered, but the channel is gone or can't be seen.
    Missing,
    NotEnabled,
}

/// Field name and value describing `status`.
pub fn status_field(status: &ChannelStatus, prefix: &str) -> (String, String) {
    match status {
        ChannelStatus::Enabled { mention } => {
            ("✅ Daily Facts Status".into(), format!("**Enabled** in {mention}"))
        }
        ChannelStatus::Missing => ("⚠️ Daily Facts Status".into(), "Enabled but channel not found".into()),
        ChannelStatus::NotEnabled => (
            "❌ Daily Facts Status".into(),
            format!("Not enabled - Ask an admin to use `{prefix}setchannel`"),
        ),
    }
}

pub fn info_embed(guild_name: &str, status: &ChannelStatus, schedule: &Schedule, prefix: &str) -> serenity::CreateEmbed {
    let (status_name, status_value) = status_field(status, prefix);

    serenity::CreateEmbed::new()
        .title("📚 Bot Setup Info")
        .description(format!("Information for **{guild_name}**"))
        .colour(serenity::Colour::DARK_GREEN)
        .field(status_name, status_value, false)
        .field("⏰ Posting Time", format!("{} daily (if enabled)", schedule.local_label()), false)
        .footer(serenity::CreateEmbedFooter::new(format!("Need help? Use {prefix}bothelp")))
}

/// The user commands, one per line.
pub fn user_commands(prefix: &str) -> String {
    [
        ("fact", "Get a random fact right now"),
        ("ping", "Check if bot is online"),
        ("checktime", "Check current bot time"),
        ("bothelp", "Show this help message"),
        ("info", "Show bot setup info"),
    ]
    .iter()
    .map(|(name, help)| format!("`{prefix}{name}` - {help}"))
    .collect::<Vec<_>>()
    .join("\n")
}

pub fn admin_commands(prefix: &str) -> String {
    format!(
        "`{prefix}setchannel` - Enable daily facts in this channel\n`{prefix}removechannel` - Disable daily facts in this server"
    )
}

pub fn help_embed(schedule: &Schedule, prefix: &str) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title("📚 Fact of the Day Bot - Help")
        .description("A bot that sends interesting random facts every day!")
        .colour(serenity::Colour::BLUE)
        .field("📖 User Commands", user_commands(prefix), false)
        .field("⚙️ Admin Commands", admin_commands(prefix), false)
        .field(
            "⏰ Automatic Feature",
            format!("Daily facts are posted at **{}** in channels set by server admins", schedule.local_label()),
            false,
        )
        .footer(serenity::CreateEmbedFooter::new(format!("Use {prefix}setchannel to get started!")))
}

pub fn time_embed(now: DateTime<Utc>, schedule: &Schedule) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title("🕐 Bot Time Information")
        .colour(serenity::Colour::BLUE)
        .field("Current UTC Time", now.format("%Y-%m-%d %H:%M:%S UTC").to_string(), false)
        .field(
            format!("Current {} Time", schedule.timezone.name()),
            schedule.local_now(now).format("%Y-%m-%d %H:%M:%S %Z").to_string(),
            false,
        )
        .field("📅 Scheduled Post Time", scheduled_description(schedule), false)
}

/// e.g. `**04:54 PM Asia/Kuala_Lumpur (UTC+08:00)**\n(08:54 UTC)\nRuns daily automatically`
pub fn scheduled_description(schedule: &Schedule) -> String {
    format!("**{}**\n({})\nRuns daily automatically", schedule.local_label(), schedule.trigger)
}

pub fn channel_set_reply(mention: &str, schedule: &Schedule) -> String {
    format!("✅ Daily facts will now be posted in {mention} at {} every day!", schedule.local_label())
}
