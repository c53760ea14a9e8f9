use crate::ServerData;

pub type Context<'a> = poise::Context<'a, ServerData, anyhow::Error>;

pub mod commands;
pub mod courier;
pub mod jobs;
pub mod messages;
