use clap::{arg, command, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to config.toml
    #[arg(short, long, value_hint = clap::ValueHint::FilePath, env, default_value(".config/config.toml"))]
    pub config: String,
    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialOrd, PartialEq)]
pub enum Commands {
    /// Check the fact API and the channel store, print the results as json and exit.
    Healthcheck,
}
