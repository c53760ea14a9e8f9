//! Everything used to handle the application configuration.
//!
//! Create a new configuration as follows:
//! ```no_run
//! use factbot_common::prelude::*;
//! let config = BotConfig::from_env().unwrap();
//! // or when you want to use a file and only overwrite from env
//! let config = BotConfig::from_env_and_file(".config/config.toml").unwrap();
//! let timezone = config.validate().unwrap();
//! ```

use chrono_tz::Tz;
use tracing::{event, Level};

pub use figment::Error;
use figment::{providers::{Env, Format, Toml}, Figment};

const ENV_PREFIX: &str = "FACTBOT_";

/// Plain environment variable that is also accepted for the bot token.
const RAW_TOKEN_VAR: &str = "DISCORD_TOKEN";

pub const DEFAULT_FACT_API_URL: &str = "https://uselessfacts.jsph.pl/api/v2/facts/random";
pub const DEFAULT_IMAGE_SEARCH_URL: &str = "https://api.unsplash.com/search/photos";
pub const DEFAULT_FALLBACK_FACT: &str =
    "Did you know? The first computer bug was an actual bug - a moth stuck in a computer in 1947!";

/// Everything that makes a configuration unusable at startup.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No Discord token configured. Set FACTBOT_DISCORD_TOKEN or DISCORD_TOKEN")]
    MissingToken,
    #[error("'{name}' is not a valid IANA timezone: {reason}")]
    InvalidTimezone { name: String, reason: String },
    #[error("post_hour must be between 0 and 23, got {0}")]
    HourOutOfRange(u32),
    #[error("post_minute must be between 0 and 59, got {0}")]
    MinuteOutOfRange(u32),
    #[error("storage.redis_url is required when the redis storage backend is selected")]
    MissingRedisUrl,
}

/// The application configuration.
///
/// You can use [from_env()](#from_env) or [from_env_and_file(path: &str)](#from_env_and_file) to create a configuration.
///
/// Settings:
/// * `discord_token`: `String`
/// * `command_prefix`: `String`
/// * `timezone`: `String`
/// * `post_hour`: `u32`
/// * `post_minute`: `u32`
/// * `fact_api_url`: `String`
/// * `fallback_fact`: `String`
/// * `fetch_timeout_secs`: `u64`
/// * `storage`: [`StorageConfig`]
/// * `image`: [`ImageConfig`]
/// * `liveness`: [`LivenessConfig`]
#[derive(Debug, serde::Deserialize, serde::Serialize, PartialEq, Eq, Clone)]
pub struct BotConfig {
    /// The Discord API token.
    #[serde(default)]
    pub discord_token: String,
    /// Prefix for the text commands.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// IANA name of the timezone the posting time is expressed in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Local hour (24h) of the daily post.
    #[serde(default = "default_post_hour")]
    pub post_hour: u32,
    /// Local minute of the daily post.
    #[serde(default = "default_post_minute")]
    pub post_minute: u32,
    /// Endpoint returning a random fact as `{ "text": "..." }`.
    #[serde(default = "default_fact_api_url")]
    pub fact_api_url: String,
    /// Posted instead of a fresh fact when the fact API can't be reached.
    #[serde(default = "default_fallback_fact")]
    pub fallback_fact: String,
    /// Timeout for the fact and image requests.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
}

#[derive(Debug, serde::Deserialize, serde::Serialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Flat json files on disk.
    #[default]
    File,
    /// A redis instance.
    Redis,
}

/// Where the channel registry and the delivery state are kept.
#[derive(Debug, serde::Deserialize, serde::Serialize, PartialEq, Eq, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Json file holding the guild to channel mapping.
    pub channels_file: String,
    /// Json file holding the time of the last daily delivery.
    pub state_file: String,
    /// Url of the redis instance, only used by the redis backend.
    pub redis_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            channels_file: "fact_channels.json".into(),
            state_file: "delivery_state.json".into(),
            redis_url: None,
        }
    }
}

/// Illustrative images for the daily post.
#[derive(Debug, serde::Deserialize, serde::Serialize, PartialEq, Eq, Clone)]
#[serde(default)]
pub struct ImageConfig {
    pub enabled: bool,
    /// Unsplash access key. Without it the fallback image is used.
    pub api_key: Option<String>,
    /// Used when the search fails. No image is attached when this is unset.
    pub fallback_url: Option<String>,
    pub search_url: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            fallback_url: None,
            search_url: DEFAULT_IMAGE_SEARCH_URL.into(),
        }
    }
}

/// Keep-alive http endpoint for hosting platforms that probe the process.
#[derive(Debug, serde::Deserialize, serde::Serialize, PartialEq, Eq, Clone)]
#[serde(default)]
pub struct LivenessConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self { enabled: false, bind: "0.0.0.0".into(), port: 8080 }
    }
}

fn default_command_prefix() -> String {
    "!".into()
}

fn default_timezone() -> String {
    "Asia/Kuala_Lumpur".into()
}

fn default_post_hour() -> u32 {
    16
}

fn default_post_minute() -> u32 {
    54
}

fn default_fact_api_url() -> String {
    DEFAULT_FACT_API_URL.into()
}

fn default_fallback_fact() -> String {
    DEFAULT_FALLBACK_FACT.into()
}

fn default_fetch_timeout_secs() -> u64 {
    5
}

impl BotConfig {
    /// Create a configuration just from environment variables.
    ///
    /// This will read all variables prefixed with `FACTBOT_` and try to serialize them into a `BotConfig`.
    /// Nested settings use a double underscore, e.g. `FACTBOT_IMAGE__API_KEY`.
    #[tracing::instrument]
    pub fn from_env() -> Result<Self, Error> {
        load_dotenv();

        env_figment(Figment::new()).extract()
    }

    /// Create a configuration from the environment variables and the indicated file.
    ///
    /// A missing file is not an error, the bot can run from the environment alone.
    /// You can use the environment variables to overwrite certain file values.
    ///
    /// For more info about how the environment variables are read, see [from_env()](#from_env).
    #[tracing::instrument]
    pub fn from_env_and_file(path: &str) -> Result<Self, Error> {
        event!(
            Level::DEBUG,
            "Building configuration from environment and file {}",
            path
        );
        load_dotenv();

        let file_figment = Figment::new()
            .merge(Toml::file(path));

        env_figment(file_figment).extract()
    }

    /// Checks the settings that can't be expressed by the types alone and returns the parsed timezone.
    pub fn validate(&self) -> Result<Tz, ConfigError> {
        if self.discord_token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }

        if self.post_hour > 23 {
            return Err(ConfigError::HourOutOfRange(self.post_hour));
        }

        if self.post_minute > 59 {
            return Err(ConfigError::MinuteOutOfRange(self.post_minute));
        }

        if self.storage.backend == StorageBackend::Redis && self.storage.redis_url.is_none() {
            return Err(ConfigError::MissingRedisUrl);
        }

        self.parsed_timezone()
    }

    /// Parses the configured timezone name.
    pub fn parsed_timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone.parse::<Tz>().map_err(|e| ConfigError::InvalidTimezone {
            name: self.timezone.clone(),
            reason: e.to_string(),
        })
    }
}

fn env_figment(base: Figment) -> Figment {
    base.merge(Env::raw().only(&[RAW_TOKEN_VAR]))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        event!(Level::DEBUG, "Loaded environment from {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    //! Tests are run with the working directory set to the work space, not the directory of the source file.

    use rstest::rstest;

    use super::*;

    const TEST_CONFIG: &str = r#"
            discord_token = "111"
            timezone = "Europe/Brussels"
            post_hour = 9
            post_minute = 30

            [storage]
            channels_file = "data/channels.json"

            [image]
            enabled = true
            fallback_url = "https://example.com/fallback.png"
            "#;

    fn expected_from_file() -> BotConfig {
        BotConfig {
            discord_token: "111".into(),
            command_prefix: "!".into(),
            timezone: "Europe/Brussels".into(),
            post_hour: 9,
            post_minute: 30,
            fact_api_url: DEFAULT_FACT_API_URL.into(),
            fallback_fact: DEFAULT_FALLBACK_FACT.into(),
            fetch_timeout_secs: 5,
            storage: StorageConfig {
                channels_file: "data/channels.json".into(),
                ..Default::default()
            },
            image: ImageConfig {
                enabled: true,
                fallback_url: Some("https://example.com/fallback.png".into()),
                ..Default::default()
            },
            liveness: LivenessConfig::default(),
        }
    }

    #[test]
    fn can_deserialize_toml() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("config.toml", TEST_CONFIG)?;

            let config = BotConfig::from_env_and_file("config.toml")?;
            assert_eq!(expected_from_file(), config);

            Ok(())
        });
    }

    #[test]
    fn env_overwrites_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("config.toml", TEST_CONFIG)?;

            jail.set_env(format!("{}{}", ENV_PREFIX, "DISCORD_TOKEN"), r#""222""#);
            jail.set_env(format!("{}{}", ENV_PREFIX, "IMAGE__API_KEY"), "unsplash-key");

            let mut expected = expected_from_file();
            expected.discord_token = "222".into();
            expected.image.api_key = Some("unsplash-key".into());

            let config = BotConfig::from_env_and_file("config.toml")?;
            assert_eq!(expected, config);

            Ok(())
        });
    }

    #[test]
    fn missing_file_uses_environment_and_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.set_env(RAW_TOKEN_VAR, "plain-token");

            let config = BotConfig::from_env_and_file("does-not-exist.toml")?;

            assert_eq!("plain-token", config.discord_token);
            assert_eq!("Asia/Kuala_Lumpur", config.timezone);
            assert_eq!((16, 54), (config.post_hour, config.post_minute));
            assert_eq!(StorageBackend::File, config.storage.backend);
            assert_eq!("fact_channels.json", config.storage.channels_file);
            assert!(!config.liveness.enabled);

            Ok(())
        });
    }

    #[test]
    fn prefixed_token_wins_over_raw_token() {
        figment::Jail::expect_with(|jail| {
            jail.set_env(RAW_TOKEN_VAR, "plain-token");
            jail.set_env(format!("{}{}", ENV_PREFIX, "DISCORD_TOKEN"), "prefixed-token");

            let config = BotConfig::from_env()?;
            assert_eq!("prefixed-token", config.discord_token);

            Ok(())
        });
    }

    fn valid_config() -> BotConfig {
        let mut config = expected_from_file();
        config.timezone = "Asia/Kuala_Lumpur".into();
        config
    }

    #[test]
    fn validate_returns_timezone() {
        assert_eq!(Ok(chrono_tz::Asia::Kuala_Lumpur), valid_config().validate());
    }

    #[rstest]
    #[case::no_token(|c: &mut BotConfig| c.discord_token = "  ".into(), ConfigError::MissingToken)]
    #[case::hour(|c: &mut BotConfig| c.post_hour = 24, ConfigError::HourOutOfRange(24))]
    #[case::minute(|c: &mut BotConfig| c.post_minute = 60, ConfigError::MinuteOutOfRange(60))]
    #[case::redis(|c: &mut BotConfig| c.storage.backend = StorageBackend::Redis, ConfigError::MissingRedisUrl)]
    fn validate_rejects(#[case] mutate: fn(&mut BotConfig), #[case] expected: ConfigError) {
        let mut config = valid_config();
        mutate(&mut config);

        assert_eq!(Err(expected), config.validate());
    }

    #[test]
    fn validate_rejects_unknown_timezone() {
        let mut config = valid_config();
        config.timezone = "Mars/Olympus_Mons".into();

        let result = config.validate();
        assert!(
            matches!(result, Err(ConfigError::InvalidTimezone { ref name, .. }) if name == "Mars/Olympus_Mons"),
            "Unexpected validation result {result:?}"
        );
    }
}
