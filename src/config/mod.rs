mod settings;

use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use tracing::debug;

use crate::config::settings::PartialSettings;

pub use settings::{
    BrokerSettings, ConsumeSettings, LoggingSettings, PublishSettings, Settings,
};

/// Prefix of the environment variables read by `load_config`, e.g.
/// `AMQP_JSON_BROKER__URL`.
pub const ENV_PREFIX: &str = "AMQP_JSON";

/// Loads the configuration from a file and environment variables.
///
/// The file is `path` when given, otherwise the optional `config/default`
/// in the working directory. Variables from a `.env` file are loaded into the
/// environment first. Values that are missing everywhere fall back to
/// `Settings::default()`.
pub fn load_config(path: Option<&Path>) -> Result<Settings, ConfigError> {
    if let Ok(env_file) = dotenvy::dotenv() {
        debug!(path = %env_file.display(), "Loaded .env file");
    }

    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name("config/default").required(false),
    };

    let config = Config::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let partial: PartialSettings = config.try_deserialize()?;
    Ok(partial.merge_onto(Settings::default()))
}
