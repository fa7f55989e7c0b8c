mod serde_duration;

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};

/// Environment variables with this prefix override file settings;
/// `__` separates nesting levels, e.g. `ROWFLOW_SINK__BATCH_SIZE=500`.
pub const ENV_PREFIX: &str = "ROWFLOW_";

/// Engine-level settings shared by every pipeline host.
#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub engine: EngineConfig,
    pub sink: SinkConfig,
}

impl Config {
    /// Builds the provider stack: `config_file` (if present), then environment.
    pub fn figment(config_file: impl AsRef<std::path::Path>) -> Figment {
        Figment::new()
            .merge(Toml::file(config_file.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_file(config_file: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let config: Config = Self::figment(config_file).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.engine.channel_capacity == 0 {
            anyhow::bail!("engine.channel_capacity must be greater than zero");
        }
        if self.sink.batch_size == 0 {
            anyhow::bail!("sink.batch_size must be greater than zero");
        }
        if self.sink.max_concurrent_flushes == 0 {
            anyhow::bail!("sink.max_concurrent_flushes must be greater than zero");
        }
        Ok(())
    }
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_owned(),
        }
    }
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bound of every inter-stage channel.
    #[serde(rename = "channel-capacity", alias = "channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            channel_capacity: 64,
        }
    }
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    #[serde(rename = "batch-size", alias = "batch_size")]
    pub batch_size: usize,
    #[serde(rename = "max-concurrent-flushes", alias = "max_concurrent_flushes")]
    pub max_concurrent_flushes: usize,
    #[serde(
        rename = "flush-timeout",
        alias = "flush_timeout",
        deserialize_with = "serde_duration::deserialize_option"
    )]
    pub flush_timeout: Option<std::time::Duration>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            batch_size: 1000,
            max_concurrent_flushes: 4,
            flush_timeout: None,
        }
    }
}
