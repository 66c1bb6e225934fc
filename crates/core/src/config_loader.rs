use crate::config::AppConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};

/// Prefix of environment overrides, e.g. `CAPFLOW_FILTER__TURNOVER_MULTIPLE`.
pub const ENV_PREFIX: &str = "CAPFLOW_";

pub struct ConfigLoader;

impl ConfigLoader {
    fn base() -> Figment {
        Figment::new().merge(Toml::file("config/Config.toml"))
    }

    fn finish(figment: Figment) -> Result<AppConfig> {
        let config: AppConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;

        Ok(config)
    }

    /// Loads configuration by merging `config/Config.toml` and `CAPFLOW_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be parsed or fails validation.
    pub fn load() -> Result<AppConfig> {
        Self::finish(Self::base())
    }

    /// Loads configuration with `config/Config.{profile}.toml` layered over the base file.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be parsed or fails validation.
    pub fn load_with_profile(profile: &str) -> Result<AppConfig> {
        Self::finish(Self::base().merge(Toml::file(format!("config/Config.{profile}.toml"))))
    }
}
