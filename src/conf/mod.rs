//! Client configuration.
//!
//! Values are applied from the following sources, in order:
//! - default values;
//! - a TOML file, named by the [`APP_CONF_PATH_ENV_VAR_NAME`] environment
//!   variable or the [`APP_CONF_PATH_CMD_ARG_NAME`] command line argument;
//! - environment variables prefixed with `MEDEA_SFU_CLIENT_`, using `__` as
//!   a section separator (e.g. `MEDEA_SFU_CLIENT_POLLING__INTERVAL=2s`).

pub mod log;
pub mod polling;
pub mod signaling;

use std::{collections::HashMap, env};

use config::{
    Config, ConfigError, Environment, File, FileFormat, Source, Value,
};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

#[doc(inline)]
pub use self::{log::Log, polling::Polling, signaling::Signaling};

/// CLI argument that is responsible for holding application configuration
/// file path.
pub static APP_CONF_PATH_CMD_ARG_NAME: &str = "--conf";

/// Environment variable that is responsible for holding application
/// configuration file path.
pub static APP_CONF_PATH_ENV_VAR_NAME: &str = "MEDEA_SFU_CLIENT_CONF";

/// Prefix of environment variables overriding configuration values.
static APP_CONF_ENV_PREFIX: &str = "MEDEA_SFU_CLIENT";

/// Holds all the client configuration settings.
#[derive(Clone, Debug, Deserialize, Serialize, SmartDefault)]
#[serde(default)]
pub struct Conf {
    /// Signaling service settings.
    pub signaling: Signaling,

    /// Session snapshot polling settings.
    pub polling: Polling,

    /// Logging settings.
    pub log: Log,
}

impl Conf {
    /// Creates new [`Conf`] applying values from all the sources.
    ///
    /// # Errors
    ///
    /// If any of the sources is unreadable or contains invalid values.
    pub fn parse() -> Result<Self, ConfigError> {
        let mut cfg = Config::new();

        cfg.merge(Self::default())?;

        let env_path = env::var(APP_CONF_PATH_ENV_VAR_NAME);
        if let Some(path) = get_conf_file_name(env_path, env::args()) {
            cfg.merge(File::with_name(&path))?;
        }

        cfg.merge(
            Environment::with_prefix(APP_CONF_ENV_PREFIX).separator("__"),
        )?;

        cfg.try_into()
    }
}

impl Source for Conf {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<HashMap<String, Value>, ConfigError> {
        let serialized = toml::to_string(self)
            .map_err(|e| ConfigError::Foreign(Box::new(e)))?;
        File::from_str(&serialized, FileFormat::Toml).collect()
    }
}

/// Returns the name of the configuration file, if defined.
///
/// The environment variable takes precedence over the command line argument.
fn get_conf_file_name<T>(
    env_var: Result<String, env::VarError>,
    cmd_args: T,
) -> Option<String>
where
    T: Iterator<Item = String>,
{
    if let Ok(path) = env_var {
        return Some(path);
    }
    let mut args = cmd_args.skip_while(|a| a != APP_CONF_PATH_CMD_ARG_NAME);
    args.next().and_then(|_| args.next())
}

/// Sets the provided environment variables, parses a [`Conf`] and removes the
/// variables back.
#[cfg(test)]
#[macro_export]
macro_rules! overridden_by_env_conf {
    ($($env:expr => $value:expr),+ $(,)?) => {{
        $(::std::env::set_var($env, $value);)+
        let conf = $crate::conf::Conf::parse().unwrap();
        $(::std::env::remove_var($env);)+
        conf
    }};
}
