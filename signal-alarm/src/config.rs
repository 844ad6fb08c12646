//! Daemon configuration.
//!
//! Everything is read from environment variables so the daemon can run as a
//! user service without a config file.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::signal::AntidelaySeconds;

pub const ENV_ANTIDELAY: &str = "SIGNAL_ALARM_ANTIDELAY_SECS";
pub const ENV_SIGNALS: &str = "SIGNAL_ALARM_SIGNALS";
pub const ENV_SOUND: &str = "SIGNAL_ALARM_SOUND";
pub const ENV_API_ADDR: &str = "SIGNAL_ALARM_API_ADDR";
pub const ENV_NOTIFY: &str = "SIGNAL_ALARM_NOTIFY";

pub const DEFAULT_API_PORT: u16 = 7786;

#[derive(Debug, Clone, PartialEq)]
pub struct AlarmConfig {
    /// Lead time applied to every signal.
    pub antidelay: AntidelaySeconds,

    /// JSON file holding the signal list.
    pub signals_path: PathBuf,

    /// Custom alarm sound. The default tone plays when unset.
    pub sound_path: Option<PathBuf>,

    /// Listen address of the control API.
    pub api_addr: SocketAddr,

    /// Send desktop notifications when an alarm fires.
    pub notifications: bool,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            antidelay: AntidelaySeconds::ZERO,
            signals_path: PathBuf::from("signals.json"),
            sound_path: None,
            api_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_API_PORT)),
            notifications: true,
        }
    }
}

impl AlarmConfig {
    /// Build the configuration from the environment, falling back to
    /// defaults for unset variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(secs) = parse_var::<u32>(ENV_ANTIDELAY)? {
            config.antidelay = AntidelaySeconds(secs);
        }
        if let Some(path) = env::var_os(ENV_SIGNALS) {
            config.signals_path = PathBuf::from(path);
        }
        config.sound_path = env::var_os(ENV_SOUND)
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        if let Some(addr) = parse_var::<SocketAddr>(ENV_API_ADDR)? {
            config.api_addr = addr;
        }
        if let Ok(value) = env::var(ENV_NOTIFY) {
            config.notifications = !matches!(value.trim(), "0" | "false" | "off" | "no");
        }

        Ok(config)
    }

    /// Read the custom sound, if one is configured.
    pub async fn load_sound(&self) -> Result<Option<Bytes>> {
        let Some(path) = &self.sound_path else {
            return Ok(None);
        };
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            Error::Config(format!("cannot read sound file {}: {e}", path.display()))
        })?;
        Ok(Some(Bytes::from(bytes)))
    }
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{name}={value:?}: {e}"))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(Error::Config(format!("{name}: {e}"))),
    }
}
