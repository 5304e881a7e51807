use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CLMS_API: &str = "https://land.copernicus.eu/api/";
pub const DEFAULT_ZENODO_API: &str = "https://zenodo.org/api/";
pub const DEFAULT_USER_AGENT: &str = "Reclaimer/0.1";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Settings for one invocation. Every key is optional in the TOML file.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub clms: ClmsSettings,
    pub zenodo: ZenodoSettings,
    pub http: HttpSettings,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ClmsSettings {
    pub api_url: String,
    pub poll_interval_secs: u64,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ZenodoSettings {
    pub api_url: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agent: String,
}

impl Default for ClmsSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_CLMS_API.to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

impl Default for ZenodoSettings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_ZENODO_API.to_string(),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ClmsSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Settings {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let settings: Self =
            toml::from_str(&content).map_err(|e| Error::Config(format!("invalid settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads `path` when given, otherwise falls back to the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::read(path),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.clms.poll_interval_secs == 0 {
            return Err(Error::Config(
                "clms.poll_interval_secs must be at least 1".to_string(),
            ));
        }
        for (key, value) in [
            ("clms.api_url", &self.clms.api_url),
            ("zenodo.api_url", &self.zenodo.api_url),
        ] {
            if !value.ends_with('/') {
                return Err(Error::Config(format!("{key} must end with '/': {value}")));
            }
        }
        Ok(())
    }
}
