use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;
use url::Url;

use crate::error::{HaircutError, Result};
use crate::fetch::DEFAULT_LISTING_URL;

/// Runtime settings. Every field has a default, so a YAML file only needs the
/// keys it wants to change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listing_url: String,
    pub cache_dir: PathBuf,
    pub page_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listing_url: DEFAULT_LISTING_URL.to_string(),
            cache_dir: PathBuf::from("haircuts-cache"),
            page_timeout_secs: 30,
            download_timeout_secs: 60,
            user_agent: concat!(
                "Mozilla/5.0 (haircuts/",
                env!("CARGO_PKG_VERSION"),
                "; DCV haircut browser)"
            )
            .to_string(),
        }
    }
}

impl Config {
    /// Load from a YAML file, or use defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .map_err(|e| HaircutError::Config(format!("reading {}: {e}", path.display())))?;
        let config = Self::from_yaml(&text)
            .map_err(|e| HaircutError::Config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(text).map_err(|e| HaircutError::Config(e.to_string()))?;
        config.listing_url()?;
        if config.page_timeout_secs == 0 || config.download_timeout_secs == 0 {
            return Err(HaircutError::Config("timeouts must be positive".into()));
        }
        Ok(config)
    }

    pub fn listing_url(&self) -> Result<Url> {
        Url::parse(&self.listing_url)
            .map_err(|e| HaircutError::Config(format!("listing_url `{}`: {e}", self.listing_url)))
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}
