use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use parlor_chess::engine::{EngineConfig, DEFAULT_STRENGTH};
use parlor_chess::PromotionPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "parlor-cli-config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid config in {path}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

fn default_strength() -> u16 {
    DEFAULT_STRENGTH
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParlorCliConfig {
    #[serde(default)]
    pub engines: BTreeMap<String, EngineConfig>,
    #[serde(default)]
    pub promotion: PromotionPolicy,
    #[serde(default = "default_strength")]
    pub strength: u16,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub site: Option<String>,
}

impl Default for ParlorCliConfig {
    fn default() -> Self {
        Self {
            engines: BTreeMap::new(),
            promotion: PromotionPolicy::default(),
            strength: DEFAULT_STRENGTH,
            event: None,
            site: None,
        }
    }
}

impl ParlorCliConfig {
    /// Reads the config file. A missing file at the default location is not an
    /// error; the defaults are used instead.
    pub fn load(path: &Path, explicit: bool) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound && !explicit => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read { path: path.display().to_string(), source });
            }
        };
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}
