//! Tunable constants, loaded once at startup from a JSON file.
//!
//! Every section and every field falls back to its default value, so a partial file only
//! overrides what it names.

use std::{fs, io, path::Path};

use bevy::prelude::*;
use serde::Deserialize;
use thiserror::Error;

use super::{
    first_person_controller::PlayerParams,
    physics::rigid_body::CubeParams,
    portal::{surface::PortalConfig, traversal::TraversalConfig},
};

pub const CONFIG_PATH: &str = "assets/config/lost_portal.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Deserialize, Resource)]
#[serde(default)]
pub struct GameConfig {
    pub portal: PortalConfig,
    pub traversal: TraversalConfig,
    pub cube: CubeParams,
    pub player: PlayerParams,
}

impl GameConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }
}

#[derive(Debug)]
pub struct ConfigPlugin;

impl Plugin for ConfigPlugin {
    fn build(&self, app: &mut App) {
        let config = match GameConfig::load(CONFIG_PATH) {
            Ok(config) => {
                info!("Loaded configuration from {}", CONFIG_PATH);
                config
            }
            Err(ConfigError::Io { path, source }) if source.kind() == io::ErrorKind::NotFound => {
                info!("No configuration at {}, using defaults", path);
                GameConfig::default()
            }
            Err(e) => {
                warn!("Ignoring configuration: {}", e);
                GameConfig::default()
            }
        };
        app.insert_resource(config);
    }
}
