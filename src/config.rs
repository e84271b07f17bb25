use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::{
    SpotterError, publisher::DEFAULT_EVENT_QUEUE_SIZE, telemetry::collector::REFRESH_RATE_MS,
};

const CONFIG_DIR_NAME: &str = "race-spotter";
const CONFIG_FILE_NAME: &str = "config.json";
pub const SPOTTER_RADIUS_M: f32 = 50.;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Delay between frames when replaying
    pub refresh_rate_ms: u64,
    /// Capacity of the outbound event queue
    pub event_queue_size: usize,
    /// Used when samples do not carry a track length
    pub track_length_m: Option<f32>,
    /// Used when samples do not name the reference car
    pub player_car_index: Option<usize>,
    /// Cars closer than this, either side, are reported as nearby
    pub spotter_radius_m: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            refresh_rate_ms: REFRESH_RATE_MS,
            event_queue_size: DEFAULT_EVENT_QUEUE_SIZE,
            track_length_m: None,
            player_car_index: None,
            spotter_radius_m: SPOTTER_RADIUS_M,
        }
    }
}

impl AppConfig {
    pub fn default_path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Reads the config from the user's config directory, if one was saved.
    pub fn from_local_file() -> Option<Self> {
        Self::from_path(&Self::default_path()?)
    }

    pub fn from_path(config_path: &Path) -> Option<Self> {
        if !config_path.exists() {
            return None;
        }
        let file = std::fs::File::open(config_path)
            .map_err(|e| warn!("Could not open config file: {}", e))
            .ok()?;
        serde_json::from_reader(file)
            .map_err(|e| warn!("Could not parse config file: {}", e))
            .ok()
    }

    /// Applies command-line values on top of the stored ones.
    pub fn with_overrides(
        mut self,
        track_length_m: Option<f32>,
        player_car_index: Option<usize>,
        refresh_rate_ms: Option<u64>,
    ) -> Self {
        self.track_length_m = track_length_m.or(self.track_length_m);
        self.player_car_index = player_car_index.or(self.player_car_index);
        self.refresh_rate_ms = refresh_rate_ms.unwrap_or(self.refresh_rate_ms);
        self
    }

    pub fn save(&self) -> Result<(), SpotterError> {
        let config_path = Self::default_path().ok_or(SpotterError::NoConfigDir)?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<(), SpotterError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SpotterError::ConfigIOError { source: e })?;
        }

        let file = std::fs::File::create(config_path)
            .map_err(|e| SpotterError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| SpotterError::ConfigSerializeError { source: e })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let config = AppConfig {
            track_length_m: Some(5891.),
            player_car_index: Some(3),
            ..Default::default()
        };

        config.save_to(&path).unwrap();
        assert_eq!(AppConfig::from_path(&path), Some(config));
    }

    #[test]
    fn test_overrides_then_saved_values_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let stored = AppConfig {
            track_length_m: Some(4000.),
            player_car_index: Some(2),
            ..Default::default()
        };

        let config = stored.with_overrides(None, Some(7), Some(0));
        assert_eq!(config.track_length_m, Some(4000.));
        assert_eq!(config.player_car_index, Some(7));
        assert_eq!(config.refresh_rate_ms, 0);

        config.save_to(&path).unwrap();
        let reloaded = AppConfig::from_path(&path).unwrap();
        assert_eq!(reloaded.player_car_index, Some(7));
        assert_eq!(reloaded.refresh_rate_ms, 0);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, r#"{"refresh_rate_ms": 16}"#).unwrap();

        let config = AppConfig::from_path(&path).unwrap();
        assert_eq!(config.refresh_rate_ms, 16);
        assert_eq!(config.event_queue_size, DEFAULT_EVENT_QUEUE_SIZE);
        assert_eq!(config.spotter_radius_m, SPOTTER_RADIUS_M);
    }

    #[test]
    fn test_missing_or_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        assert_eq!(AppConfig::from_path(&path), None);

        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(AppConfig::from_path(&path), None);
    }
}
