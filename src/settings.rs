use log::{LevelFilter, debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::pdf::{EngineConfig, InvalidZoomRange, SessionConfig, ZoomRange};
use crate::pdf::{DEFAULT_CACHE_SIZE, DEFAULT_RENDER_WORKERS};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pdfview";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse settings file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to encode settings: {0}")]
    Encode(#[source] serde_yaml::Error),

    #[error(transparent)]
    Invalid(#[from] InvalidZoomRange),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub zoom: ZoomRange,

    #[serde(default = "default_render_workers")]
    pub render_workers: usize,

    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    #[serde(default)]
    pub engine: EngineConfig,

    /// One of off, error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Relative file locators resolve against this directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<PathBuf>,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_render_workers() -> usize {
    DEFAULT_RENDER_WORKERS
}

fn default_cache_size() -> usize {
    DEFAULT_CACHE_SIZE
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            zoom: ZoomRange::default(),
            render_workers: default_render_workers(),
            cache_size: default_cache_size(),
            engine: EngineConfig::default(),
            log_level: default_log_level(),
            source_root: None,
        }
    }
}

/// `<config dir>/pdfview/config.yaml`, if the platform has a config dir
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

impl Settings {
    /// Load settings from `path`, or from the default location
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        match default_config_path() {
            Some(path) if path.exists() => Self::load_from_path(&path),
            Some(path) => {
                debug!("Settings file not found at {path:?}, using defaults");
                Ok(Self::default())
            }
            None => {
                warn!("Could not determine config directory, using default settings");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut settings: Self =
            serde_yaml::from_str(&content).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("Loaded settings from {path:?}");

        if settings.version < CURRENT_VERSION {
            migrate_settings(&mut settings);
        }
        Ok(settings)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), SettingsError> {
        let io_error = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(io_error)?;
            }
        }

        let content = serde_yaml::to_string(self).map_err(SettingsError::Encode)?;
        fs::write(path, content).map_err(io_error)?;
        debug!("Saved settings to {path:?}");
        Ok(())
    }

    /// Validated session configuration
    pub fn session_config(&self) -> Result<SessionConfig, SettingsError> {
        let config = SessionConfig {
            zoom: self.zoom,
            render_workers: self.render_workers,
            cache_size: self.cache_size,
            engine: self.engine.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parsed `log_level`; unknown values fall back to `Info`
    #[must_use]
    pub fn log_level_filter(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or_else(|_| {
            warn!("Unknown log level {:?}, using info", self.log_level);
            LevelFilter::Info
        })
    }
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );
    settings.version = CURRENT_VERSION;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_session_defaults() {
        let config = Settings::default().session_config().unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "render_workers: 4\nzoom:\n  max: 5.0\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.render_workers, 4);
        assert_eq!(settings.zoom.max, 5.0);
        assert_eq!(settings.zoom.min, 0.5);
        assert_eq!(settings.cache_size, DEFAULT_CACHE_SIZE);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let settings = Settings {
            cache_size: 3,
            source_root: Some(PathBuf::from("/srv/docs")),
            log_level: "debug".to_string(),
            ..Settings::default()
        };

        settings.save_to_path(&path).unwrap();
        let loaded = Settings::load_from_path(&path).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.log_level_filter(), LevelFilter::Debug);
    }

    #[test]
    fn old_version_is_migrated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "version: 0\n").unwrap();
        let settings = Settings::load_from_path(&path).unwrap();
        assert_eq!(settings.version, CURRENT_VERSION);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = Settings::load(Some(&dir.path().join("absent.yaml"))).unwrap_err();
        assert!(matches!(err, SettingsError::Io { .. }));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "zoom: [1, 2").unwrap();
        let err = Settings::load_from_path(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
    }

    #[test]
    fn invalid_zoom_range_is_rejected() {
        let settings = Settings {
            zoom: ZoomRange {
                step: 0.0,
                ..ZoomRange::default()
            },
            ..Settings::default()
        };
        assert!(matches!(
            settings.session_config(),
            Err(SettingsError::Invalid(_))
        ));
    }

    #[test]
    fn unknown_log_level_falls_back_to_info() {
        let settings = Settings {
            log_level: "chatty".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.log_level_filter(), LevelFilter::Info);
    }
}
