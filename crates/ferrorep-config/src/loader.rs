//! Configuration loader utilities

use crate::{Config, ConfigBuilder, ConfigError, ConfigResult};
use std::path::{Path, PathBuf};

/// Prefix of environment overrides, e.g. `FERROREP__WATCHDOG__ROOT_INTERVAL_MS`
pub const ENV_PREFIX: &str = "FERROREP";

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "FERROREP_CONFIG";

/// Configuration loader with common loading patterns
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from default locations
    ///
    /// `FERROREP_CONFIG` takes precedence over the search path when set.
    pub fn load_default() -> ConfigResult<Config> {
        if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(&explicit);
            if !path.exists() {
                return Err(ConfigError::environment(format!(
                    "{} points to missing file '{}'",
                    CONFIG_PATH_ENV, explicit
                )));
            }
            return Self::load_from_file(path);
        }

        let mut builder = ConfigBuilder::new().add_defaults();

        if let Some(path) = Self::config_exists() {
            builder = builder.add_source_file(&path);
        }

        builder.add_env_prefix(ENV_PREFIX).build()
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }

        ConfigBuilder::new()
            .add_defaults()
            .add_source_file(path)
            .add_env_prefix(ENV_PREFIX)
            .build()
    }

    /// Load configuration from multiple files (later files override earlier ones)
    pub fn load_from_files<P: AsRef<Path>>(paths: &[P]) -> ConfigResult<Config> {
        let mut builder = ConfigBuilder::new().add_defaults();

        for path in paths {
            builder = builder.add_source_file(path);
        }

        builder.add_env_prefix(ENV_PREFIX).build()
    }

    /// Save configuration to a file, format chosen by extension
    pub fn save_to_file<P: AsRef<Path>>(config: &Config, path: P) -> ConfigResult<()> {
        let path = path.as_ref();

        let content = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::to_string_pretty(config)?,
            Some("json") => serde_json::to_string_pretty(config)?,
            _ => serde_yaml::to_string(config)?,
        };

        std::fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    /// Generate a default configuration file
    pub fn generate_default_config<P: AsRef<Path>>(path: P) -> ConfigResult<()> {
        Self::save_to_file(&Config::default(), path)
    }

    /// Default configuration file paths in order of preference
    fn default_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("ferrorep.yaml"),
            PathBuf::from("ferrorep.yml"),
            PathBuf::from("ferrorep.toml"),
            PathBuf::from(".ferrorep.yaml"),
            PathBuf::from(".ferrorep.yml"),
            PathBuf::from(".ferrorep.toml"),
        ];

        #[cfg(unix)]
        {
            paths.push(PathBuf::from("/etc/ferrorep/config.yaml"));
            paths.push(PathBuf::from("/etc/ferrorep/config.yml"));
            paths.push(PathBuf::from("/etc/ferrorep/config.toml"));
        }

        paths
    }

    /// First configuration file found in the default locations
    pub fn config_exists() -> Option<PathBuf> {
        Self::default_config_paths()
            .into_iter()
            .find(|path| path.exists())
    }
}
