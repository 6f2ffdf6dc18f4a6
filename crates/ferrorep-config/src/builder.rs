//! Configuration builder for flexible configuration loading

use crate::{Config, ConfigError, ConfigResult, ID_PLACEHOLDER};
use config::{ConfigBuilder as ConfigBuilderInner, Environment, File, FileFormat};
use std::path::{Path, PathBuf};

/// Configuration builder for loading configuration from multiple sources
#[derive(Debug)]
pub struct ConfigBuilder {
    inner: ConfigBuilderInner<config::builder::DefaultState>,
    sources: Vec<ConfigSource>,
    env_separator: String,
}

#[derive(Debug, Clone)]
enum ConfigSource {
    File { path: PathBuf, format: FileFormat },
    Defaults,
    Environment { prefix: String },
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            inner: config::Config::builder(),
            sources: Vec::new(),
            env_separator: "__".to_string(),
        }
    }

    /// Add default configuration values
    pub fn add_defaults(mut self) -> Self {
        self.sources.push(ConfigSource::Defaults);
        self
    }

    /// Add a configuration file source; missing files are skipped
    pub fn add_source_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let format = Self::detect_format(&path);
        self.sources.push(ConfigSource::File { path, format });
        self
    }

    /// Add environment variable source with prefix
    pub fn add_env_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.sources.push(ConfigSource::Environment {
            prefix: prefix.into(),
        });
        self
    }

    /// Set environment variable separator (default: "__")
    pub fn env_separator<S: Into<String>>(mut self, separator: S) -> Self {
        self.env_separator = separator.into();
        self
    }

    /// Build the configuration
    pub fn build(mut self) -> ConfigResult<Config> {
        // Defaults are always the base layer
        let defaults_value = serde_yaml::to_value(Config::default())
            .map_err(|e| ConfigError::format(format!("defaults: {e}")))?;
        self.inner = self
            .inner
            .add_source(config::Config::try_from(&defaults_value)?);

        for source in &self.sources {
            match source {
                ConfigSource::File { path, format } => {
                    if path.exists() {
                        self.inner = self
                            .inner
                            .add_source(File::from(path.clone()).format(*format));
                    }
                }
                ConfigSource::Environment { prefix } => {
                    self.inner = self.inner.add_source(
                        Environment::with_prefix(prefix)
                            .separator(&self.env_separator)
                            .list_separator(",")
                            .with_list_parse_key("channels.root_launcher")
                            .with_list_parse_key("channels.broker_launcher")
                            .try_parsing(true),
                    );
                }
                ConfigSource::Defaults => {}
            }
        }

        let config = self.inner.build()?;
        let result: Config = config.try_deserialize()?;

        Self::validate(&result)?;

        Ok(result)
    }

    fn detect_format(path: &Path) -> FileFormat {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("toml") => FileFormat::Toml,
            Some("json") => FileFormat::Json,
            _ => FileFormat::Yaml,
        }
    }

    /// Validate a loaded configuration
    pub fn validate(config: &Config) -> ConfigResult<()> {
        if config.concurrency.privileged_workers.get() == 0
            || config.concurrency.unprivileged_workers.get() == 0
        {
            return Err(ConfigError::validation(
                "Worker counts must be greater than 0",
            ));
        }

        if config.partition.max_depth == 0 || config.partition.max_fan_out == 0 {
            return Err(ConfigError::validation(
                "Partition limits must be greater than 0",
            ));
        }

        let watchdog = &config.watchdog;
        if watchdog.root_interval_ms == 0
            || watchdog.brokered_interval_ms == 0
            || watchdog.unprivileged_interval_ms == 0
        {
            return Err(ConfigError::validation(
                "Watchdog intervals must be greater than 0",
            ));
        }
        if !(1..=100).contains(&watchdog.copy_band_ceiling) {
            return Err(ConfigError::invalid_value(
                "watchdog.copy_band_ceiling",
                "must be between 1 and 100",
            ));
        }
        if !(watchdog.rate_alpha > 0.0 && watchdog.rate_alpha <= 1.0) {
            return Err(ConfigError::invalid_value(
                "watchdog.rate_alpha",
                "must be in (0, 1]",
            ));
        }

        if config.verification.batch_size.get() == 0 {
            return Err(ConfigError::validation(
                "Verification batch size must be greater than 0",
            ));
        }

        if config.progress.status_interval_ms == 0 {
            return Err(ConfigError::validation(
                "Status interval must be greater than 0",
            ));
        }

        if config.channels.root_launcher.is_empty() {
            return Err(ConfigError::missing_required("channels.root_launcher"));
        }
        if matches!(&config.channels.broker_launcher, Some(launcher) if launcher.is_empty()) {
            return Err(ConfigError::invalid_value(
                "channels.broker_launcher",
                "must name a program when set",
            ));
        }
        if config.channels.probe_timeout_ms == 0 {
            return Err(ConfigError::validation(
                "Probe timeout must be greater than 0",
            ));
        }

        if !config.layout.destination_template.contains(ID_PLACEHOLDER) {
            return Err(ConfigError::invalid_value(
                "layout.destination_template",
                "must contain {id}",
            ));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&config.logging.level.as_str()) {
            return Err(ConfigError::validation(
                "Log level must be one of: trace, debug, info, warn, error",
            ));
        }

        Ok(())
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
