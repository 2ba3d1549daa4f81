use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::controller::{state_store::OverlapPolicy, stepper::CombinedStepFormula};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found at {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to read configuration file: {source}")]
    ReadError { source: std::io::Error },

    #[error("Failed to parse configuration: {source}")]
    ParseError { source: toml::de::Error },

    #[error("Failed to serialize configuration: {source}")]
    SerializeError { source: toml::ser::Error },

    #[error("Failed to write configuration file: {source}")]
    WriteError { source: std::io::Error },

    #[error("Configuration validation failed: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct AxisConfig {
    pub min: f64,
    pub max: f64,
    pub speed: f64,
    pub move_threshold: f64,
}

impl AxisConfig {
    fn pan() -> Self {
        Self {
            min: -1.0,
            max: 1.0,
            speed: 0.1,
            move_threshold: 0.001,
        }
    }

    fn tilt() -> Self {
        Self {
            min: -0.5,
            max: 0.5,
            speed: 0.1,
            move_threshold: 0.001,
        }
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let fail = |message: String| Err(ConfigError::ValidationError { message });

        if !(self.min < self.max) {
            return fail(format!("{}.min must be below {}.max", name, name));
        }
        if !(self.move_threshold > 0.0) {
            return fail(format!("{}.move_threshold must be positive", name));
        }
        if !self.speed.is_finite() || self.speed < 0.0 {
            return fail(format!("{}.speed must be finite and non-negative", name));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub socket_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/tmp/ptu_simulator.sock"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set.
    pub level: String,
    /// Daily rolling log files are written here when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PtuConfig {
    /// Control loop frequency, Hz.
    pub internal_rate: f64,
    /// State publishing frequency, Hz.
    pub publish_rate: f64,
    pub min_step: f64,
    pub overlap_policy: OverlapPolicy,
    pub combined_step: CombinedStepFormula,
    pub validate_targets: bool,
    /// Zero disables the limit.
    pub time_limit_secs: f64,

    pub pan: AxisConfig,
    pub tilt: AxisConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

impl Default for PtuConfig {
    fn default() -> Self {
        Self {
            internal_rate: 100.0,
            publish_rate: 10.0,
            min_step: 0.1,
            overlap_policy: OverlapPolicy::default(),
            combined_step: CombinedStepFormula::default(),
            validate_targets: true,
            time_limit_secs: 60.0,
            pan: AxisConfig::pan(),
            tilt: AxisConfig::tilt(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl PtuConfig {
    pub fn publish_period(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.publish_rate).unwrap_or(Duration::MAX)
    }

    pub fn time_limit(&self) -> Option<Duration> {
        (self.time_limit_secs > 0.0)
            .then(|| Duration::try_from_secs_f64(self.time_limit_secs).unwrap_or(Duration::MAX))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |message: &str| {
            Err(ConfigError::ValidationError {
                message: message.to_string(),
            })
        };

        if !(self.internal_rate > 0.0) || !self.internal_rate.is_finite() {
            return fail("internal_rate must be positive");
        }
        if !(self.publish_rate > 0.0) || !self.publish_rate.is_finite() {
            return fail("publish_rate must be positive");
        }
        if !(self.min_step > 0.0) {
            return fail("min_step must be positive");
        }
        if !(self.time_limit_secs >= 0.0) || !self.time_limit_secs.is_finite() {
            return fail("time_limit_secs must be zero or positive");
        }

        // Periods must fit in a Duration.
        if Duration::try_from_secs_f64(1.0 / self.internal_rate).is_err() {
            return fail("internal_rate is too small");
        }
        if Duration::try_from_secs_f64(1.0 / self.publish_rate).is_err() {
            return fail("publish_rate is too small");
        }
        if Duration::try_from_secs_f64(self.time_limit_secs).is_err() {
            return fail("time_limit_secs is too large");
        }

        self.pan.validate("pan")?;
        self.tilt.validate("tilt")
    }
}

#[derive(Debug)]
pub struct ConfigOptions {
    pub config_path: PathBuf,
    pub create_if_missing: bool,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        Self {
            config_path: Self::default_config_path(),
            create_if_missing: true,
        }
    }
}

impl ConfigOptions {
    pub fn default_config_path() -> PathBuf {
        std::env::var("CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("default_config.toml"))
    }

    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }
}

#[derive(Debug)]
pub struct ConfigManager {
    options: ConfigOptions,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            options: ConfigOptions::default(),
        }
    }

    pub fn with_options(options: ConfigOptions) -> Self {
        Self { options }
    }

    pub fn config_path(&self) -> &Path {
        &self.options.config_path
    }

    pub fn load(&self) -> anyhow::Result<PtuConfig> {
        let config_path = self.options.config_path.clone();

        if !config_path.exists() {
            if self.options.create_if_missing {
                let default_config = PtuConfig::default();
                self.save(&default_config)
                    .context("Failed to save default config")?;
                return Ok(default_config);
            } else {
                return Err(ConfigError::FileNotFound { path: config_path }.into());
            }
        }

        let content =
            fs::read_to_string(&config_path).map_err(|e| ConfigError::ReadError { source: e })?;

        let config: PtuConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError { source: e })?;

        config.validate()?;

        Ok(config)
    }

    pub fn save(&self, config: &PtuConfig) -> anyhow::Result<()> {
        let config_path = &self.options.config_path;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError { source: e })?;
        }

        let content = toml::to_string_pretty(config)
            .map_err(|e| ConfigError::SerializeError { source: e })?;

        fs::write(config_path, content).map_err(|e| ConfigError::WriteError { source: e })?;

        Ok(())
    }
}

pub fn init_config() -> anyhow::Result<(ConfigManager, PtuConfig)> {
    let manager = ConfigManager::new();
    let config = manager.load()?;
    Ok((manager, config))
}

pub fn init_config_with_options(
    options: ConfigOptions,
) -> anyhow::Result<(ConfigManager, PtuConfig)> {
    let manager = ConfigManager::with_options(options);
    let config = manager.load()?;
    Ok((manager, config))
}

pub fn create_default_config<P: AsRef<Path>>(path: Option<P>) -> anyhow::Result<()> {
    let config_path = path
        .map(|p| p.as_ref().to_path_buf())
        .unwrap_or_else(ConfigOptions::default_config_path);

    let options = ConfigOptions {
        config_path,
        create_if_missing: true,
    };

    let manager = ConfigManager::with_options(options);
    manager.save(&PtuConfig::default())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ptu.toml");

        let (_manager, config) = init_config_with_options(ConfigOptions::with_path(&path)).unwrap();

        assert_eq!(config, PtuConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn missing_file_without_create_fails() {
        let dir = tempfile::tempdir().unwrap();
        let options = ConfigOptions {
            config_path: dir.path().join("absent.toml"),
            create_if_missing: false,
        };

        let error = init_config_with_options(options).unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ConfigError>(),
            Some(ConfigError::FileNotFound { .. })
        ));
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ptu.toml");
        fs::write(
            &path,
            r#"
internal_rate = 50.0
overlap_policy = "queue"
combined_step = "unified"
time_limit_secs = 0.0

[tilt]
min = -0.25
max = 0.25
speed = 0.2
move_threshold = 0.002
"#,
        )
        .unwrap();

        let (_manager, config) = init_config_with_options(ConfigOptions::with_path(&path)).unwrap();

        assert_eq!(config.internal_rate, 50.0);
        assert_eq!(config.overlap_policy, OverlapPolicy::Queue);
        assert_eq!(config.combined_step, CombinedStepFormula::Unified);
        assert_eq!(config.time_limit(), None);
        assert_eq!(config.tilt.max, 0.25);
        assert_eq!(config.pan, PtuConfig::default().pan);
        assert_eq!(config.server, ServerConfig::default());
    }

    #[test]
    fn inverted_limits_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ptu.toml");
        let mut config = PtuConfig::default();
        config.pan.min = 2.0;

        let manager = ConfigManager::with_options(ConfigOptions::with_path(&path));
        manager.save(&config).unwrap();

        let error = manager.load().unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ConfigError>(),
            Some(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn durations_out_of_range_are_rejected() {
        let mut config = PtuConfig::default();
        config.time_limit_secs = 1e20;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { .. })
        ));
        // Building a controller from it must not panic either.
        assert_eq!(config.time_limit(), Some(Duration::MAX));
        crate::controller::ptu::PtuController::new(&config);

        let mut config = PtuConfig::default();
        config.internal_rate = 1e-30;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { .. })
        ));

        let mut config = PtuConfig::default();
        config.publish_rate = 1e-30;
        assert!(config.validate().is_err());
        assert_eq!(config.publish_period(), Duration::MAX);
    }

    #[test]
    fn default_periods() {
        let config = PtuConfig::default();

        assert_eq!(config.publish_period(), Duration::from_millis(100));
        assert_eq!(config.time_limit(), Some(Duration::from_secs(60)));
    }
}
