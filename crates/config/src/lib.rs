use core::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Prefix of the environment variables which override values from the configuration file,
/// eg. `COFLOW__RUNNER__MAX_STEPS=1000`.
pub const ENV_PREFIX: &str = "COFLOW";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Coflow configuration options
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Coroutine runner configuration options
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Log configuration options
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration options
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Runtime configuration options
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl Config {
    /// Loads the configuration from the given TOML file, overridden by any
    /// `COFLOW__`-prefixed environment variable.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::load_with(path, environment())
    }

    fn load_with(path: impl AsRef<Path>, environment: config::Environment) -> Result<Self, Error> {
        let config: Config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        config.runner.validate()?;

        Ok(config)
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX).separator("__")
}

/// Coroutine runner configuration options
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// How many coroutines may be nested inside one another before the
    /// innermost yield fails
    pub max_nesting_depth: usize,

    /// Maximum number of times a single coroutine may be stepped before the run is aborted.
    /// Unlimited if absent.
    #[serde(default)]
    pub max_steps: Option<u64>,

    /// Timeout applied to every value, thunk and deferred a coroutine waits on.
    /// No timeout if absent.
    #[serde(default, with = "humantime_serde")]
    pub default_timeout: Option<Duration>,
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_nesting_depth == 0 {
            return Err(Error::Invalid(
                "runner.max_nesting_depth must be at least 1".to_string(),
            ));
        }

        if self.max_steps == Some(0) {
            return Err(Error::Invalid(
                "runner.max_steps must be at least 1".to_string(),
            ));
        }

        if self.default_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::Invalid(
                "runner.default_timeout must not be zero".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: 64,
            max_steps: None,
            default_timeout: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Register the runner metrics in the global registry
    pub enabled: bool,

    /// Prefix of every metric name
    pub prefix: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            enabled: false,
            prefix: "coflow_runner".to_string(),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "flavor", rename_all = "snake_case")]
pub enum RuntimeConfig {
    /// Single-threaded runtime
    #[default]
    SingleThreaded,

    /// Multi-threaded runtime
    MultiThreaded {
        /// Number of worker threads
        worker_threads: usize,
    },
}

impl RuntimeConfig {
    pub fn single_threaded() -> Self {
        Self::SingleThreaded
    }

    pub fn multi_threaded(worker_threads: usize) -> Self {
        Self::MultiThreaded { worker_threads }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: LogLevel,
    pub log_format: LogFormat,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    #[default]
    Debug,
    Warn,
    Info,
    Error,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "error" => Ok(LogLevel::Error),
            e => Err(format!("Invalid log level: {e}")),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plaintext,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plaintext" => Ok(LogFormat::Plaintext),
            "json" => Ok(LogFormat::Json),
            e => Err(format!("Invalid log format: {e}")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Plaintext => write!(f, "plaintext"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn log_format() {
        assert_eq!(
            LogFormat::from_str("yaml"),
            Err("Invalid log format: yaml".to_string())
        )
    }

    #[test]
    fn log_formatting() {
        assert_eq!(
            format!(
                "{} {} {} {} {}",
                LogLevel::Trace,
                LogLevel::Debug,
                LogLevel::Warn,
                LogLevel::Info,
                LogLevel::Error
            ),
            "trace debug warn info error"
        );

        assert_eq!(
            format!("{} {}", LogFormat::Plaintext, LogFormat::Json),
            "plaintext json"
        );
    }

    #[test]
    fn runtime_multi_threaded() {
        assert_eq!(
            RuntimeConfig::multi_threaded(5),
            RuntimeConfig::MultiThreaded { worker_threads: 5 }
        );
    }

    #[test]
    fn runner_from_toml() {
        let runner: RunnerConfig = toml::from_str(
            r#"
            max_nesting_depth = 8
            max_steps = 100
            default_timeout = "250ms"
            "#,
        )
        .unwrap();

        assert_eq!(runner.max_nesting_depth, 8);
        assert_eq!(runner.max_steps, Some(100));
        assert_eq!(runner.default_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn runner_optional_fields() {
        let runner: RunnerConfig = serde_json::from_str(r#"{ "max_nesting_depth": 4 }"#).unwrap();

        assert_eq!(runner.max_steps, None);
        assert_eq!(runner.default_timeout, None);
        assert!(runner.validate().is_ok());
    }

    #[test]
    fn runner_validation() {
        let zero_depth = RunnerConfig {
            max_nesting_depth: 0,
            ..Default::default()
        };
        assert!(matches!(zero_depth.validate(), Err(Error::Invalid(_))));

        let zero_timeout = RunnerConfig {
            default_timeout: Some(Duration::ZERO),
            ..Default::default()
        };
        assert!(matches!(zero_timeout.validate(), Err(Error::Invalid(_))));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [runner]
            max_nesting_depth = 16
            default_timeout = "2s"

            [logging]
            log_level = "info"
            log_format = "json"

            [runtime]
            flavor = "multi_threaded"
            worker_threads = 2
            "#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.runner.max_nesting_depth, 16);
        assert_eq!(config.runner.default_timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.logging.log_level, LogLevel::Info);
        assert_eq!(config.logging.log_format, LogFormat::Json);
        assert_eq!(config.runtime, RuntimeConfig::multi_threaded(2));
        assert_eq!(config.metrics, MetricsConfig::default());
    }

    #[test]
    fn load_partial_sections_with_env_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [runner]
            max_nesting_depth = 16

            [logging]
            log_format = "json"
            "#
        )
        .unwrap();

        let env = [
            ("COFLOW__METRICS__ENABLED", "true"),
            ("COFLOW__RUNNER__MAX_STEPS", "1000"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = Config::load_with(file.path(), environment().source(Some(env))).unwrap();

        assert_eq!(config.runner.max_nesting_depth, 16);
        assert_eq!(config.runner.max_steps, Some(1000));
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.prefix, MetricsConfig::default().prefix);
        assert_eq!(config.logging.log_level, LogLevel::default());
        assert_eq!(config.logging.log_format, LogFormat::Json);
    }
}
