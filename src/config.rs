//! Configuration management for winsvc.
use regex::Regex;
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

use crate::{error::ConfigError, registrar::StartupPolicy};

/// Default service name used when the configuration does not set one.
pub const DEFAULT_SERVICE_NAME: &str = "MyExampleService";

/// Configuration file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "winsvc.yaml";

/// Represents the structure of the configuration file.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// Registration settings.
    pub service: ServiceConfig,
    /// Example workload settings.
    pub workload: WorkloadConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// How the service is registered.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    /// Name registered with the service control manager.
    pub name: String,
    /// Startup policy used by `install`.
    pub startup: StartupPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_SERVICE_NAME.to_string(),
            startup: StartupPolicy::OnDemand,
        }
    }
}

/// Settings of the example ticker workload.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Time between ticks, also the stop-event poll timeout (e.g. "3s").
    pub interval: String,
    /// File the ticker appends to. Nothing is written when unset.
    pub output: Option<PathBuf>,
    /// Wait hint reported with stop-pending (e.g. "1s").
    pub stop_wait_hint: String,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            interval: "3s".to_string(),
            output: None,
            stop_wait_hint: "1s".to_string(),
        }
    }
}

impl WorkloadConfig {
    pub fn interval(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.interval)
    }

    pub fn stop_wait_hint(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.stop_wait_hint)
    }
}

/// Logging settings.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level or filter directive, e.g. "debug".
    pub level: Option<String>,
    /// Log file. A service has no console, so this is the only place its
    /// output can go.
    pub file: Option<PathBuf>,
}

/// Parses durations such as `500ms`, `10s`, `5m`, `2h`. Bare numbers are seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ConfigError::InvalidDuration(raw.to_string()));
    }

    if let Some(millis) = value.strip_suffix("ms") {
        let amount: u64 = millis
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidDuration(raw.to_string()))?;
        return Ok(Duration::from_millis(amount));
    }

    let (amount_str, multiplier) = if let Some(stripped) = value.strip_suffix('s') {
        (stripped.trim(), 1)
    } else if let Some(stripped) = value.strip_suffix('m') {
        (stripped.trim(), 60)
    } else if let Some(stripped) = value.strip_suffix('h') {
        (stripped.trim(), 3600)
    } else {
        (value, 1)
    };

    let amount: u64 = amount_str
        .parse()
        .map_err(|_| ConfigError::InvalidDuration(raw.to_string()))?;

    Ok(Duration::from_secs(amount.saturating_mul(multiplier)))
}

/// Expands `$VAR` and `${VAR}` references from the environment.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?").expect("valid env var pattern");
    let mut missing = None;
    let result = re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        match env::var(var_name) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var_name) => Err(ConfigError::MissingEnvVar(var_name)),
        None => Ok(result.into_owned()),
    }
}

/// Expands environment references in the fields that name paths or the
/// service, leaving the rest of the document untouched.
fn expand_fields(config: &mut Config) -> Result<(), ConfigError> {
    config.service.name = expand_env_vars(&config.service.name)?;
    if let Some(output) = &config.workload.output {
        config.workload.output = Some(expand_path(output)?);
    }
    if let Some(file) = &config.logging.file {
        config.logging.file = Some(expand_path(file)?);
    }
    Ok(())
}

fn expand_path(path: &Path) -> Result<PathBuf, ConfigError> {
    expand_env_vars(&path.to_string_lossy()).map(PathBuf::from)
}

/// Loads and parses the configuration file, expanding environment variables
/// in the service name and the output and log paths.
///
/// Without an explicit path, `winsvc.yaml` in the working directory is used if
/// present; otherwise the defaults apply.
pub fn load_config(config_path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match config_path {
        Some(path) => path.to_path_buf(),
        None => {
            let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !candidate.exists() {
                debug!("No configuration file found, using defaults");
                return Ok(Config::default());
            }
            candidate
        }
    };

    let content = fs::read_to_string(&config_path).map_err(|e| {
        ConfigError::Read(std::io::Error::new(
            e.kind(),
            format!("{} ({})", e, config_path.display()),
        ))
    })?;

    let mut config: Config = serde_yaml::from_str(&content)?;
    expand_fields(&mut config)?;
    debug!("Loaded configuration from {}", config_path.display());
    Ok(config)
}

/// Makes `path` absolute against the working directory.
pub fn resolve_config_path(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }

    let resolved = env::current_dir()?.join(path);
    Ok(resolved.canonicalize().unwrap_or(resolved))
}
