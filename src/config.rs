use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3000;
pub const PORT_ENV: &str = "PORT";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_listen_host")]
    pub listen_host: String,
    /// Signed and wide so that out-of-range values reach port validation
    /// instead of failing YAML parsing.
    #[serde(default = "default_port")]
    pub port: i64,
    #[serde(default = "default_temperature_command")]
    pub temperature_command: Vec<String>,
    #[serde(default = "default_fan_command")]
    pub fan_command: Vec<String>,
    #[serde(default = "default_fan_sysfs_paths")]
    pub fan_sysfs_paths: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_host: default_listen_host(),
            port: default_port(),
            temperature_command: default_temperature_command(),
            fan_command: default_fan_command(),
            fan_sysfs_paths: default_fan_sysfs_paths(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// The port is not checked here; out-of-range values fall back to the
    /// default in [`resolve_port`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_ip()?;
        if self.temperature_command.first().map_or(true, |p| p.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "temperature_command needs at least a program name".to_string(),
            ));
        }
        if self.fan_command.first().map_or(true, |p| p.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "fan_command needs at least a program name".to_string(),
            ));
        }
        Ok(())
    }

    pub fn listen_ip(&self) -> Result<IpAddr, ConfigError> {
        self.listen_host.trim().parse().map_err(|_| {
            ConfigError::Validation(format!(
                "listen_host '{}' is not an IP address",
                self.listen_host
            ))
        })
    }

    pub fn listen_addr(&self, port: u16) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(self.listen_ip()?, port))
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortChoice {
    pub port: u16,
    /// Set when the requested value was outside 1..=65535.
    pub rejected: Option<i64>,
}

/// Applies the `PORT` override to the requested port, then range-checks.
/// An env value that is not a positive integer is ignored.
pub fn resolve_port(requested: i64, env_value: Option<&str>) -> PortChoice {
    let mut port = requested;
    if let Some(raw) = env_value {
        if let Ok(p) = raw.parse::<i64>() {
            if p > 0 {
                port = p;
            }
        }
    }

    match u16::try_from(port) {
        Ok(p) if p > 0 => PortChoice {
            port: p,
            rejected: None,
        },
        _ => PortChoice {
            port: DEFAULT_PORT,
            rejected: Some(port),
        },
    }
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> i64 {
    DEFAULT_PORT as i64
}

fn default_temperature_command() -> Vec<String> {
    vec!["vcgencmd".to_string(), "measure_temp".to_string()]
}

fn default_fan_command() -> Vec<String> {
    vec!["vcgencmd".to_string(), "get_fan".to_string()]
}

fn default_fan_sysfs_paths() -> Vec<PathBuf> {
    [
        "/sys/class/hwmon/hwmon0/fan1_input",
        "/sys/class/hwmon/hwmon1/fan1_input",
        "/sys/devices/platform/cooling_fan/hwmon/hwmon0/fan1_input",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}
