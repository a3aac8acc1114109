use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to run `{command}`: {source}")]
    Spawn { command: String, source: io::Error },
    #[error("`{command}` exited with {status}")]
    ExitStatus { command: String, status: String },
    #[error("failed to read {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error("unparseable output {raw:?}")]
    Parse { raw: String },
}

impl SourceError {
    fn is_not_found(&self) -> bool {
        matches!(self, SourceError::Read { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

pub trait TemperatureSource: Send + Sync {
    /// Raw helper output, e.g. `temp=45.0'C`.
    fn read_raw(&self) -> Result<String, SourceError>;
}

pub trait FanSpeedSource: Send + Sync {
    /// Raw helper output, e.g. `speed=1200` or `800 RPM`.
    fn read_command(&self) -> Result<String, SourceError>;
    /// Sensor files tried in order when the helper gives nothing usable.
    fn fallback_paths(&self) -> &[PathBuf];
    fn read_path(&self, path: &Path) -> Result<String, SourceError>;
}

/// Shells out to a fixed helper, `vcgencmd measure_temp` by default.
#[derive(Debug, Clone)]
pub struct CommandTemperature {
    program: String,
    args: Vec<String>,
}

impl CommandTemperature {
    pub fn new(command: &[String]) -> Self {
        let (program, args) = split_command(command);
        Self { program, args }
    }
}

impl TemperatureSource for CommandTemperature {
    fn read_raw(&self) -> Result<String, SourceError> {
        run_helper(&self.program, &self.args)
    }
}

/// Shells out to a fixed helper (`vcgencmd get_fan` by default) and falls
/// back to hwmon files.
#[derive(Debug, Clone)]
pub struct CommandFanSpeed {
    program: String,
    args: Vec<String>,
    paths: Vec<PathBuf>,
}

impl CommandFanSpeed {
    pub fn new(command: &[String], paths: Vec<PathBuf>) -> Self {
        let (program, args) = split_command(command);
        Self {
            program,
            args,
            paths,
        }
    }
}

impl FanSpeedSource for CommandFanSpeed {
    fn read_command(&self) -> Result<String, SourceError> {
        run_helper(&self.program, &self.args)
    }

    fn fallback_paths(&self) -> &[PathBuf] {
        &self.paths
    }

    fn read_path(&self, path: &Path) -> Result<String, SourceError> {
        fs::read_to_string(path).map_err(|source| SourceError::Read {
            path: path.display().to_string(),
            source,
        })
    }
}

fn split_command(command: &[String]) -> (String, Vec<String>) {
    match command.split_first() {
        Some((program, args)) => (program.clone(), args.to_vec()),
        None => (String::new(), Vec::new()),
    }
}

fn run_helper(program: &str, args: &[String]) -> Result<String, SourceError> {
    let command = if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", args.join(" "))
    };
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| SourceError::Spawn {
            command: command.clone(),
            source,
        })?;
    if !output.status.success() {
        return Err(SourceError::ExitStatus {
            command,
            status: output.status.to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parses `key=<float><unit>`, e.g. `temp=45.0'C`.
pub fn parse_temperature(raw: &str) -> Result<f64, SourceError> {
    let parse_err = || SourceError::Parse {
        raw: raw.to_string(),
    };
    let (_, value) = raw.split_once('=').ok_or_else(parse_err)?;
    let number = value.split('\'').next().unwrap_or_default().trim();
    let celsius: f64 = number.parse().map_err(|_| parse_err())?;
    if !celsius.is_finite() || celsius < 0.0 {
        return Err(parse_err());
    }
    Ok(celsius)
}

/// Parses `speed=1200`, `1200` or `1200 RPM`.
pub fn parse_fan_speed(raw: &str) -> Result<u32, SourceError> {
    let parse_err = || SourceError::Parse {
        raw: raw.to_string(),
    };
    let trimmed = raw.trim();
    let parts: Vec<&str> = trimmed.split('=').collect();
    let value = match parts.as_slice() {
        [_, value] => *value,
        [value] => *value,
        _ => return Err(parse_err()),
    };
    if value.is_empty() {
        return Err(parse_err());
    }
    value
        .strip_suffix(" RPM")
        .unwrap_or(value)
        .parse::<u32>()
        .map_err(|_| parse_err())
}

pub fn read_temperature(source: &dyn TemperatureSource) -> Result<f64, SourceError> {
    let raw = source.read_raw()?;
    parse_temperature(&raw)
}

pub fn read_fan_speed(source: &dyn FanSpeedSource) -> Option<u32> {
    match source.read_command() {
        Ok(raw) => match parse_fan_speed(&raw) {
            Ok(rpm) => return Some(rpm),
            Err(err) => warn!(error = %err, "fan helper output not understood"),
        },
        // Absent helper is expected off the Pi; the hwmon files are the fallback.
        Err(err) => debug!(error = %err, "fan helper unavailable"),
    }

    for path in source.fallback_paths() {
        let raw = match source.read_path(path) {
            Ok(raw) => raw,
            Err(err) if err.is_not_found() => continue,
            Err(err) => {
                debug!(error = %err, "fan sensor file unreadable");
                continue;
            }
        };
        match raw.trim().parse::<u32>() {
            Ok(rpm) => return Some(rpm),
            Err(_) => {
                warn!(path = %path.display(), value = %raw.trim(), "fan sensor value not an integer")
            }
        }
    }

    warn!("fan speed unavailable from helper and sensor files");
    None
}
