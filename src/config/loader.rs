use crate::config::schema::{HostModel, PatchSetConfig, ValidationError};
use serde::de::DeserializeOwned;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Io { .. } => self,
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(f, "failed to parse TOML ({}): {}", path.display(), source),
                None => write!(f, "failed to parse TOML: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid configuration ({}): {}", path.display(), source),
                None => write!(f, "invalid configuration: {}", source),
            },
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
        }
    }
}

/// A TOML document with its own consistency checks.
trait Validated: DeserializeOwned {
    fn check(&self) -> Result<(), ValidationError>;
}

impl Validated for PatchSetConfig {
    fn check(&self) -> Result<(), ValidationError> {
        self.validate()
    }
}

impl Validated for HostModel {
    fn check(&self) -> Result<(), ValidationError> {
        self.validate()
    }
}

fn parse<T: Validated>(input: &str) -> Result<T, ConfigError> {
    let document: T = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    document
        .check()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(document)
}

fn read<T: Validated>(path: &Path) -> Result<T, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&contents).map_err(|error| error.with_path(path))
}

pub fn load_from_str(input: &str) -> Result<PatchSetConfig, ConfigError> {
    parse(input)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatchSetConfig, ConfigError> {
    read(path.as_ref())
}

pub fn load_model_from_str(input: &str) -> Result<HostModel, ConfigError> {
    parse(input)
}

pub fn load_model_from_path(path: impl AsRef<Path>) -> Result<HostModel, ConfigError> {
    read(path.as_ref())
}
