//! Settings provider: read fresh at the start of every pass.

use std::path::PathBuf;

use tabzone_core::{CoreError, Settings};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read settings {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Invalid(#[from] CoreError),
}

pub trait SettingsProvider: Send + Sync {
    /// Current, validated settings.
    fn current(&self) -> Result<Settings, SettingsError>;
}

/// TOML file. A missing file means defaults.
pub struct FileSettings {
    path: PathBuf,
}

impl FileSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SettingsProvider for FileSettings {
    fn current(&self) -> Result<Settings, SettingsError> {
        let settings = match std::fs::read_to_string(&self.path) {
            Ok(content) => Settings::from_toml(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
            Err(source) => {
                return Err(SettingsError::Read {
                    path: self.path.display().to_string(),
                    source,
                });
            }
        };
        settings.validate()?;
        Ok(settings)
    }
}

/// Fixed settings.
#[cfg(test)]
pub struct StaticSettings(pub Settings);

#[cfg(test)]
impl SettingsProvider for StaticSettings {
    fn current(&self) -> Result<Settings, SettingsError> {
        self.0.validate()?;
        Ok(self.0.clone())
    }
}
