//! Runtime settings persistence.
//!
//! A small JSON key/value store saved to a sidecar file next to the
//! project (`<project>-runtime-settings`). Embedders use it for per-project
//! runtime preferences; a missing or unparsable file loads as empty.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::warn;

/// Errors from settings persistence.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
  #[error("settings path not configured")]
  NoPath,

  #[error("failed to write settings file {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to serialize settings: {source}")]
  Serialize {
    #[source]
    source: serde_json::Error,
  },
}

/// JSON key/value settings with optional file persistence.
#[derive(Debug, Default)]
pub struct Settings {
  values: Map<String, Value>,
  path: Option<PathBuf>,
}

impl Settings {
  /// In-memory settings with no backing file.
  pub fn new() -> Self {
    Self::default()
  }

  /// Settings backed by the given file.
  pub fn with_path(path: impl Into<PathBuf>) -> Self {
    Self {
      values: Map::new(),
      path: Some(path.into()),
    }
  }

  /// Conventional sidecar path for a project file.
  pub fn sidecar_path(project_path: &Path) -> PathBuf {
    let mut name = project_path.as_os_str().to_os_string();
    name.push("-runtime-settings");
    PathBuf::from(name)
  }

  pub fn read(&self, key: &str) -> Option<&Value> {
    self.values.get(key)
  }

  pub fn write(&mut self, key: impl Into<String>, value: Value) {
    self.values.insert(key.into(), value);
  }

  /// Load from the backing file. A missing file or malformed content is
  /// not an error: the store just starts empty.
  pub async fn load(&mut self) -> Result<(), SettingsError> {
    let path = self.path.as_ref().ok_or(SettingsError::NoPath)?;

    let data = match tokio::fs::read_to_string(path).await {
      Ok(data) => data,
      Err(_) => return Ok(()),
    };

    match serde_json::from_str::<Map<String, Value>>(&data) {
      Ok(values) => self.values = values,
      Err(error) => {
        warn!(path = %path.display(), %error, "ignoring malformed settings file");
        self.values = Map::new();
      }
    }
    Ok(())
  }

  /// Save to the backing file, pretty-printed.
  pub async fn save(&self) -> Result<(), SettingsError> {
    let path = self.path.as_ref().ok_or(SettingsError::NoPath)?;

    let json = serde_json::to_string_pretty(&self.values)
      .map_err(|source| SettingsError::Serialize { source })?;
    tokio::fs::write(path, json)
      .await
      .map_err(|source| SettingsError::Write {
        path: path.clone(),
        source,
      })
  }
}
