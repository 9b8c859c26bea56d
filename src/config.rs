//! Bridge configuration and renderer identity.
//!
//! The configuration file is a small INI document; only the `[dlna-mpris]`
//! section is read. Its keys are deserialized into [`AppConfig`] so every
//! field carries its own default.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Default location of the configuration file.
pub const CONFIG_PATH: &str = "/etc/dlnampris.conf";
/// Default location of the identity token file.
pub const UUID_PATH: &str = "/etc/uuid";
/// Section holding the bridge settings.
pub const CONFIG_SECTION: &str = "dlna-mpris";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("Failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Invalid configuration: {0}")]
  Invalid(#[from] serde_json::Error),
}

/// Message bus the MPRIS object is published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
  #[default]
  System,
  Session,
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
  /// Name the renderer advertises on the network.
  #[serde(rename = "systemname", default = "default_system_name")]
  pub system_name: String,

  /// ALSA mixer handed to the renderer.
  #[serde(default = "default_mixer")]
  pub mixer: String,

  /// Renderer executable (None = auto-detect).
  #[serde(default)]
  pub binary: Option<String>,

  /// GStreamer audio sink used by the renderer.
  #[serde(rename = "audiosink", default = "default_audio_sink")]
  pub audio_sink: String,

  #[serde(default)]
  pub bus: BusKind,
}

fn default_system_name() -> String {
  "HiFiBerry".to_string()
}

fn default_mixer() -> String {
  "Softvol".to_string()
}

fn default_audio_sink() -> String {
  "alsasink".to_string()
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      system_name: default_system_name(),
      mixer: default_mixer(),
      binary: None,
      audio_sink: default_audio_sink(),
      bus: BusKind::default(),
    }
  }
}

impl AppConfig {
  /// Parse the `[dlna-mpris]` section of an INI document.
  pub fn from_ini(text: &str) -> Result<Self, ConfigError> {
    let section = ini_section(text, CONFIG_SECTION);
    let map: serde_json::Map<String, serde_json::Value> = section
      .into_iter()
      .map(|(key, value)| (key, serde_json::Value::String(value)))
      .collect();
    Ok(serde_json::from_value(serde_json::Value::Object(map))?)
  }

  /// Read configuration from `path`.
  ///
  /// A missing file is not an error and yields the defaults.
  pub fn read(path: &Path) -> Result<Self, ConfigError> {
    match std::fs::read_to_string(path) {
      Ok(text) => Self::from_ini(&text),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        log::info!("No configuration at {}, using defaults", path.display());
        Ok(Self::default())
      }
      Err(source) => Err(ConfigError::Read {
        path: path.to_path_buf(),
        source,
      }),
    }
  }

  /// Read configuration, falling back to defaults on any error.
  pub fn load(path: &Path) -> Self {
    match Self::read(path) {
      Ok(config) => config,
      Err(e) => {
        log::warn!("{}, using defaults", e);
        Self::default()
      }
    }
  }

  /// Configured renderer path, ignoring empty values.
  pub fn binary_path(&self) -> Option<PathBuf> {
    self
      .binary
      .as_deref()
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(PathBuf::from)
  }
}

/// Collect `key = value` pairs of one INI section.
///
/// Keys are lowercased; later duplicates win.
fn ini_section(text: &str, wanted: &str) -> HashMap<String, String> {
  let mut values = HashMap::new();
  let mut in_section = false;

  for raw in text.lines() {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
      continue;
    }

    if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
      in_section = name.trim() == wanted;
      continue;
    }

    if !in_section {
      continue;
    }

    let Some(pos) = line.find(['=', ':']) else {
      continue;
    };
    let key = line[..pos].trim().to_lowercase();
    let value = line[pos + 1..].trim().to_string();
    if !key.is_empty() {
      values.insert(key, value);
    }
  }

  values
}

/// Read the renderer identity token.
///
/// Falls back to the nil UUID if the file is absent or does not hold a
/// 36-character UUID.
pub fn read_identity(path: &Path) -> String {
  let token = std::fs::read_to_string(path)
    .ok()
    .and_then(|text| text.lines().next().map(|l| l.trim().to_string()))
    .unwrap_or_default();

  if token.len() == 36 && Uuid::try_parse(&token).is_ok() {
    token
  } else {
    log::warn!("No valid identity in {}, using placeholder", path.display());
    Uuid::nil().hyphenated().to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_defaults_without_section() {
    let config = AppConfig::from_ini("[other]\nsystemname = Nope\n").unwrap();
    assert_eq!(config, AppConfig::default());
    assert_eq!(config.system_name, "HiFiBerry");
    assert_eq!(config.mixer, "Softvol");
    assert_eq!(config.bus, BusKind::System);
  }

  #[test]
  fn test_section_values() {
    let text = "\
# comment
[dlna-mpris]
SystemName = Living Room
mixer: Digital
; another comment
bus = session
";
    let config = AppConfig::from_ini(text).unwrap();
    assert_eq!(config.system_name, "Living Room");
    assert_eq!(config.mixer, "Digital");
    assert_eq!(config.bus, BusKind::Session);
    assert_eq!(config.audio_sink, "alsasink");
  }

  #[test]
  fn test_invalid_bus_is_error() {
    let result = AppConfig::from_ini("[dlna-mpris]\nbus = carrier-pigeon\n");
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
  }

  #[test]
  fn test_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig::read(&dir.path().join("absent.conf")).unwrap();
    assert_eq!(config, AppConfig::default());
  }

  #[test]
  fn test_binary_path_ignores_blank() {
    let mut config = AppConfig::default();
    assert_eq!(config.binary_path(), None);
    config.binary = Some("  ".to_string());
    assert_eq!(config.binary_path(), None);
    config.binary = Some("/usr/bin/gmediarender".to_string());
    assert_eq!(
      config.binary_path(),
      Some(PathBuf::from("/usr/bin/gmediarender"))
    );
  }

  #[test]
  fn test_identity_valid() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "1b4e28ba-2fa1-11d2-883f-0016d3cca427").unwrap();
    assert_eq!(
      read_identity(file.path()),
      "1b4e28ba-2fa1-11d2-883f-0016d3cca427"
    );
  }

  #[test]
  fn test_identity_malformed_or_missing() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "not-a-uuid").unwrap();
    assert_eq!(
      read_identity(file.path()),
      "00000000-0000-0000-0000-000000000000"
    );

    let dir = tempfile::tempdir().unwrap();
    assert_eq!(
      read_identity(&dir.path().join("uuid")),
      "00000000-0000-0000-0000-000000000000"
    );
  }
}
