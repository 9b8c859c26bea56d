//! Renderer binary detection and process spawning.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::{Child, Command};

use crate::config::AppConfig;

/// Where gmediarender is installed on HiFiBerryOS.
pub const DEFAULT_RENDERER: &str = "/bin/gmediarender";

#[derive(Error, Debug)]
pub enum ProcessError {
  #[error("Renderer executable not found")]
  NotFound,
  #[error("Failed to spawn renderer {program}: {source}")]
  SpawnFailed {
    program: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Renderer stdout was not captured")]
  NoOutput,
}

/// Find the renderer executable.
///
/// An explicitly configured path is used as-is; otherwise the default
/// install location is preferred over a `PATH` lookup.
pub fn find_renderer(configured: Option<&Path>) -> Option<PathBuf> {
  if let Some(path) = configured {
    return Some(path.to_path_buf());
  }

  let default = PathBuf::from(DEFAULT_RENDERER);
  if default.exists() {
    return Some(default);
  }

  which::which("gmediarender").ok()
}

/// The exact command line a renderer is (re)launched with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererCommand {
  pub program: PathBuf,
  pub args: Vec<String>,
}

impl RendererCommand {
  pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
    Self {
      program: program.into(),
      args,
    }
  }

  /// Build the gmediarender invocation for `config` and `identity`.
  pub fn from_config(config: &AppConfig, identity: &str) -> Result<Self, ProcessError> {
    let program = find_renderer(config.binary_path().as_deref()).ok_or(ProcessError::NotFound)?;

    let args = vec![
      "-f".to_string(),
      config.system_name.clone(),
      format!("--gstout-audiosink={}", config.audio_sink),
      "-u".to_string(),
      identity.to_string(),
      "--logfile=stdout".to_string(),
      format!("--mixer={}", config.mixer),
    ];

    Ok(Self::new(program, args))
  }

  /// Spawn the renderer with its stdout piped back to us.
  pub fn spawn(&self) -> Result<Child, ProcessError> {
    log::info!("Spawning renderer: {:?} {:?}", self.program, self.args);

    Command::new(&self.program)
      .args(&self.args)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::null())
      .kill_on_drop(true)
      .spawn()
      .map_err(|source| ProcessError::SpawnFailed {
        program: self.program.clone(),
        source,
      })
  }
}
