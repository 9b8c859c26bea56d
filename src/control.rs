//! Inbound playback controls.

use std::sync::Arc;

use thiserror::Error;

use crate::player::{PropertyBridge, PLAYER_INTERFACE};
use crate::renderer::RendererSupervisor;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
  #[error("{0} is not supported by the renderer")]
  Unsupported(&'static str),
}

/// Playback controls offered on the bus.
///
/// `Stop` works by killing the renderer process, which the supervisor then
/// relaunches. No request is ever sent to the renderer itself.
pub struct ControlFacade {
  supervisor: Arc<RendererSupervisor>,
  bridge: Arc<PropertyBridge>,
}

impl ControlFacade {
  pub fn new(supervisor: Arc<RendererSupervisor>, bridge: Arc<PropertyBridge>) -> Self {
    Self { supervisor, bridge }
  }

  /// Interrupt playback and forget the current track.
  pub fn stop(&self) {
    log::info!("Stop requested");
    self.supervisor.stop();
    if self.bridge.state().reset().any() {
      if let Err(e) = self.bridge.sync(PLAYER_INTERFACE) {
        log::warn!("Failed to publish stop: {}", e);
      }
    }
  }

  pub fn play(&self) {
    log::info!("Play requested, renderer is controlled by the DLNA client");
  }

  pub fn pause(&self) {
    log::info!("Pause requested, renderer is controlled by the DLNA client");
  }

  pub fn play_pause(&self) {
    log::info!("PlayPause requested, renderer is controlled by the DLNA client");
  }

  pub fn next(&self) -> Result<(), ControlError> {
    Err(ControlError::Unsupported("Next"))
  }

  pub fn previous(&self) -> Result<(), ControlError> {
    Err(ControlError::Unsupported("Previous"))
  }

  pub fn seek(&self, _offset_us: i64) -> Result<(), ControlError> {
    Err(ControlError::Unsupported("Seek"))
  }

  pub fn set_position(&self, _track_id: &str, _position_us: i64) -> Result<(), ControlError> {
    Err(ControlError::Unsupported("SetPosition"))
  }

  pub fn open_uri(&self, _uri: &str) -> Result<(), ControlError> {
    Err(ControlError::Unsupported("OpenUri"))
  }
}
