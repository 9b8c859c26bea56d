//! Everything the running service shares, built once at startup.

use std::ops::ControlFlow;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::control::ControlFacade;
use crate::lifecycle::LifecycleEvent;
use crate::player::{PropertyBridge, SharedPlayerState, StateChange, PLAYER_INTERFACE};
use crate::renderer::{parse_line, LineOutcome, ProcessError, RendererCommand, RendererSupervisor};

pub struct BridgeContext {
  pub config: AppConfig,
  pub bridge: Arc<PropertyBridge>,
  pub supervisor: Arc<RendererSupervisor>,
  pub control: Arc<ControlFacade>,
}

impl BridgeContext {
  pub fn new(config: AppConfig, command: RendererCommand) -> Self {
    Self::with_supervisor(config, RendererSupervisor::new(command))
  }

  pub fn with_supervisor(config: AppConfig, supervisor: RendererSupervisor) -> Self {
    let bridge = Arc::new(PropertyBridge::new(SharedPlayerState::new()));
    let supervisor = Arc::new(supervisor);
    let control = Arc::new(ControlFacade::new(supervisor.clone(), bridge.clone()));

    Self {
      config,
      bridge,
      supervisor,
      control,
    }
  }

  pub fn state(&self) -> &SharedPlayerState {
    self.bridge.state()
  }

  /// Decode one renderer line, apply it and publish what changed.
  pub fn handle_line(&self, line: &[u8]) -> StateChange {
    match parse_line(line) {
      LineOutcome::Events(events) => {
        log::debug!("Renderer events: {:?}", events);
        let change = self.state().apply_all(&events);
        if let Err(e) = self.bridge.sync(PLAYER_INTERFACE) {
          log::warn!("Failed to publish player state: {}", e);
        }
        change
      }
      LineOutcome::NoEvent => {
        log::trace!("renderer: {}", String::from_utf8_lossy(line));
        StateChange::default()
      }
      LineOutcome::Malformed(e) => {
        log::debug!("Skipping renderer line ({}): {}", e, String::from_utf8_lossy(line));
        StateChange::default()
      }
    }
  }

  /// React to an OS trigger. `Break` means the service should exit.
  pub fn handle_lifecycle(&self, event: LifecycleEvent) -> ControlFlow<()> {
    match event {
      LifecycleEvent::StopPlayback => {
        self.control.stop();
        ControlFlow::Continue(())
      }
      LifecycleEvent::Terminate => {
        self.supervisor.terminate();
        ControlFlow::Break(())
      }
    }
  }

  /// Run the renderer, feeding its output through [`handle_line`](Self::handle_line).
  pub async fn run_supervisor(self: Arc<Self>) -> Result<(), ProcessError> {
    let ctx = self.clone();
    self
      .supervisor
      .run(move |line| {
        ctx.handle_line(line);
      })
      .await
  }
}
