//! Authoritative playback state, fed by renderer events.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::renderer::RendererEvent;

/// Renderer playback status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
  #[default]
  Stopped,
  Paused,
  Playing,
  Unknown,
}

impl PlaybackStatus {
  /// Map an AVTransport `TransportState` literal. Anything unexpected
  /// (TRANSITIONING, NO_MEDIA_PRESENT, ...) is Unknown.
  pub fn from_transport_state(value: &str) -> Self {
    match value {
      "PLAYING" => PlaybackStatus::Playing,
      "PAUSED_PLAYBACK" => PlaybackStatus::Paused,
      "STOPPED" => PlaybackStatus::Stopped,
      _ => PlaybackStatus::Unknown,
    }
  }

  /// MPRIS `PlaybackStatus` label.
  pub fn as_mpris(&self) -> &'static str {
    match self {
      PlaybackStatus::Playing => "Playing",
      PlaybackStatus::Paused => "Paused",
      PlaybackStatus::Stopped => "Stopped",
      PlaybackStatus::Unknown => "Unknown",
    }
  }
}

/// Metadata of the current track.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackMetadata {
  pub title: Option<String>,
  pub artist: Option<String>,
  pub album: Option<String>,
  pub track_number: Option<i32>,
  /// HTTP artwork candidates, in document order.
  pub art_urls: Vec<String>,
}

impl TrackMetadata {
  pub fn is_empty(&self) -> bool {
    *self == Self::default()
  }
}

/// Which bus-visible parts of the state an event touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateChange {
  pub status: bool,
  pub metadata: bool,
}

impl StateChange {
  pub fn any(&self) -> bool {
    self.status || self.metadata
  }

  fn merge(self, other: StateChange) -> Self {
    Self {
      status: self.status || other.status,
      metadata: self.metadata || other.metadata,
    }
  }
}

/// Current playback status, track and metadata.
///
/// Invariant: `track_url()` is `None` whenever `status` is Stopped.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerState {
  status: PlaybackStatus,
  track_url: Option<String>,
  metadata: TrackMetadata,
}

impl PlayerState {
  pub fn status(&self) -> PlaybackStatus {
    self.status
  }

  /// URL of the current track, `None` while stopped.
  ///
  /// The renderer announces a new URI before it starts playing it, so a
  /// URI loaded while stopped stays hidden until playback begins.
  pub fn track_url(&self) -> Option<&str> {
    match self.status {
      PlaybackStatus::Stopped => None,
      _ => self.track_url.as_deref(),
    }
  }

  pub fn metadata(&self) -> &TrackMetadata {
    &self.metadata
  }

  /// Apply one renderer event. This is the only mutator besides `reset`.
  pub fn apply(&mut self, event: &RendererEvent) -> StateChange {
    match event {
      RendererEvent::PlaybackStatusChanged(status) => {
        let changed = self.status != *status;
        self.status = *status;
        if *status == PlaybackStatus::Stopped {
          self.track_url = None;
        }
        StateChange {
          status: changed,
          metadata: false,
        }
      }
      RendererEvent::TrackCleared => {
        self.track_url = None;
        StateChange::default()
      }
      RendererEvent::TrackChanged(uri) => {
        self.track_url = Some(uri.clone());
        let changed = !self.metadata.is_empty();
        self.metadata = TrackMetadata::default();
        StateChange {
          status: false,
          metadata: changed,
        }
      }
      RendererEvent::MetadataChanged(metadata) => {
        let changed = self.metadata != *metadata;
        self.metadata = metadata.clone();
        StateChange {
          status: false,
          metadata: changed,
        }
      }
    }
  }

  /// Back to Stopped with no track.
  pub fn reset(&mut self) -> StateChange {
    let before = std::mem::take(self);
    StateChange {
      status: before.status != self.status,
      metadata: before.metadata != self.metadata,
    }
  }
}

/// `PlayerState` shared between the supervisor task and bus dispatch.
#[derive(Debug, Clone, Default)]
pub struct SharedPlayerState(Arc<Mutex<PlayerState>>);

impl SharedPlayerState {
  pub fn new() -> Self {
    Self::default()
  }

  /// Consistent copy of the current state.
  pub fn snapshot(&self) -> PlayerState {
    self.0.lock().clone()
  }

  /// Run `f` with the state locked.
  pub fn read<T>(&self, f: impl FnOnce(&PlayerState) -> T) -> T {
    f(&self.0.lock())
  }

  /// Apply events in arrival order under a single lock.
  pub fn apply_all(&self, events: &[RendererEvent]) -> StateChange {
    let mut state = self.0.lock();
    events
      .iter()
      .fold(StateChange::default(), |acc, event| acc.merge(state.apply(event)))
  }

  pub fn reset(&self) -> StateChange {
    self.0.lock().reset()
  }
}
