//! Player state and its MPRIS property view.

mod properties;
mod state;

pub use properties::{
  BridgeError, PropertiesChanged, PropertyBridge, PropertyValue, DESKTOP_ENTRY, IDENTITY,
  PLAYER_INTERFACE, ROOT_INTERFACE,
};
pub use state::{PlaybackStatus, PlayerState, SharedPlayerState, StateChange, TrackMetadata};
