//! MPRIS module - publishes the player on D-Bus.
//!
//! Architecture:
//! - `interfaces.rs` - zbus objects for the root and player interfaces
//! - `signals.rs` - Forwards property changes as `PropertiesChanged` signals

mod interfaces;
mod signals;

use std::sync::Arc;

use futures_util::StreamExt;
use thiserror::Error;
use zbus::fdo::{self, DBusProxy, RequestNameFlags, RequestNameReply};
use zbus::{connection, Connection};

use crate::config::BusKind;
use crate::control::{ControlError, ControlFacade};
use crate::player::{BridgeError, PropertyBridge};

pub use interfaces::{PlayerInterface, RootInterface};
pub use signals::forward_changes;

/// Well-known name. Another instance may take it over.
pub const BUS_NAME: &str = "org.mpris.MediaPlayer2.dlna";
pub const MPRIS_PATH: &str = "/org/mpris/MediaPlayer2";

#[derive(Error, Debug)]
pub enum MprisError {
  #[error("D-Bus error: {0}")]
  Bus(#[from] zbus::Error),
  #[error("Could not become owner of org.mpris.MediaPlayer2.dlna: {0}")]
  NameNotAcquired(String),
}

impl From<BridgeError> for fdo::Error {
  fn from(e: BridgeError) -> Self {
    match e {
      BridgeError::UnknownInterface(_) => fdo::Error::UnknownInterface(e.to_string()),
      BridgeError::UnknownProperty { .. } => fdo::Error::UnknownProperty(e.to_string()),
      BridgeError::TypeMismatch(_) => fdo::Error::Failed(e.to_string()),
    }
  }
}

impl From<ControlError> for fdo::Error {
  fn from(e: ControlError) -> Self {
    fdo::Error::NotSupported(e.to_string())
  }
}

/// Connect to `bus`, serve both MPRIS objects and claim [`BUS_NAME`].
pub async fn connect(
  bus: BusKind,
  bridge: Arc<PropertyBridge>,
  control: Arc<ControlFacade>,
) -> Result<Connection, MprisError> {
  let builder = match bus {
    BusKind::System => connection::Builder::system()?,
    BusKind::Session => connection::Builder::session()?,
  };

  let connection = builder
    .serve_at(MPRIS_PATH, RootInterface::new(bridge.clone()))?
    .serve_at(MPRIS_PATH, PlayerInterface::new(bridge, control))?
    .build()
    .await?;

  let flags =
    RequestNameFlags::AllowReplacement | RequestNameFlags::ReplaceExisting | RequestNameFlags::DoNotQueue;

  match connection.request_name_with_flags(BUS_NAME, flags).await {
    Ok(RequestNameReply::PrimaryOwner) | Ok(RequestNameReply::AlreadyOwner) => {
      log::info!("Registered {} on the {:?} bus", BUS_NAME, bus);
      Ok(connection)
    }
    Ok(reply) => Err(MprisError::NameNotAcquired(format!("{:?}", reply))),
    Err(e) => Err(MprisError::NameNotAcquired(e.to_string())),
  }
}

/// Resolves once [`BUS_NAME`] has been taken over by someone else.
pub async fn name_lost(connection: &Connection) -> Result<(), MprisError> {
  let proxy = DBusProxy::new(connection).await?;
  let mut lost = proxy.receive_name_lost().await?;

  while let Some(signal) = lost.next().await {
    match signal.args() {
      Ok(args) if args.name().as_str() == BUS_NAME => {
        log::info!("Lost {} to another instance", BUS_NAME);
        return Ok(());
      }
      Ok(args) => log::debug!("Ignoring NameLost for {}", args.name()),
      Err(e) => log::warn!("Malformed NameLost signal: {}", e),
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_bridge_errors_map_to_fdo() {
    let unknown = BridgeError::UnknownProperty {
      interface: "org.mpris.MediaPlayer2.Player".to_string(),
      property: "Volume".to_string(),
    };
    assert!(matches!(fdo::Error::from(unknown), fdo::Error::UnknownProperty(_)));
    assert!(matches!(
      fdo::Error::from(BridgeError::UnknownInterface("x.y".to_string())),
      fdo::Error::UnknownInterface(_)
    ));
    assert!(matches!(
      fdo::Error::from(ControlError::Unsupported("Seek")),
      fdo::Error::NotSupported(_)
    ));
  }
}
