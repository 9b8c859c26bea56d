//! `org.mpris.MediaPlayer2` and `org.mpris.MediaPlayer2.Player` objects.
//!
//! Property getters go through [`PropertyBridge`]; methods go through
//! [`ControlFacade`]. Nothing here keeps state of its own.

use std::collections::HashMap;
use std::sync::Arc;

use zbus::fdo;
use zbus::object_server::SignalEmitter;
use zbus::zvariant::{ObjectPath, OwnedValue, Value};

use crate::control::ControlFacade;
use crate::player::{BridgeError, PropertyBridge, PropertyValue, PLAYER_INTERFACE, ROOT_INTERFACE};

fn typed<T>(
  bridge: &PropertyBridge,
  interface: &str,
  name: &str,
  convert: fn(PropertyValue) -> Option<T>,
) -> fdo::Result<T> {
  let value = bridge.get(interface, name)?;
  convert(value).ok_or_else(|| BridgeError::TypeMismatch(name.to_string()).into())
}

pub struct RootInterface {
  bridge: Arc<PropertyBridge>,
}

impl RootInterface {
  pub fn new(bridge: Arc<PropertyBridge>) -> Self {
    Self { bridge }
  }

  fn flag(&self, name: &str) -> fdo::Result<bool> {
    typed(&self.bridge, ROOT_INTERFACE, name, PropertyValue::into_bool)
  }

  fn text(&self, name: &str) -> fdo::Result<String> {
    typed(&self.bridge, ROOT_INTERFACE, name, PropertyValue::into_string)
  }

  fn list(&self, name: &str) -> fdo::Result<Vec<String>> {
    typed(&self.bridge, ROOT_INTERFACE, name, PropertyValue::into_str_list)
  }
}

#[zbus::interface(name = "org.mpris.MediaPlayer2")]
impl RootInterface {
  /// CanRaise is false.
  fn raise(&self) {
    log::debug!("Ignoring Raise");
  }

  /// CanQuit is false.
  fn quit(&self) {
    log::debug!("Ignoring Quit");
  }

  #[zbus(property)]
  fn can_quit(&self) -> fdo::Result<bool> {
    self.flag("CanQuit")
  }

  #[zbus(property)]
  fn can_raise(&self) -> fdo::Result<bool> {
    self.flag("CanRaise")
  }

  #[zbus(property)]
  fn has_track_list(&self) -> fdo::Result<bool> {
    self.flag("HasTrackList")
  }

  #[zbus(property)]
  fn identity(&self) -> fdo::Result<String> {
    self.text("Identity")
  }

  #[zbus(property)]
  fn desktop_entry(&self) -> fdo::Result<String> {
    self.text("DesktopEntry")
  }

  #[zbus(property)]
  fn supported_uri_schemes(&self) -> fdo::Result<Vec<String>> {
    self.list("SupportedUriSchemes")
  }

  #[zbus(property)]
  fn supported_mime_types(&self) -> fdo::Result<Vec<String>> {
    self.list("SupportedMimeTypes")
  }
}

pub struct PlayerInterface {
  bridge: Arc<PropertyBridge>,
  control: Arc<ControlFacade>,
}

impl PlayerInterface {
  pub fn new(bridge: Arc<PropertyBridge>, control: Arc<ControlFacade>) -> Self {
    Self { bridge, control }
  }

  fn flag(&self, name: &str) -> fdo::Result<bool> {
    typed(&self.bridge, PLAYER_INTERFACE, name, PropertyValue::into_bool)
  }

  fn number(&self, name: &str) -> fdo::Result<f64> {
    typed(&self.bridge, PLAYER_INTERFACE, name, PropertyValue::into_f64)
  }
}

#[zbus::interface(name = "org.mpris.MediaPlayer2.Player")]
impl PlayerInterface {
  fn next(&self) -> fdo::Result<()> {
    Ok(self.control.next()?)
  }

  fn previous(&self) -> fdo::Result<()> {
    Ok(self.control.previous()?)
  }

  fn pause(&self) {
    self.control.pause();
  }

  fn play_pause(&self) {
    self.control.play_pause();
  }

  fn stop(&self) {
    self.control.stop();
  }

  fn play(&self) {
    self.control.play();
  }

  fn seek(&self, offset: i64) -> fdo::Result<()> {
    Ok(self.control.seek(offset)?)
  }

  fn set_position(&self, track_id: ObjectPath<'_>, position: i64) -> fdo::Result<()> {
    Ok(self.control.set_position(track_id.as_str(), position)?)
  }

  fn open_uri(&self, uri: &str) -> fdo::Result<()> {
    Ok(self.control.open_uri(uri)?)
  }

  /// Declared for completeness, the renderer never reports seeks.
  #[zbus(signal)]
  async fn seeked(emitter: &SignalEmitter<'_>, position: i64) -> zbus::Result<()>;

  #[zbus(property)]
  fn playback_status(&self) -> fdo::Result<String> {
    typed(&self.bridge, PLAYER_INTERFACE, "PlaybackStatus", PropertyValue::into_string)
  }

  #[zbus(property)]
  fn metadata(&self) -> fdo::Result<HashMap<String, OwnedValue>> {
    let map = typed(&self.bridge, PLAYER_INTERFACE, "Metadata", PropertyValue::into_map)?;
    map
      .into_iter()
      .map(|(key, value)| {
        OwnedValue::try_from(Value::from(value))
          .map(|value| (key, value))
          .map_err(|e| fdo::Error::Failed(e.to_string()))
      })
      .collect()
  }

  #[zbus(property)]
  fn rate(&self) -> fdo::Result<f64> {
    self.number("Rate")
  }

  #[zbus(property)]
  fn set_rate(&self, rate: f64) -> fdo::Result<()> {
    Ok(self.bridge.set(PLAYER_INTERFACE, "Rate", PropertyValue::Double(rate))?)
  }

  #[zbus(property)]
  fn minimum_rate(&self) -> fdo::Result<f64> {
    self.number("MinimumRate")
  }

  #[zbus(property)]
  fn maximum_rate(&self) -> fdo::Result<f64> {
    self.number("MaximumRate")
  }

  #[zbus(property)]
  fn can_go_next(&self) -> fdo::Result<bool> {
    self.flag("CanGoNext")
  }

  #[zbus(property)]
  fn can_go_previous(&self) -> fdo::Result<bool> {
    self.flag("CanGoPrevious")
  }

  #[zbus(property)]
  fn can_play(&self) -> fdo::Result<bool> {
    self.flag("CanPlay")
  }

  #[zbus(property)]
  fn can_pause(&self) -> fdo::Result<bool> {
    self.flag("CanPause")
  }

  #[zbus(property)]
  fn can_seek(&self) -> fdo::Result<bool> {
    self.flag("CanSeek")
  }

  #[zbus(property)]
  fn can_control(&self) -> fdo::Result<bool> {
    self.flag("CanControl")
  }
}
