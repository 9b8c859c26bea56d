//! MPRIS property table backed by [`SharedPlayerState`].
//!
//! Every property is either a fixed value or computed from the player
//! state at lookup time. Change notifications are queued as
//! [`PropertiesChanged`] records; the bus layer turns them into
//! `org.freedesktop.DBus.Properties.PropertiesChanged` signals.

use std::collections::{BTreeMap, HashMap};

use async_channel::{Receiver, Sender};
use parking_lot::Mutex;
use thiserror::Error;

use super::state::{PlayerState, SharedPlayerState};

pub const ROOT_INTERFACE: &str = "org.mpris.MediaPlayer2";
pub const PLAYER_INTERFACE: &str = "org.mpris.MediaPlayer2.Player";

/// Value of the `Identity` property.
pub const IDENTITY: &str = "dlna client";
/// Value of the `DesktopEntry` property.
pub const DESKTOP_ENTRY: &str = "dlna";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
  #[error("Unknown interface {0}")]
  UnknownInterface(String),
  #[error("Unknown property {interface}.{property}")]
  UnknownProperty { interface: String, property: String },
  #[error("Property {0} has an unexpected type")]
  TypeMismatch(String),
}

/// Typed property value, mirroring the D-Bus types MPRIS uses.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
  Bool(bool),
  Int(i32),
  Double(f64),
  Str(String),
  StrList(Vec<String>),
  Map(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
  pub fn into_bool(self) -> Option<bool> {
    match self {
      PropertyValue::Bool(b) => Some(b),
      _ => None,
    }
  }

  pub fn into_f64(self) -> Option<f64> {
    match self {
      PropertyValue::Double(d) => Some(d),
      _ => None,
    }
  }

  pub fn into_string(self) -> Option<String> {
    match self {
      PropertyValue::Str(s) => Some(s),
      _ => None,
    }
  }

  pub fn into_str_list(self) -> Option<Vec<String>> {
    match self {
      PropertyValue::StrList(list) => Some(list),
      _ => None,
    }
  }

  pub fn into_map(self) -> Option<BTreeMap<String, PropertyValue>> {
    match self {
      PropertyValue::Map(map) => Some(map),
      _ => None,
    }
  }
}

pub type Getter = fn(&PlayerState) -> PropertyValue;
pub type Setter = fn(&SharedPlayerState, PropertyValue);

/// Where a property's value comes from.
#[derive(Debug, Clone)]
pub enum PropertySource {
  Fixed(PropertyValue),
  Computed(Getter),
}

#[derive(Debug, Clone)]
pub struct Property {
  pub name: &'static str,
  pub source: PropertySource,
  /// No property is writable today; `Set` on them is accepted and ignored.
  pub setter: Option<Setter>,
  pub emits_change: bool,
}

impl Property {
  fn fixed(name: &'static str, value: PropertyValue) -> Self {
    Self {
      name,
      source: PropertySource::Fixed(value),
      setter: None,
      emits_change: false,
    }
  }

  fn computed(name: &'static str, getter: Getter) -> Self {
    Self {
      name,
      source: PropertySource::Computed(getter),
      setter: None,
      emits_change: true,
    }
  }

  fn resolve(&self, state: &PlayerState) -> PropertyValue {
    match &self.source {
      PropertySource::Fixed(value) => value.clone(),
      PropertySource::Computed(getter) => getter(state),
    }
  }
}

/// A `PropertiesChanged` signal waiting to be emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertiesChanged {
  pub interface: &'static str,
  pub changed: BTreeMap<String, PropertyValue>,
  pub invalidated: Vec<String>,
}

fn playback_status(state: &PlayerState) -> PropertyValue {
  PropertyValue::Str(state.status().as_mpris().to_string())
}

/// `xesam:` metadata map. Fields the renderer did not send are left out,
/// and so is artwork.
fn metadata(state: &PlayerState) -> PropertyValue {
  let meta = state.metadata();
  let mut map = BTreeMap::new();

  if let Some(title) = &meta.title {
    map.insert("xesam:title".to_string(), PropertyValue::Str(title.clone()));
  }
  if let Some(artist) = &meta.artist {
    map.insert(
      "xesam:artist".to_string(),
      PropertyValue::StrList(vec![artist.clone()]),
    );
  }
  if let Some(album) = &meta.album {
    map.insert("xesam:album".to_string(), PropertyValue::Str(album.clone()));
  }
  if let Some(number) = meta.track_number {
    map.insert("xesam:trackNumber".to_string(), PropertyValue::Int(number));
  }

  PropertyValue::Map(map)
}

fn root_properties() -> Vec<Property> {
  vec![
    Property::fixed("CanQuit", PropertyValue::Bool(false)),
    Property::fixed("CanRaise", PropertyValue::Bool(false)),
    Property::fixed("HasTrackList", PropertyValue::Bool(false)),
    Property::fixed("Identity", PropertyValue::Str(IDENTITY.to_string())),
    Property::fixed("DesktopEntry", PropertyValue::Str(DESKTOP_ENTRY.to_string())),
    Property::fixed("SupportedUriSchemes", PropertyValue::StrList(Vec::new())),
    Property::fixed("SupportedMimeTypes", PropertyValue::StrList(Vec::new())),
  ]
}

fn player_properties() -> Vec<Property> {
  vec![
    Property::computed("PlaybackStatus", playback_status),
    Property::computed("Metadata", metadata),
    Property::fixed("Rate", PropertyValue::Double(1.0)),
    Property::fixed("MinimumRate", PropertyValue::Double(1.0)),
    Property::fixed("MaximumRate", PropertyValue::Double(1.0)),
    Property::fixed("CanGoNext", PropertyValue::Bool(false)),
    Property::fixed("CanGoPrevious", PropertyValue::Bool(false)),
    Property::fixed("CanPlay", PropertyValue::Bool(true)),
    Property::fixed("CanPause", PropertyValue::Bool(false)),
    Property::fixed("CanSeek", PropertyValue::Bool(false)),
    Property::fixed("CanControl", PropertyValue::Bool(false)),
  ]
}

/// Maps player state onto the MPRIS property tables.
pub struct PropertyBridge {
  state: SharedPlayerState,
  tables: HashMap<&'static str, Vec<Property>>,
  /// Last values broadcast per (interface, property); decides what changed.
  snapshot: Mutex<HashMap<(&'static str, &'static str), PropertyValue>>,
  changes_tx: Sender<PropertiesChanged>,
  changes_rx: Receiver<PropertiesChanged>,
}

impl PropertyBridge {
  pub fn new(state: SharedPlayerState) -> Self {
    let mut tables = HashMap::new();
    tables.insert(ROOT_INTERFACE, root_properties());
    tables.insert(PLAYER_INTERFACE, player_properties());

    let (changes_tx, changes_rx) = async_channel::unbounded();

    let bridge = Self {
      state,
      tables,
      snapshot: Mutex::new(HashMap::new()),
      changes_tx,
      changes_rx,
    };

    // Seed with the initial values so only real changes are broadcast.
    let current = bridge.state.snapshot();
    {
      let mut snapshot = bridge.snapshot.lock();
      for (interface, properties) in &bridge.tables {
        for property in properties.iter().filter(|p| p.emits_change) {
          snapshot.insert((*interface, property.name), property.resolve(&current));
        }
      }
    }

    bridge
  }

  pub fn state(&self) -> &SharedPlayerState {
    &self.state
  }

  /// Receiver for queued change signals.
  pub fn subscribe(&self) -> Receiver<PropertiesChanged> {
    self.changes_rx.clone()
  }

  fn table(&self, interface: &str) -> Result<(&'static str, &[Property]), BridgeError> {
    self
      .tables
      .get_key_value(interface)
      .map(|(name, properties)| (*name, properties.as_slice()))
      .ok_or_else(|| BridgeError::UnknownInterface(interface.to_string()))
  }

  fn lookup(&self, interface: &str, name: &str) -> Result<(&'static str, &Property), BridgeError> {
    let (interface_name, properties) = self.table(interface)?;
    properties
      .iter()
      .find(|p| p.name == name)
      .map(|p| (interface_name, p))
      .ok_or_else(|| BridgeError::UnknownProperty {
        interface: interface.to_string(),
        property: name.to_string(),
      })
  }

  /// Current value of one property.
  pub fn get(&self, interface: &str, name: &str) -> Result<PropertyValue, BridgeError> {
    let (_, property) = self.lookup(interface, name)?;
    Ok(self.state.read(|state| property.resolve(state)))
  }

  /// Every property of `interface`, resolved against one state snapshot.
  pub fn get_all(&self, interface: &str) -> Result<BTreeMap<String, PropertyValue>, BridgeError> {
    let (_, properties) = self.table(interface)?;
    let state = self.state.snapshot();
    Ok(
      properties
        .iter()
        .map(|p| (p.name.to_string(), p.resolve(&state)))
        .collect(),
    )
  }

  /// Write a property. Properties without a setter ignore the write.
  pub fn set(&self, interface: &str, name: &str, value: PropertyValue) -> Result<(), BridgeError> {
    let (_, property) = self.lookup(interface, name)?;
    match property.setter {
      Some(setter) => setter(&self.state, value),
      None => log::debug!("Ignoring Set {}.{} = {:?}", interface, name, value),
    }
    Ok(())
  }

  /// Recompute one property and broadcast it unconditionally.
  pub fn notify(&self, interface: &str, name: &str) -> Result<PropertyValue, BridgeError> {
    let (interface_name, property) = self.lookup(interface, name)?;
    let value = self.state.read(|state| property.resolve(state));
    log::debug!("Updated property: {} = {:?}", name, value);

    self
      .snapshot
      .lock()
      .insert((interface_name, property.name), value.clone());

    let mut changed = BTreeMap::new();
    changed.insert(property.name.to_string(), value.clone());
    self.emit(interface_name, changed);

    Ok(value)
  }

  /// Broadcast every change-emitting property whose value differs from
  /// the last broadcast. Returns the names that changed.
  pub fn sync(&self, interface: &str) -> Result<Vec<&'static str>, BridgeError> {
    let (interface_name, properties) = self.table(interface)?;
    let state = self.state.snapshot();

    let mut changed = BTreeMap::new();
    let mut names = Vec::new();
    {
      let mut snapshot = self.snapshot.lock();
      for property in properties.iter().filter(|p| p.emits_change) {
        let value = property.resolve(&state);
        let key = (interface_name, property.name);
        if snapshot.get(&key) != Some(&value) {
          snapshot.insert(key, value.clone());
          changed.insert(property.name.to_string(), value);
          names.push(property.name);
        }
      }
    }

    if !changed.is_empty() {
      log::debug!("Properties changed on {}: {:?}", interface_name, names);
      self.emit(interface_name, changed);
    }
    Ok(names)
  }

  fn emit(&self, interface: &'static str, changed: BTreeMap<String, PropertyValue>) {
    let signal = PropertiesChanged {
      interface,
      changed,
      invalidated: Vec::new(),
    };
    if let Err(e) = self.changes_tx.try_send(signal) {
      log::warn!("Dropping property change: {}", e);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::player::{PlaybackStatus, TrackMetadata};
  use crate::renderer::RendererEvent;

  fn bridge() -> PropertyBridge {
    PropertyBridge::new(SharedPlayerState::new())
  }

  fn playing_song(bridge: &PropertyBridge) {
    bridge.state().apply_all(&[
      RendererEvent::PlaybackStatusChanged(PlaybackStatus::Playing),
      RendererEvent::TrackChanged("http://host/a.flac".to_string()),
      RendererEvent::MetadataChanged(TrackMetadata {
        title: Some("Song A".to_string()),
        artist: Some("Artist B".to_string()),
        album: Some("Album C".to_string()),
        track_number: Some(4),
        art_urls: vec!["http://x/art.jpg".to_string()],
      }),
    ]);
  }

  #[test]
  fn test_fixed_properties() {
    let bridge = bridge();
    assert_eq!(
      bridge.get(ROOT_INTERFACE, "Identity").unwrap(),
      PropertyValue::Str("dlna client".to_string())
    );
    assert_eq!(
      bridge.get(PLAYER_INTERFACE, "CanPlay").unwrap(),
      PropertyValue::Bool(true)
    );
    assert_eq!(
      bridge.get(PLAYER_INTERFACE, "Rate").unwrap(),
      PropertyValue::Double(1.0)
    );
  }

  #[test]
  fn test_unknown_lookups() {
    let bridge = bridge();
    assert!(matches!(
      bridge.get(PLAYER_INTERFACE, "Volume"),
      Err(BridgeError::UnknownProperty { .. })
    ));
    assert!(matches!(
      bridge.get("org.example.Nope", "CanPlay"),
      Err(BridgeError::UnknownInterface(_))
    ));
    assert!(bridge.get(ROOT_INTERFACE, "PlaybackStatus").is_err());
  }

  #[test]
  fn test_playback_status_labels() {
    let bridge = bridge();
    let cases = [
      (PlaybackStatus::Stopped, "Stopped"),
      (PlaybackStatus::Paused, "Paused"),
      (PlaybackStatus::Playing, "Playing"),
      (PlaybackStatus::Unknown, "Unknown"),
    ];
    for (status, label) in cases {
      bridge
        .state()
        .apply_all(&[RendererEvent::PlaybackStatusChanged(status)]);
      assert_eq!(
        bridge.get(PLAYER_INTERFACE, "PlaybackStatus").unwrap(),
        PropertyValue::Str(label.to_string())
      );
    }
  }

  #[test]
  fn test_metadata_map() {
    let bridge = bridge();
    playing_song(&bridge);

    let map = bridge
      .get(PLAYER_INTERFACE, "Metadata")
      .unwrap()
      .into_map()
      .unwrap();
    assert_eq!(map.len(), 4);
    assert_eq!(map["xesam:title"], PropertyValue::Str("Song A".to_string()));
    assert_eq!(
      map["xesam:artist"],
      PropertyValue::StrList(vec!["Artist B".to_string()])
    );
    assert_eq!(map["xesam:album"], PropertyValue::Str("Album C".to_string()));
    assert_eq!(map["xesam:trackNumber"], PropertyValue::Int(4));
  }

  #[test]
  fn test_get_all() {
    let bridge = bridge();
    let root = bridge.get_all(ROOT_INTERFACE).unwrap();
    assert_eq!(root.len(), 7);
    assert_eq!(root["CanQuit"], PropertyValue::Bool(false));

    let player = bridge.get_all(PLAYER_INTERFACE).unwrap();
    assert_eq!(player.len(), 11);
    assert_eq!(
      player["PlaybackStatus"],
      PropertyValue::Str("Stopped".to_string())
    );
    assert_eq!(player["Metadata"], PropertyValue::Map(BTreeMap::new()));
  }

  #[test]
  fn test_set_is_ignored() {
    let bridge = bridge();
    bridge
      .set(PLAYER_INTERFACE, "Rate", PropertyValue::Double(2.0))
      .unwrap();
    assert_eq!(
      bridge.get(PLAYER_INTERFACE, "Rate").unwrap(),
      PropertyValue::Double(1.0)
    );
    assert!(bridge
      .set(PLAYER_INTERFACE, "Shuffle", PropertyValue::Bool(true))
      .is_err());
  }

  #[test]
  fn test_notify_emits_signal() {
    let bridge = bridge();
    let rx = bridge.subscribe();

    let value = bridge.notify(PLAYER_INTERFACE, "PlaybackStatus").unwrap();
    assert_eq!(value, PropertyValue::Str("Stopped".to_string()));

    let signal = rx.try_recv().unwrap();
    assert_eq!(signal.interface, PLAYER_INTERFACE);
    assert_eq!(signal.changed.len(), 1);
    assert_eq!(signal.changed["PlaybackStatus"], value);
    assert!(signal.invalidated.is_empty());
  }

  #[test]
  fn test_sync_emits_only_changes() {
    let bridge = bridge();
    let rx = bridge.subscribe();

    assert!(bridge.sync(PLAYER_INTERFACE).unwrap().is_empty());
    assert!(rx.try_recv().is_err());

    playing_song(&bridge);
    let names = bridge.sync(PLAYER_INTERFACE).unwrap();
    assert_eq!(names, vec!["PlaybackStatus", "Metadata"]);

    let signal = rx.try_recv().unwrap();
    assert_eq!(signal.changed.len(), 2);
    assert!(signal.changed.contains_key("Metadata"));

    // Same state again: nothing to broadcast.
    assert!(bridge.sync(PLAYER_INTERFACE).unwrap().is_empty());
    assert!(rx.try_recv().is_err());
  }

  #[test]
  fn test_sync_root_never_emits() {
    let bridge = bridge();
    let rx = bridge.subscribe();
    playing_song(&bridge);
    assert!(bridge.sync(ROOT_INTERFACE).unwrap().is_empty());
    assert!(rx.try_recv().is_err());
  }
}
