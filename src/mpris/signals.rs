//! Forwarding of queued property changes onto the bus.

use std::collections::HashMap;

use async_channel::Receiver;
use zbus::zvariant::Value;
use zbus::Connection;

use super::MPRIS_PATH;
use crate::player::{PropertiesChanged, PropertyValue};

const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

impl From<PropertyValue> for Value<'static> {
  fn from(value: PropertyValue) -> Self {
    match value {
      PropertyValue::Bool(b) => Value::from(b),
      PropertyValue::Int(i) => Value::from(i),
      PropertyValue::Double(d) => Value::from(d),
      PropertyValue::Str(s) => Value::from(s),
      PropertyValue::StrList(list) => Value::from(list),
      PropertyValue::Map(map) => Value::from(to_dict(map)),
    }
  }
}

fn to_dict<K: Into<String>>(
  entries: impl IntoIterator<Item = (K, PropertyValue)>,
) -> HashMap<String, Value<'static>> {
  entries
    .into_iter()
    .map(|(key, value)| (key.into(), Value::from(value)))
    .collect()
}

/// Emit every queued [`PropertiesChanged`] record until the channel closes.
pub async fn forward_changes(connection: Connection, changes: Receiver<PropertiesChanged>) {
  while let Ok(change) = changes.recv().await {
    let changed = to_dict(change.changed);
    log::debug!(
      "Emitting PropertiesChanged on {}: {:?}",
      change.interface,
      changed.keys().collect::<Vec<_>>()
    );

    let body = (change.interface, changed, change.invalidated);
    if let Err(e) = connection
      .emit_signal(
        None::<&str>,
        MPRIS_PATH,
        PROPERTIES_INTERFACE,
        "PropertiesChanged",
        &body,
      )
      .await
    {
      log::warn!("Failed to emit PropertiesChanged: {}", e);
    }
  }
  log::debug!("Property change channel closed");
}
