//! gmediarender status protocol.
//!
//! With `--logfile=stdout` the renderer prints one XML fragment per line
//! whenever an AVTransport state variable changes, e.g.
//! `<TransportState val="PLAYING"/>`. Anything else on stdout is noise.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

use super::didl::parse_didl;
use crate::player::{PlaybackStatus, TrackMetadata};

const TRANSPORT_STATE: &[u8] = b"TransportState";
const CURRENT_TRACK_URI: &[u8] = b"CurrentTrackURI";
const CURRENT_TRACK_METADATA: &[u8] = b"CurrentTrackMetaData";

#[derive(Error, Debug)]
pub enum ProtocolError {
  #[error("Line is not valid UTF-8")]
  Encoding(#[from] std::str::Utf8Error),
  #[error("XML error: {0}")]
  Xml(#[from] quick_xml::Error),
  #[error("Bad val attribute: {0}")]
  Attribute(String),
  #[error("Unclosed element at end of line")]
  Unclosed,
}

/// Typed event decoded from a renderer line.
#[derive(Debug, Clone, PartialEq)]
pub enum RendererEvent {
  PlaybackStatusChanged(PlaybackStatus),
  /// Playback stopped, there is no current track any more.
  TrackCleared,
  /// A new track URI was loaded. Implies a metadata reset.
  TrackChanged(String),
  MetadataChanged(TrackMetadata),
}

/// Result of decoding one line.
#[derive(Debug)]
pub enum LineOutcome {
  Events(Vec<RendererEvent>),
  /// Not XML, or XML without any field we know.
  NoEvent,
  /// Looked like XML but could not be parsed.
  Malformed(ProtocolError),
}

impl LineOutcome {
  pub fn into_events(self) -> Vec<RendererEvent> {
    match self {
      LineOutcome::Events(events) => events,
      LineOutcome::NoEvent | LineOutcome::Malformed(_) => Vec::new(),
    }
  }
}

/// `val` attributes of the fields we probe for, first occurrence wins.
#[derive(Debug, Default)]
struct Fields {
  transport_state: Option<String>,
  track_uri: Option<String>,
  track_metadata: Option<String>,
}

impl Fields {
  fn collect(&mut self, element: &BytesStart<'_>) -> Result<(), ProtocolError> {
    let slot = match element.local_name().as_ref() {
      TRANSPORT_STATE => &mut self.transport_state,
      CURRENT_TRACK_URI => &mut self.track_uri,
      CURRENT_TRACK_METADATA => &mut self.track_metadata,
      _ => return Ok(()),
    };

    if slot.is_some() {
      return Ok(());
    }

    let attr = element
      .try_get_attribute("val")
      .map_err(|e| ProtocolError::Attribute(e.to_string()))?;
    if let Some(attr) = attr {
      let value = attr
        .unescape_value()
        .map_err(|e| ProtocolError::Attribute(e.to_string()))?;
      *slot = Some(value.into_owned());
    }
    Ok(())
  }
}

fn scan(text: &str) -> Result<Fields, ProtocolError> {
  let mut reader = Reader::from_str(text);
  let mut fields = Fields::default();
  let mut depth = 0usize;

  loop {
    match reader.read_event()? {
      Event::Start(e) => {
        depth += 1;
        fields.collect(&e)?;
      }
      Event::Empty(e) => fields.collect(&e)?,
      Event::End(_) => depth = depth.saturating_sub(1),
      Event::Eof => break,
      _ => {}
    }
  }

  if depth != 0 {
    return Err(ProtocolError::Unclosed);
  }
  Ok(fields)
}

/// Decode one line of renderer output.
pub fn parse_line(line: &[u8]) -> LineOutcome {
  let line = line.trim_ascii_end();
  if !line.starts_with(b"<") {
    return LineOutcome::NoEvent;
  }

  let fields = match std::str::from_utf8(line)
    .map_err(ProtocolError::from)
    .and_then(scan)
  {
    Ok(fields) => fields,
    Err(e) => return LineOutcome::Malformed(e),
  };

  let mut events = Vec::new();

  if let Some(state) = fields.transport_state {
    let status = PlaybackStatus::from_transport_state(&state);
    events.push(RendererEvent::PlaybackStatusChanged(status));
    if status == PlaybackStatus::Stopped {
      events.push(RendererEvent::TrackCleared);
    }
  }

  if let Some(uri) = fields.track_uri {
    events.push(RendererEvent::TrackChanged(uri));
  }

  if let Some(document) = fields.track_metadata {
    match parse_didl(&document) {
      Ok(Some(metadata)) => events.push(RendererEvent::MetadataChanged(metadata)),
      Ok(None) => log::debug!("Track metadata without item, skipped"),
      Err(e) => log::debug!("Skipping track metadata: {}", e),
    }
  }

  if events.is_empty() {
    LineOutcome::NoEvent
  } else {
    LineOutcome::Events(events)
  }
}

/// Decode one line, dropping anything that is not an event.
pub fn parse(line: &[u8]) -> Vec<RendererEvent> {
  parse_line(line).into_events()
}
