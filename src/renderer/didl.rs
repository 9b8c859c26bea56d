//! DIDL-Lite track metadata carried in `CurrentTrackMetaData`.
//!
//! Reference: UPnP ContentDirectory:4, DIDL-Lite schema.
//!
//! Fields are pulled out one by one so that an odd shape in one of them
//! (repeated, interleaved, or wrapping markup) never costs the others.

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesRef, Event};
use quick_xml::Reader;
use thiserror::Error;

use crate::player::TrackMetadata;

#[derive(Error, Debug)]
pub enum DidlError {
  #[error("Invalid DIDL-Lite document: {0}")]
  Xml(#[from] quick_xml::Error),
  #[error("Unclosed element in DIDL-Lite document")]
  Unclosed,
}

/// Item children we map, matched by local name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
  Title,
  Creator,
  Album,
  TrackNumber,
  AlbumArt,
}

impl Field {
  fn from_local_name(name: &[u8]) -> Option<Self> {
    match name {
      b"title" => Some(Field::Title),
      b"creator" => Some(Field::Creator),
      b"album" => Some(Field::Album),
      b"originalTrackNumber" => Some(Field::TrackNumber),
      b"albumArtURI" => Some(Field::AlbumArt),
      _ => None,
    }
  }
}

/// Raw text of every mapped child of the first item, in document order.
#[derive(Debug, Default)]
struct RawItem {
  values: Vec<(Field, String)>,
}

impl RawItem {
  fn all(&self, field: Field) -> impl Iterator<Item = &str> {
    self
      .values
      .iter()
      .filter(move |(f, _)| *f == field)
      .map(|(_, v)| v.trim())
      .filter(|v| !v.is_empty())
  }

  fn first(&self, field: Field) -> Option<String> {
    self.all(field).next().map(str::to_string)
  }

  fn into_metadata(self) -> TrackMetadata {
    let creators: Vec<&str> = self.all(Field::Creator).collect();
    let artist = if creators.is_empty() {
      None
    } else {
      Some(creators.join(", "))
    };

    let track_number = self
      .all(Field::TrackNumber)
      .next()
      .and_then(|n| n.parse::<i32>().ok());

    // Collected only, nothing fetches artwork yet.
    let art_urls = self
      .all(Field::AlbumArt)
      .filter(|uri| uri.starts_with("http"))
      .map(str::to_string)
      .collect();

    TrackMetadata {
      title: self.first(Field::Title),
      artist,
      album: self.first(Field::Album),
      track_number,
      art_urls,
    }
  }
}

fn push_reference(text: &mut String, reference: &BytesRef<'_>) {
  match reference.resolve_char_ref() {
    Ok(Some(c)) => text.push(c),
    Ok(None) => match reference.decode() {
      Ok(name) => match resolve_predefined_entity(&name) {
        Some(value) => text.push_str(value),
        None => log::debug!("Unknown entity &{};", name),
      },
      Err(e) => log::debug!("Undecodable entity: {}", e),
    },
    Err(e) => log::debug!("Bad character reference: {}", e),
  }
}

/// Extract the metadata of the document's item.
///
/// Returns `Ok(None)` when the document holds no item.
pub fn parse_didl(document: &str) -> Result<Option<TrackMetadata>, DidlError> {
  let mut reader = Reader::from_str(document);
  let mut depth = 0usize;
  let mut items = 0usize;
  let mut item: Option<RawItem> = None;
  // Depth of the first item while it is open.
  let mut item_depth: Option<usize> = None;
  // Field being read, with the depth of its element.
  let mut current: Option<(Field, usize, String)> = None;

  loop {
    match reader.read_event()? {
      Event::Start(e) => {
        depth += 1;
        let name = e.local_name();
        if name.as_ref() == b"item" {
          items += 1;
          if item.is_none() {
            item = Some(RawItem::default());
            item_depth = Some(depth);
          }
        } else if current.is_none() && item_depth.map(|d| d + 1) == Some(depth) {
          if let Some(field) = Field::from_local_name(name.as_ref()) {
            current = Some((field, depth, String::new()));
          }
        }
      }
      Event::Empty(e) => {
        if e.local_name().as_ref() == b"item" {
          items += 1;
          item.get_or_insert_with(RawItem::default);
        }
      }
      Event::Text(t) => {
        if let Some((_, _, text)) = current.as_mut() {
          match t.decode() {
            Ok(value) => text.push_str(&value),
            Err(e) => log::debug!("Undecodable DIDL-Lite text: {}", e),
          }
        }
      }
      Event::CData(c) => {
        if let Some((_, _, text)) = current.as_mut() {
          text.push_str(&String::from_utf8_lossy(&c));
        }
      }
      Event::GeneralRef(r) => {
        if let Some((_, _, text)) = current.as_mut() {
          push_reference(text, &r);
        }
      }
      Event::End(_) => {
        if current.as_ref().is_some_and(|(_, d, _)| *d == depth) {
          if let (Some((field, _, text)), Some(raw)) = (current.take(), item.as_mut()) {
            raw.values.push((field, text));
          }
        }
        if item_depth == Some(depth) {
          item_depth = None;
        }
        depth = depth.saturating_sub(1);
      }
      Event::Eof => break,
      _ => {}
    }
  }

  if depth != 0 {
    return Err(DidlError::Unclosed);
  }

  if items > 1 {
    log::debug!("DIDL-Lite has {} items, using the first", items);
  }

  Ok(item.map(RawItem::into_metadata))
}

#[cfg(test)]
mod tests {
  use super::*;

  const HEADER: &str = r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:upnp="urn:schemas-upnp-org:metadata-1-0/upnp/">"#;

  fn doc(item: &str) -> String {
    format!("{}{}</DIDL-Lite>", HEADER, item)
  }

  fn item(children: &str) -> TrackMetadata {
    let xml = doc(&format!(r#"<item id="1" parentID="0">{}</item>"#, children));
    parse_didl(&xml).unwrap().unwrap()
  }

  #[test]
  fn test_full_item() {
    let xml = doc(
      r#"<item id="1" parentID="0" restricted="1">
        <dc:title>Song A</dc:title>
        <dc:creator>Artist B</dc:creator>
        <upnp:album>Album C</upnp:album>
        <upnp:originalTrackNumber>4</upnp:originalTrackNumber>
        <upnp:albumArtURI dlna:profileID="JPEG_TN" xmlns:dlna="urn:schemas-dlna-org:metadata-1-0/">http://x/art.jpg</upnp:albumArtURI>
        <upnp:albumArtURI>file:///local.jpg</upnp:albumArtURI>
        <upnp:class>object.item.audioItem.musicTrack</upnp:class>
        <res protocolInfo="http-get:*:audio/flac:*">http://x/track.flac</res>
      </item>"#,
    );

    let meta = parse_didl(&xml).unwrap().unwrap();
    assert_eq!(meta.title.as_deref(), Some("Song A"));
    assert_eq!(meta.artist.as_deref(), Some("Artist B"));
    assert_eq!(meta.album.as_deref(), Some("Album C"));
    assert_eq!(meta.track_number, Some(4));
    assert_eq!(meta.art_urls, vec!["http://x/art.jpg".to_string()]);
  }

  #[test]
  fn test_missing_fields_are_none() {
    let meta = item("<dc:title>Only Title</dc:title>");
    assert_eq!(meta.title.as_deref(), Some("Only Title"));
    assert_eq!(meta.artist, None);
    assert_eq!(meta.album, None);
    assert_eq!(meta.track_number, None);
    assert!(meta.art_urls.is_empty());
  }

  #[test]
  fn test_bad_track_number_keeps_other_fields() {
    let meta = item(
      "<dc:title>Song</dc:title>
      <upnp:originalTrackNumber>four</upnp:originalTrackNumber>",
    );
    assert_eq!(meta.title.as_deref(), Some("Song"));
    assert_eq!(meta.track_number, None);
  }

  #[test]
  fn test_multiple_creators_joined() {
    let meta = item("<dc:creator>One</dc:creator><dc:creator>Two</dc:creator>");
    assert_eq!(meta.artist.as_deref(), Some("One, Two"));
  }

  #[test]
  fn test_interleaved_creators() {
    let meta = item(
      "<dc:creator>A</dc:creator>
      <upnp:artist>A</upnp:artist>
      <dc:creator>B</dc:creator>
      <upnp:album>Album</upnp:album>",
    );
    assert_eq!(meta.artist.as_deref(), Some("A, B"));
    assert_eq!(meta.album.as_deref(), Some("Album"));
  }

  #[test]
  fn test_split_album_art_entries() {
    let meta = item(
      "<upnp:albumArtURI>http://x/1.jpg</upnp:albumArtURI>
      <upnp:album>Album</upnp:album>
      <upnp:albumArtURI>https://x/2.jpg</upnp:albumArtURI>",
    );
    assert_eq!(
      meta.art_urls,
      vec!["http://x/1.jpg".to_string(), "https://x/2.jpg".to_string()]
    );
    assert_eq!(meta.album.as_deref(), Some("Album"));
  }

  #[test]
  fn test_repeated_title_uses_first() {
    let meta = item(
      "<dc:title>First</dc:title>
      <dc:title>Second</dc:title>
      <upnp:album>Album</upnp:album>",
    );
    assert_eq!(meta.title.as_deref(), Some("First"));
    assert_eq!(meta.album.as_deref(), Some("Album"));
  }

  #[test]
  fn test_title_with_markup() {
    let meta = item("<dc:title><b>T</b>ail</dc:title><upnp:album>Album</upnp:album>");
    assert_eq!(meta.title.as_deref(), Some("Tail"));
    assert_eq!(meta.album.as_deref(), Some("Album"));
  }

  #[test]
  fn test_entities_in_text() {
    let meta = item("<dc:title>Rock &amp; Roll &#x263A;</dc:title>");
    assert_eq!(meta.title.as_deref(), Some("Rock & Roll \u{263A}"));
  }

  #[test]
  fn test_second_item_ignored() {
    let xml = doc(concat!(
      r#"<item id="1"><dc:title>One</dc:title></item>"#,
      r#"<item id="2"><dc:title>Two</dc:title><upnp:album>Other</upnp:album></item>"#,
    ));
    let meta = parse_didl(&xml).unwrap().unwrap();
    assert_eq!(meta.title.as_deref(), Some("One"));
    assert_eq!(meta.album, None);
  }

  #[test]
  fn test_no_item() {
    assert!(parse_didl(&doc("")).unwrap().is_none());
  }

  #[test]
  fn test_garbage_is_error() {
    assert!(parse_didl("<DIDL-Lite><item>").is_err());
  }
}
