//! Station catalog loader.
//!
//! The catalog is a UTF-8 JSON object; every key names a station and every
//! value describes it:
//!
//! ```json
//! {
//!   "Radio Paradise": {
//!     "url": "http://stream.radioparadise.com/aac-320",
//!     "logo-url": "https://radioparadise.com/logo.png",
//!     "meta_key_1": "title",
//!     "meta_key_2": "artist",
//!     "background-color-normal": "#202020"
//!   }
//! }
//! ```
//!
//! Inline (`logo`) and local (`logo-file`) artwork is resolved here, while
//! reading. Remote artwork (`logo-url`) is only validated; the station comes
//! back with `logo_pending` set and the fetch is left to the caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::color::{self, Color};
use crate::error::{CatalogError, LogoError, StationRejected};
use crate::fetcher::parse_http_url;
use crate::station::{ImageBytes, LogoSource, StationRecord};

/// Raw shape of one catalog entry. Kept apart from `StationRecord` so the
/// file format can change without touching the rest of the crate.
#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    logo: Option<String>,
    #[serde(default, rename = "logo-file")]
    logo_file: Option<String>,
    #[serde(default, rename = "logo-url")]
    logo_url: Option<String>,
    #[serde(default)]
    meta_key_1: Option<String>,
    #[serde(default)]
    meta_key_2: Option<String>,
    // Colours stay untyped: a wrong type must not reject the entry.
    #[serde(default, rename = "background-color-normal")]
    color_normal: Option<Value>,
    #[serde(default, rename = "background-color-checked")]
    color_checked: Option<Value>,
}

/// Read the catalog at `path` and keep at most `slot_count` stations.
///
/// Never fails: an unreadable or malformed catalog is logged and yields no
/// stations, leaving it to the caller to report "no stations available".
pub fn load(path: &Path, slot_count: usize) -> Vec<StationRecord> {
    let mut stations = match read_catalog(path) {
        Ok(stations) => stations,
        Err(e) => {
            warn!("catalog: {}", e);
            return Vec::new();
        }
    };

    if stations.len() > slot_count {
        warn!(
            "catalog: {} stations but only {} slots, ignoring the last {}",
            stations.len(),
            slot_count,
            stations.len() - slot_count
        );
        stations.truncate(slot_count);
    }

    info!("catalog: loaded {} stations from {:?}", stations.len(), path);
    stations
}

pub fn read_catalog(path: &Path) -> Result<Vec<StationRecord>, CatalogError> {
    let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    parse_catalog_str(&content)
}

/// Parse catalog text into valid stations, ordered by station name.
pub fn parse_catalog_str(content: &str) -> Result<Vec<StationRecord>, CatalogError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let Value::Object(map) = serde_json::from_str::<Value>(content)? else {
        return Err(CatalogError::NotAnObject);
    };

    let mut entries: Vec<(String, Value)> = map.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut stations = Vec::with_capacity(entries.len());
    for (name, value) in entries {
        match parse_station(&name, value) {
            Ok(station) => {
                debug!("catalog: {:?} with {} logo", name, station.logo_source.kind());
                stations.push(station);
            }
            Err(reason) => debug!("catalog: skipping {:?}: {}", name, reason),
        }
    }
    Ok(stations)
}

fn parse_station(name: &str, value: Value) -> Result<StationRecord, StationRejected> {
    let entry: CatalogEntry =
        serde_json::from_value(value).map_err(|_| StationRejected::NotAnObject)?;

    let stream_url = non_empty(entry.url.as_deref()).ok_or(StationRejected::MissingStreamUrl)?;
    let first_key = non_empty(entry.meta_key_1.as_deref())
        .ok_or(StationRejected::MissingMetadataKey("meta_key_1"))?;
    let second_key = non_empty(entry.meta_key_2.as_deref())
        .ok_or(StationRejected::MissingMetadataKey("meta_key_2"))?;
    let (logo_source, resolved_logo, logo_pending) = resolve_logo(name, &entry)?;

    let mut station = StationRecord::new(name, stream_url, logo_source, first_key, second_key);
    station.resolved_logo = resolved_logo;
    station.logo_pending = logo_pending;
    station.color_normal = color_field(entry.color_normal.as_ref(), color::DEFAULT_NORMAL);
    station.color_checked = color_field(entry.color_checked.as_ref(), color::DEFAULT_CHECKED);
    Ok(station)
}

/// Pick the highest-precedence logo field: `logo`, then `logo-file`, then
/// `logo-url`. Artwork that cannot be produced leaves the station without a
/// logo; only a missing logo field rejects the entry.
fn resolve_logo(
    name: &str,
    entry: &CatalogEntry,
) -> Result<(LogoSource, Option<ImageBytes>, bool), StationRejected> {
    if let Some(encoded) = &entry.logo {
        let payload: Arc<[u8]> = match decode_inline_logo(encoded) {
            Ok(bytes) => bytes.into(),
            Err(e) => {
                warn!("catalog: {:?}: {}", name, e);
                return Ok((LogoSource::Inline(Arc::<[u8]>::from(Vec::new())), None, false));
            }
        };
        let logo = unresolved_as_none(name, ImageBytes::decode(payload.to_vec()));
        return Ok((LogoSource::Inline(payload), logo, false));
    }

    if let Some(path) = &entry.logo_file {
        let path = PathBuf::from(path);
        let logo = unresolved_as_none(name, load_logo_file(&path));
        return Ok((LogoSource::LocalFile(path), logo, false));
    }

    if let Some(url) = &entry.logo_url {
        return Ok(match parse_http_url(url) {
            Some(parsed) => (LogoSource::RemoteUrl(parsed.to_string()), None, true),
            None => {
                warn!("catalog: {:?}: {}", name, LogoError::InvalidUrl(url.clone()));
                (LogoSource::RemoteUrl(url.clone()), None, false)
            }
        });
    }

    Err(StationRejected::MissingLogo)
}

/// Base64-decode an inline logo, ignoring embedded whitespace.
pub fn decode_inline_logo(encoded: &str) -> Result<Vec<u8>, LogoError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| LogoError::Base64(e.to_string()))
}

pub fn load_logo_file(path: &Path) -> Result<ImageBytes, LogoError> {
    let data = std::fs::read(path).map_err(|e| LogoError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    ImageBytes::decode(data)
}

fn unresolved_as_none(name: &str, logo: Result<ImageBytes, LogoError>) -> Option<ImageBytes> {
    logo.map_err(|e| warn!("catalog: {:?}: logo unresolved: {}", name, e))
        .ok()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

fn color_field(value: Option<&Value>, default: Color) -> Color {
    Color::parse_or(value.and_then(Value::as_str), default)
}
