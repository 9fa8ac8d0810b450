use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::color::{self, Color};
use crate::error::LogoError;

/// Identity of one station binding inside the registry.
///
/// A fresh id is issued every time a slot is (re)assigned, so a completion
/// carrying an old id can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct StationId(pub u64);

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Decoded station artwork.
///
/// Holds the encoded payload (shared, cheap to clone) together with what the
/// decoder learned about it. Construction always goes through
/// [`ImageBytes::decode`], so an `ImageBytes` is known to be a valid image.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageBytes {
    data: Arc<[u8]>,
    format: image::ImageFormat,
    width: u32,
    height: u32,
}

impl ImageBytes {
    pub fn decode(data: impl Into<Vec<u8>>) -> Result<Self, LogoError> {
        let data: Vec<u8> = data.into();
        let format = image::guess_format(&data).map_err(|e| LogoError::Decode(e.to_string()))?;
        let decoded = image::load_from_memory_with_format(&data, format)
            .map_err(|e| LogoError::Decode(e.to_string()))?;
        Ok(Self {
            width: decoded.width(),
            height: decoded.height(),
            format,
            data: data.into(),
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn format(&self) -> image::ImageFormat {
        self.format
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl fmt::Debug for ImageBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBytes")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Where the catalog said the station artwork comes from.
///
/// Only the highest-precedence field of a catalog entry is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoSource {
    /// `logo`: base64 payload embedded in the catalog, already decoded from base64.
    Inline(Arc<[u8]>),
    /// `logo-file`: image on the local filesystem.
    LocalFile(PathBuf),
    /// `logo-url`: image fetched over http(s) after startup.
    RemoteUrl(String),
}

impl LogoSource {
    pub fn kind(&self) -> &'static str {
        match self {
            LogoSource::Inline(_) => "inline",
            LogoSource::LocalFile(_) => "file",
            LogoSource::RemoteUrl(_) => "url",
        }
    }
}

/// One playable station as described by the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct StationRecord {
    /// Assigned by the registry; `StationId::default()` until then.
    pub id: StationId,
    /// Catalog key, shown whenever no artwork or metadata is available.
    pub display_name: String,
    pub stream_url: String,
    pub logo_source: LogoSource,
    pub resolved_logo: Option<ImageBytes>,
    /// True while a remote logo fetch has been requested but not settled.
    pub logo_pending: bool,
    /// Stream metadata key whose value replaces the display title.
    pub first_metadata_key: String,
    /// Stream metadata key whose value becomes the display subtitle.
    pub second_metadata_key: String,
    pub color_normal: Color,
    pub color_checked: Color,
}

impl StationRecord {
    pub fn new(
        display_name: impl Into<String>,
        stream_url: impl Into<String>,
        logo_source: LogoSource,
        first_metadata_key: impl Into<String>,
        second_metadata_key: impl Into<String>,
    ) -> Self {
        Self {
            id: StationId::default(),
            display_name: display_name.into(),
            stream_url: stream_url.into(),
            logo_source,
            resolved_logo: None,
            logo_pending: false,
            first_metadata_key: first_metadata_key.into(),
            second_metadata_key: second_metadata_key.into(),
            color_normal: color::DEFAULT_NORMAL,
            color_checked: color::DEFAULT_CHECKED,
        }
    }

    /// Remote logo url still waiting for a fetch.
    pub fn pending_logo_url(&self) -> Option<&str> {
        match &self.logo_source {
            LogoSource::RemoteUrl(url) if self.logo_pending => Some(url),
            _ => None,
        }
    }

    pub fn has_logo(&self) -> bool {
        self.resolved_logo.is_some()
    }

    /// Text to show in place of missing artwork.
    pub fn label(&self) -> &str {
        &self.display_name
    }
}
