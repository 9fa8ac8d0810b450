//! Error types for every stage of the station pipeline.
//!
//! None of these are fatal to the process. Each is absorbed where it occurs
//! and turned into a degraded-but-valid state: an empty station list, a
//! dropped catalog entry, or a station shown by name instead of artwork.

use std::path::PathBuf;

use thiserror::Error;

/// The catalog file as a whole could not be used.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog {path:?} unreadable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("catalog is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("catalog top level is not a JSON object")]
    NotAnObject,
}

/// Why a single catalog entry was left out of the station list.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StationRejected {
    #[error("entry is not an object with string fields")]
    NotAnObject,
    #[error("missing or empty stream url")]
    MissingStreamUrl,
    #[error("none of logo, logo-file, logo-url present")]
    MissingLogo,
    #[error("missing or empty metadata key {0}")]
    MissingMetadataKey(&'static str),
}

/// Station artwork could not be produced from its source.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LogoError {
    #[error("inline logo is not valid base64: {0}")]
    Base64(String),
    #[error("logo file {path:?} unreadable: {reason}")]
    Io { path: PathBuf, reason: String },
    #[error("image data could not be decoded: {0}")]
    Decode(String),
    #[error("logo url {0:?} is not an absolute http(s) url")]
    InvalidUrl(String),
}

/// Failure reported by the transport adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("server answered with status {0}")]
    Status(u16),
    #[error("http client could not be built: {0}")]
    Client(String),
}

/// Outcome delivered to every waiter of a failed fetch job.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("invalid fetch url {0:?}")]
    InvalidUrl(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Decode(#[from] LogoError),
    #[error("fetch task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlayerError {
    #[error("player backend is not available")]
    Unavailable,
    #[error("player command failed: {0}")]
    Command(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("slot {slot} out of range (registry has {capacity} slots)")]
    SlotOutOfRange { slot: usize, capacity: usize },
}
