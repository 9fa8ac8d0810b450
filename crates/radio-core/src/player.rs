//! The boundary to the audio engine.
//!
//! The engine is opaque: it takes a stream url and a volume, starts and stops,
//! and reports back through [`PlayerEvent`]s delivered to the coordination
//! context. Command methods are fire-and-forget; an `Err` only means the
//! command could not be handed to the engine.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::PlayerError;

/// Volume used whenever playback starts or the station changes.
pub const DEFAULT_VOLUME: u8 = 100;
pub const MAX_VOLUME: u8 = 100;

pub trait Player: Send + 'static {
    fn set_stream(&mut self, url: &str) -> Result<(), PlayerError>;
    /// `volume` is 0–100.
    fn set_volume(&mut self, volume: u8) -> Result<(), PlayerError>;
    fn play(&mut self) -> Result<(), PlayerError>;
    fn stop(&mut self) -> Result<(), PlayerError>;
}

/// What the engine itself reports about its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum EngineState {
    #[default]
    Stopped,
    Buffering,
    Playing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    StateChanged(EngineState),
    VolumeChanged(u8),
    MetadataChanged(BTreeMap<String, String>),
}

/// Clamp an arbitrary engine volume reading to 0–100.
pub fn clamp_volume(volume: f64) -> u8 {
    if volume.is_nan() {
        return 0;
    }
    volume.round().clamp(0.0, MAX_VOLUME as f64) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_volume() {
        assert_eq!(clamp_volume(-3.0), 0);
        assert_eq!(clamp_volume(49.6), 50);
        assert_eq!(clamp_volume(130.0), 100);
        assert_eq!(clamp_volume(f64::NAN), 0);
    }
}
