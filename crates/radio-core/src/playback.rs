//! Playback state machine.
//!
//! ```text
//!            select                play
//!   Idle ───────────▶ Stopped ◀──────────▶ Playing
//!                      ▲   │     stop         │
//!                      └───┘ select           │ select (engine stopped first)
//!                      ◀──────────────────────┘
//! ```
//!
//! `play` from Idle/Playing and `stop` from Idle/Stopped are no-ops. Metadata
//! events only rewrite the display strings; volume is forwarded to the engine
//! without touching the state.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::PlayerError;
use crate::player::{Player, DEFAULT_VOLUME, MAX_VOLUME};
use crate::station::{ImageBytes, StationId, StationRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PlaybackStatus {
    /// No station selected.
    #[default]
    Idle,
    /// Station selected, audio off.
    Stopped,
    /// Station selected, audio on.
    Playing,
}

#[derive(Debug, Clone, Default)]
pub struct PlaybackState {
    pub current_station: Option<StationRecord>,
    pub is_playing: bool,
    pub display_title: String,
    pub display_subtitle: String,
}

impl PlaybackState {
    pub fn status(&self) -> PlaybackStatus {
        match (&self.current_station, self.is_playing) {
            (None, _) => PlaybackStatus::Idle,
            (Some(_), false) => PlaybackStatus::Stopped,
            (Some(_), true) => PlaybackStatus::Playing,
        }
    }
}

pub struct PlaybackController<P> {
    player: P,
    state: PlaybackState,
    start_volume: u8,
    /// Last volume seen by the UI control: set by the UI or mirrored from the engine.
    volume: u8,
}

impl<P: Player> PlaybackController<P> {
    pub fn new(player: P) -> Self {
        Self::with_start_volume(player, DEFAULT_VOLUME)
    }

    /// Controller that resets the engine to `start_volume` on every start.
    pub fn with_start_volume(player: P, start_volume: u8) -> Self {
        let start_volume = start_volume.min(MAX_VOLUME);
        Self {
            player,
            state: PlaybackState::default(),
            start_volume,
            volume: start_volume,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn status(&self) -> PlaybackStatus {
        self.state.status()
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Make `station` current. A playing stream is stopped first, and the
    /// display falls back to the station name until metadata arrives.
    pub fn select_station(&mut self, station: StationRecord) {
        if self.state.is_playing {
            self.stop_engine();
        }
        info!("playback: selected {:?}", station.display_name);
        self.state.display_title = station.display_name.clone();
        self.state.display_subtitle.clear();
        self.state.current_station = Some(station);
    }

    /// Start the current station at the start volume. Returns whether the
    /// state changed.
    pub fn play(&mut self) -> bool {
        let Some(station) = &self.state.current_station else {
            debug!("playback: play ignored, no station selected");
            return false;
        };
        if self.state.is_playing {
            debug!("playback: play ignored, already playing");
            return false;
        }
        match start_stream(&mut self.player, &station.stream_url, self.start_volume) {
            Ok(()) => {
                info!("playback: playing {}", station.stream_url);
                self.state.is_playing = true;
                self.volume = self.start_volume;
                true
            }
            Err(e) => {
                warn!("playback: could not start {}: {}", station.stream_url, e);
                false
            }
        }
    }

    /// Stop audio. Returns whether the state changed.
    pub fn stop(&mut self) -> bool {
        if !self.state.is_playing {
            debug!("playback: stop ignored, not playing");
            return false;
        }
        self.stop_engine();
        true
    }

    pub fn toggle(&mut self) -> bool {
        if self.state.is_playing {
            self.stop()
        } else {
            self.play()
        }
    }

    /// Map stream metadata onto the display strings. Keys are matched against
    /// the current station's metadata keys ignoring case; anything else is
    /// ignored. Returns whether a display string changed.
    pub fn on_metadata_changed<I, K, V>(&mut self, metadata: I) -> bool
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let Some(station) = &self.state.current_station else {
            debug!("playback: metadata ignored, no station selected");
            return false;
        };
        let first = station.first_metadata_key.to_lowercase();
        let second = station.second_metadata_key.to_lowercase();

        let mut changed = false;
        for (key, value) in metadata {
            let key = key.as_ref().to_lowercase();
            let value = value.as_ref();
            if key == first && self.state.display_title != value {
                self.state.display_title = value.to_string();
                changed = true;
            }
            if key == second && self.state.display_subtitle != value {
                self.state.display_subtitle = value.to_string();
                changed = true;
            }
        }
        if changed {
            debug!(
                "playback: display {:?} / {:?}",
                self.state.display_title, self.state.display_subtitle
            );
        }
        changed
    }

    /// Volume change from the UI; forwarded to the engine.
    pub fn set_volume(&mut self, volume: u8) {
        let volume = volume.min(MAX_VOLUME);
        if let Err(e) = self.player.set_volume(volume) {
            warn!("playback: set volume {} failed: {}", volume, e);
            return;
        }
        self.volume = volume;
    }

    /// Volume change reported by the engine; mirrored to the UI only.
    pub fn mirror_volume(&mut self, volume: u8) -> bool {
        let volume = volume.min(MAX_VOLUME);
        let changed = self.volume != volume;
        self.volume = volume;
        changed
    }

    /// Give the current station its late-arriving logo, if `station` is still
    /// the one selected. Returns whether it was.
    pub fn refresh_logo(&mut self, station: StationId, logo: Option<ImageBytes>) -> bool {
        match self.state.current_station.as_mut() {
            Some(current) if current.id == station => {
                current.resolved_logo = logo;
                current.logo_pending = false;
                true
            }
            _ => false,
        }
    }

    fn stop_engine(&mut self) {
        if let Err(e) = self.player.stop() {
            warn!("playback: stop failed: {}", e);
        }
        self.state.is_playing = false;
    }
}

fn start_stream<P: Player>(player: &mut P, url: &str, volume: u8) -> Result<(), PlayerError> {
    player.set_stream(url)?;
    player.set_volume(volume)?;
    player.play()
}
