/// RadioCore: single-owner event loop for the station registry and playback.
///
/// A desktop toolkit would serialise every mutation on its GUI event loop.
/// Here that role is played by one explicit consumer: `RadioCore` owns the
/// `StationRegistry` and the `PlaybackController` exclusively, and everything
/// else (HTTP handlers, the player adapter, logo fetch callbacks running on
/// runtime worker threads) sends `RadioEvent`s into its channel. No state is
/// shared, so a logo completion can never race a station switch.
///
/// After each handled event the core publishes a fresh `RadioState` snapshot
/// on a `tokio::sync::watch` channel.
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::catalog;
use crate::color::Color;
use crate::config::Config;
use crate::fetcher::{AssetFetcher, FetchOutcome, Transport};
use crate::playback::{PlaybackController, PlaybackStatus};
use crate::player::{EngineState, Player, PlayerEvent};
use crate::registry::{LogoUpdate, StationRegistry};
use crate::station::{ImageBytes, StationId};

// ── RadioEvent ────────────────────────────────────────────────────────────────

/// All inputs into the RadioCore loop.
#[derive(Debug)]
pub enum RadioEvent {
    /// A station slot was picked on the selection surface.
    SelectSlot(usize),
    Play,
    Stop,
    TogglePlayback,
    /// Volume set from the UI (0–100).
    SetVolume(u8),
    /// A remote logo fetch issued for `station` in `slot` has finished.
    LogoFetched {
        slot: usize,
        station: StationId,
        outcome: FetchOutcome,
    },
    /// Notification from the audio engine.
    Player(PlayerEvent),
    Shutdown,
}

// ── RadioState ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct StationSummary {
    pub slot: usize,
    pub name: String,
    /// Text shown in place of artwork.
    pub label: String,
    pub stream_url: String,
    pub has_logo: bool,
    pub logo_pending: bool,
    pub color_normal: Color,
    pub color_checked: Color,
    #[serde(skip)]
    pub logo: Option<ImageBytes>,
}

/// Snapshot of everything a front end needs to render.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RadioState {
    pub rev: u64,
    pub stations: Vec<StationSummary>,
    pub current_slot: Option<usize>,
    pub status: PlaybackStatus,
    pub display_title: String,
    pub display_subtitle: String,
    pub volume: u8,
    pub engine_state: EngineState,
    /// True when the catalog produced no stations at all.
    pub catalog_empty: bool,
}

impl RadioState {
    pub fn station(&self, slot: usize) -> Option<&StationSummary> {
        self.stations.iter().find(|s| s.slot == slot)
    }
}

// ── RadioCore ─────────────────────────────────────────────────────────────────

pub struct RadioCore<P: Player> {
    registry: StationRegistry,
    controller: PlaybackController<P>,
    fetcher: AssetFetcher,
    /// Cloned into fetch callbacks so completions come back through the loop.
    event_tx: mpsc::UnboundedSender<RadioEvent>,
    state_tx: watch::Sender<RadioState>,
    current_slot: Option<usize>,
    engine_state: EngineState,
    autoplay_on_select: bool,
    select_first_on_start: bool,
    rev: u64,
}

impl<P: Player> RadioCore<P> {
    pub fn new(
        config: &Config,
        player: P,
        transport: Arc<dyn Transport>,
        event_tx: mpsc::UnboundedSender<RadioEvent>,
    ) -> Self {
        let controller =
            PlaybackController::with_start_volume(player, config.playback.default_volume);
        let (state_tx, _) = watch::channel(RadioState {
            volume: controller.volume(),
            ..RadioState::default()
        });
        Self {
            registry: StationRegistry::new(config.catalog.slot_count),
            controller,
            fetcher: AssetFetcher::new(transport),
            event_tx,
            state_tx,
            current_slot: None,
            engine_state: EngineState::Stopped,
            autoplay_on_select: config.playback.autoplay_on_select,
            select_first_on_start: config.playback.select_first_on_start,
            rev: 0,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<RadioState> {
        self.state_tx.subscribe()
    }

    pub fn registry(&self) -> &StationRegistry {
        &self.registry
    }

    pub fn controller(&self) -> &PlaybackController<P> {
        &self.controller
    }

    /// Load the catalog, bind stations to slots and request remote logos.
    ///
    /// Must run inside a tokio runtime, since logo fetches are spawned here.
    pub fn start(&mut self, catalog_path: &Path) {
        let stations = catalog::load(catalog_path, self.registry.capacity());
        for (slot, record) in stations.into_iter().enumerate() {
            match self.registry.assign(slot, record) {
                Ok(id) => self.request_logo(slot, id),
                Err(e) => warn!("RadioCore: {}", e),
            }
        }

        if self.registry.is_empty() {
            warn!("RadioCore: no stations available");
        } else if self.select_first_on_start && self.registry.get(0).is_some() {
            self.select_slot(0);
        }
        self.publish();
    }

    /// Run the core event loop until `Shutdown` arrives. The core keeps its own
    /// sender for fetch completions, so the channel never closes on its own.
    pub async fn run(mut self, mut event_rx: mpsc::UnboundedReceiver<RadioEvent>) {
        info!("RadioCore: starting event loop");
        while let Some(event) = event_rx.recv().await {
            if self.handle(event).is_break() {
                info!("RadioCore: shutdown requested");
                break;
            }
        }
        self.controller.stop();
        self.publish();
    }

    /// Apply one event and publish the resulting state.
    pub fn handle(&mut self, event: RadioEvent) -> ControlFlow<()> {
        match event {
            RadioEvent::Shutdown => return ControlFlow::Break(()),
            RadioEvent::SelectSlot(slot) => self.select_slot(slot),
            RadioEvent::Play => {
                self.controller.play();
            }
            RadioEvent::Stop => {
                self.controller.stop();
            }
            RadioEvent::TogglePlayback => {
                self.controller.toggle();
            }
            RadioEvent::SetVolume(volume) => self.controller.set_volume(volume),
            RadioEvent::LogoFetched {
                slot,
                station,
                outcome,
            } => self.apply_logo(slot, station, outcome),
            RadioEvent::Player(evt) => self.handle_player_event(evt),
        }
        self.publish();
        ControlFlow::Continue(())
    }

    // ── event handlers ────────────────────────────────────────────────────────

    fn select_slot(&mut self, slot: usize) {
        let Some(record) = self.registry.get(slot) else {
            debug!("RadioCore: slot {} is empty, selection ignored", slot);
            return;
        };
        self.controller.select_station(record.clone());
        self.current_slot = Some(slot);
        if self.autoplay_on_select {
            self.controller.play();
        }
    }

    fn apply_logo(&mut self, slot: usize, station: StationId, outcome: FetchOutcome) {
        match self.registry.update_logo(slot, station, &outcome) {
            LogoUpdate::Applied => {
                if let Err(e) = &outcome {
                    info!("RadioCore: slot {} keeps its text label: {}", slot, e);
                }
                let logo = outcome.ok();
                if self.controller.refresh_logo(station, logo) {
                    debug!("RadioCore: refreshed logo of the current station");
                }
            }
            LogoUpdate::Stale => debug!("RadioCore: stale logo for slot {} dropped", slot),
            LogoUpdate::AlreadySettled => {
                debug!("RadioCore: logo for slot {} already settled", slot)
            }
        }
    }

    fn handle_player_event(&mut self, evt: PlayerEvent) {
        match evt {
            PlayerEvent::StateChanged(state) => {
                if self.engine_state != state {
                    debug!("RadioCore: engine {:?} -> {:?}", self.engine_state, state);
                    self.engine_state = state;
                }
            }
            PlayerEvent::VolumeChanged(volume) => {
                self.controller.mirror_volume(volume);
            }
            PlayerEvent::MetadataChanged(metadata) => {
                self.controller.on_metadata_changed(&metadata);
            }
        }
    }

    fn request_logo(&mut self, slot: usize, station: StationId) {
        let Some(url) = self
            .registry
            .get(slot)
            .and_then(|s| s.pending_logo_url())
            .map(str::to_string)
        else {
            return;
        };

        let tx = self.event_tx.clone();
        let result = self.fetcher.fetch(&url, move |outcome| {
            let _ = tx.send(RadioEvent::LogoFetched {
                slot,
                station,
                outcome,
            });
        });
        match result {
            Ok(status) => debug!("RadioCore: logo for slot {}: {:?} {}", slot, status, url),
            Err(e) => {
                warn!("RadioCore: logo for slot {} not requested: {}", slot, e);
                self.registry.update_logo(slot, station, &Err(e));
            }
        }
    }

    // ── publishing ────────────────────────────────────────────────────────────

    fn publish(&mut self) {
        self.rev += 1;
        let playback = self.controller.state();
        let stations = self
            .registry
            .iter()
            .map(|(slot, s)| StationSummary {
                slot,
                name: s.display_name.clone(),
                label: s.label().to_string(),
                stream_url: s.stream_url.clone(),
                has_logo: s.has_logo(),
                logo_pending: s.logo_pending,
                color_normal: s.color_normal,
                color_checked: s.color_checked,
                logo: s.resolved_logo.clone(),
            })
            .collect();

        self.state_tx.send_replace(RadioState {
            rev: self.rev,
            stations,
            current_slot: self.current_slot,
            status: playback.status(),
            display_title: playback.display_title.clone(),
            display_subtitle: playback.display_subtitle.clone(),
            volume: self.controller.volume(),
            engine_state: self.engine_state,
            catalog_empty: self.registry.is_empty(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::testing::{png_bytes, GatedTransport, PlayerCall, RecordingPlayer};
    use std::collections::BTreeMap;
    use std::time::Duration;

    const CATALOG: &str = r#"{
        "Alpha": {
            "url": "http://alpha.example/stream",
            "logo-url": "https://alpha.example/logo.png",
            "meta_key_1": "title",
            "meta_key_2": "artist",
            "background-color-checked": "red"
        },
        "Bravo": {
            "url": "http://bravo.example/stream",
            "logo-file": "/nonexistent/bravo.png",
            "meta_key_1": "Title",
            "meta_key_2": "icy-name"
        }
    }"#;

    struct Harness {
        core: RadioCore<RecordingPlayer>,
        player: RecordingPlayer,
        transport: Arc<GatedTransport>,
        rx: mpsc::UnboundedReceiver<RadioEvent>,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        fn new(catalog: &str, autoplay: bool, select_first: bool) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("stations.json");
            std::fs::write(&path, catalog).unwrap();

            let mut config = Config::default();
            config.playback.autoplay_on_select = autoplay;
            config.playback.select_first_on_start = select_first;

            let player = RecordingPlayer::default();
            let transport = GatedTransport::new(Ok(png_bytes(8, 8)));
            let (tx, rx) = mpsc::unbounded_channel();
            let mut core = RadioCore::new(&config, player.clone(), transport.clone(), tx);
            core.start(&path);
            Self {
                core,
                player,
                transport,
                rx,
                _dir: dir,
            }
        }

        async fn pump_one(&mut self) {
            let event = tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
                .await
                .expect("no event")
                .expect("channel closed");
            let _ = self.core.handle(event);
        }

        fn dispatch(&mut self, event: RadioEvent) {
            let _ = self.core.handle(event);
        }

        fn state(&self) -> RadioState {
            self.core.subscribe().borrow().clone()
        }
    }

    #[tokio::test]
    async fn test_start_selects_and_plays_first_station() {
        let h = Harness::new(CATALOG, true, true);
        let state = h.state();
        assert_eq!(state.stations.len(), 2);
        assert_eq!(state.current_slot, Some(0));
        assert_eq!(state.status, PlaybackStatus::Playing);
        assert_eq!(state.display_title, "Alpha");
        assert!(!state.catalog_empty);
        assert_eq!(state.stations[0].color_checked.name_argb(), "#ffff0000");
        assert!(state.stations[0].logo_pending);
        assert!(!state.stations[1].has_logo);
        assert_eq!(state.stations[1].label, "Bravo");
        assert_eq!(
            h.player.calls(),
            [
                PlayerCall::SetStream("http://alpha.example/stream".into()),
                PlayerCall::SetVolume(100),
                PlayerCall::Play,
            ]
        );
    }

    #[tokio::test]
    async fn test_start_without_autoselect_stays_idle() {
        let h = Harness::new(CATALOG, true, false);
        let state = h.state();
        assert_eq!(state.status, PlaybackStatus::Idle);
        assert_eq!(state.current_slot, None);
        assert!(h.player.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_catalog_reports_no_stations() {
        let h = Harness::new("not json at all", true, true);
        let state = h.state();
        assert!(state.catalog_empty);
        assert!(state.stations.is_empty());
        assert_eq!(state.status, PlaybackStatus::Idle);
    }

    #[tokio::test]
    async fn test_late_logo_refreshes_current_station() {
        let mut h = Harness::new(CATALOG, false, true);
        h.transport.release(1);
        h.pump_one().await;

        let state = h.state();
        assert!(state.stations[0].has_logo);
        assert!(!state.stations[0].logo_pending);
        assert_eq!(state.stations[0].logo.as_ref().unwrap().dimensions(), (8, 8));
        let current = h.core.controller().state().current_station.as_ref().unwrap();
        assert!(current.has_logo());
    }

    #[tokio::test]
    async fn test_logo_for_other_station_leaves_display_alone() {
        let mut h = Harness::new(CATALOG, false, false);
        h.dispatch(RadioEvent::SelectSlot(0));
        h.dispatch(RadioEvent::SelectSlot(1));
        h.transport.release(1);
        h.pump_one().await;

        assert!(h.core.registry().get(0).unwrap().has_logo());
        let current = h.core.controller().state().current_station.as_ref().unwrap();
        assert_eq!(current.display_name, "Bravo");
        assert!(!current.has_logo());
        assert_eq!(h.state().display_title, "Bravo");
    }

    #[tokio::test]
    async fn test_failed_logo_keeps_station_selectable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stations.json");
        std::fs::write(&path, CATALOG).unwrap();
        let transport = GatedTransport::new(Err(TransportError::Status(503)));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut core = RadioCore::new(
            &Config::default(),
            RecordingPlayer::default(),
            transport.clone(),
            tx,
        );
        core.start(&path);
        let _ = core.handle(RadioEvent::SelectSlot(1));

        transport.release(1);
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let _ = core.handle(event);

        let state = core.subscribe().borrow().clone();
        assert!(!state.stations[0].has_logo);
        assert!(!state.stations[0].logo_pending);
        let _ = core.handle(RadioEvent::SelectSlot(0));
        let state = core.subscribe().borrow().clone();
        assert_eq!(state.current_slot, Some(0));
        assert_eq!(state.status, PlaybackStatus::Playing);
    }

    #[tokio::test]
    async fn test_controls_and_player_events() {
        let mut h = Harness::new(CATALOG, false, true);
        assert_eq!(h.state().status, PlaybackStatus::Stopped);

        h.dispatch(RadioEvent::TogglePlayback);
        assert_eq!(h.state().status, PlaybackStatus::Playing);

        let mut meta = BTreeMap::new();
        meta.insert("TITLE".to_string(), "Song".to_string());
        meta.insert("Artist".to_string(), "Band".to_string());
        h.dispatch(RadioEvent::Player(PlayerEvent::MetadataChanged(meta)));
        h.dispatch(RadioEvent::Player(PlayerEvent::StateChanged(EngineState::Playing)));
        h.dispatch(RadioEvent::Player(PlayerEvent::VolumeChanged(42)));

        let state = h.state();
        assert_eq!(state.display_title, "Song");
        assert_eq!(state.display_subtitle, "Band");
        assert_eq!(state.engine_state, EngineState::Playing);
        assert_eq!(state.volume, 42);

        h.dispatch(RadioEvent::SetVolume(10));
        assert_eq!(h.player.calls().last(), Some(&PlayerCall::SetVolume(10)));

        h.dispatch(RadioEvent::Stop);
        assert_eq!(h.state().status, PlaybackStatus::Stopped);
        h.dispatch(RadioEvent::Play);
        assert_eq!(h.state().status, PlaybackStatus::Playing);
    }

    #[tokio::test]
    async fn test_empty_slot_selection_is_ignored() {
        let mut h = Harness::new(CATALOG, true, false);
        let before = h.state().rev;
        assert!(h.core.handle(RadioEvent::SelectSlot(5)).is_continue());
        let state = h.state();
        assert_eq!(state.current_slot, None);
        assert!(state.rev > before);
    }

    #[tokio::test]
    async fn test_run_stops_playback_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stations.json");
        std::fs::write(&path, CATALOG).unwrap();
        let player = RecordingPlayer::default();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut core = RadioCore::new(
            &Config::default(),
            player.clone(),
            GatedTransport::new(Ok(Vec::new())),
            tx.clone(),
        );
        core.start(&path);
        let mut state_rx = core.subscribe();

        tx.send(RadioEvent::Shutdown).unwrap();
        tokio::time::timeout(Duration::from_secs(5), core.run(rx))
            .await
            .unwrap();

        assert_eq!(player.calls().last(), Some(&PlayerCall::Stop));
        assert_eq!(state_rx.borrow_and_update().status, PlaybackStatus::Stopped);
    }

    #[tokio::test]
    async fn test_run_outlives_external_senders() {
        let (tx, rx) = mpsc::unbounded_channel();
        let core = RadioCore::new(
            &Config::default(),
            RecordingPlayer::default(),
            GatedTransport::new(Ok(Vec::new())),
            tx.clone(),
        );
        drop(tx);

        let still_running = tokio::time::timeout(Duration::from_millis(100), core.run(rx)).await;
        assert!(still_running.is_err());
    }
}
