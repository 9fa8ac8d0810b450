#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use radio_core::config::Config;
use radio_core::core::{RadioCore, RadioEvent, RadioState};
use radio_core::error::{PlayerError, TransportError};
use radio_core::fetcher::Transport;
use radio_core::player::Player;
use reqwest::Url;
use tokio::sync::{mpsc, Semaphore};

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 10, 10, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

pub fn write_catalog(dir: &Path, json: &str) -> PathBuf {
    let path = dir.join("stations.json");
    std::fs::write(&path, json).unwrap();
    path
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SetStream(String),
    SetVolume(u8),
    Play,
    Stop,
}

#[derive(Clone, Default)]
pub struct FakePlayer {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl FakePlayer {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }
}

impl Player for FakePlayer {
    fn set_stream(&mut self, url: &str) -> Result<(), PlayerError> {
        self.calls.lock().push(Call::SetStream(url.to_string()));
        Ok(())
    }

    fn set_volume(&mut self, volume: u8) -> Result<(), PlayerError> {
        self.calls.lock().push(Call::SetVolume(volume));
        Ok(())
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        self.calls.lock().push(Call::Play);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PlayerError> {
        self.calls.lock().push(Call::Stop);
        Ok(())
    }
}

/// Serves canned responses per url, holding each request until released.
pub struct FakeTransport {
    responses: HashMap<String, Result<Vec<u8>, TransportError>>,
    gate: Semaphore,
    calls: AtomicUsize,
}

impl FakeTransport {
    pub fn new<I>(responses: I) -> Arc<Self>
    where
        I: IntoIterator<Item = (&'static str, Result<Vec<u8>, TransportError>)>,
    {
        Arc::new(Self {
            responses: responses
                .into_iter()
                .map(|(url, r)| (url.to_string(), r))
                .collect(),
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
        })
    }

    /// Answers 404 for everything.
    pub fn empty() -> Arc<Self> {
        let none: [(&'static str, Result<Vec<u8>, TransportError>); 0] = [];
        Self::new(none)
    }

    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate
            .acquire()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?
            .forget();
        self.responses
            .get(url.as_str())
            .cloned()
            .unwrap_or(Err(TransportError::Status(404)))
    }
}

pub struct Kiosk {
    pub core: RadioCore<FakePlayer>,
    pub player: FakePlayer,
    pub rx: mpsc::UnboundedReceiver<RadioEvent>,
}

impl Kiosk {
    pub fn start(catalog: &Path, transport: Arc<FakeTransport>, config: Config) -> Self {
        let player = FakePlayer::default();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut core = RadioCore::new(&config, player.clone(), transport, tx);
        core.start(catalog);
        Self { core, player, rx }
    }

    pub fn send(&mut self, event: RadioEvent) {
        let _ = self.core.handle(event);
    }

    /// Feed the next queued event (a fetch completion) into the core.
    pub async fn pump(&mut self) {
        let event = tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed");
        self.send(event);
    }

    pub fn state(&self) -> RadioState {
        self.core.subscribe().borrow().clone()
    }
}
