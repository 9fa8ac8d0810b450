//! Fakes shared by the unit tests.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Url;
use tokio::sync::Semaphore;

use crate::error::{PlayerError, TransportError};
use crate::fetcher::Transport;
use crate::player::Player;

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCall {
    SetStream(String),
    SetVolume(u8),
    Play,
    Stop,
}

/// Records every command; optionally fails them all.
#[derive(Clone, Default)]
pub struct RecordingPlayer {
    pub calls: Arc<Mutex<Vec<PlayerCall>>>,
    pub fail: bool,
}

impl RecordingPlayer {
    pub fn calls(&self) -> Vec<PlayerCall> {
        self.calls.lock().clone()
    }

    fn record(&mut self, call: PlayerCall) -> Result<(), PlayerError> {
        if self.fail {
            return Err(PlayerError::Unavailable);
        }
        self.calls.lock().push(call);
        Ok(())
    }
}

impl Player for RecordingPlayer {
    fn set_stream(&mut self, url: &str) -> Result<(), PlayerError> {
        self.record(PlayerCall::SetStream(url.to_string()))
    }

    fn set_volume(&mut self, volume: u8) -> Result<(), PlayerError> {
        self.record(PlayerCall::SetVolume(volume))
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        self.record(PlayerCall::Play)
    }

    fn stop(&mut self) -> Result<(), PlayerError> {
        self.record(PlayerCall::Stop)
    }
}

/// Transport that blocks every request until the test releases it.
pub struct GatedTransport {
    pub calls: AtomicUsize,
    gate: Semaphore,
    response: Result<Vec<u8>, TransportError>,
}

impl GatedTransport {
    pub fn new(response: Result<Vec<u8>, TransportError>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            gate: Semaphore::new(0),
            response,
        })
    }

    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn fetch(&self, _url: &Url) -> Result<Vec<u8>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate
            .acquire()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?
            .forget();
        self.response.clone()
    }
}

/// Transport that panics once the test releases a request.
pub struct PanickingTransport {
    calls: AtomicUsize,
    gate: Semaphore,
}

impl PanickingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            gate: Semaphore::new(0),
        })
    }

    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for PanickingTransport {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        panic!("transport blew up on {url}");
    }
}
