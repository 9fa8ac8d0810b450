/// mpv-backed `Player` with separated reader/writer IPC tasks.
///
/// Architecture:
///
/// ```text
///   MpvPlayer (Player impl, lives inside RadioCore)
///         │  PlayerCommand via unbounded mpsc (never blocks the core)
///         ▼
///   player_task ── owns MpvDriver + MpvHandle, spawns mpv lazily on first play
///         │
///         ├── writer_task   ← receives MpvRequest via mpsc, serialises → socket
///         └── reader_task   ← reads JSON lines from socket
///                                ├── response (has request_id) → matched oneshot::Sender
///                                └── property-change → PlayerEvent → RadioEvent::Player
/// ```
///
/// Platform notes:
/// - Unix:   Unix domain sockets
/// - Windows: Named pipes  \\.\pipe\<name>
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use radio_core::core::RadioEvent;
use radio_core::error::PlayerError;
use radio_core::platform;
use radio_core::player::{clamp_volume, EngineState, Player, PlayerEvent};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

// ── global request-id counter ─────────────────────────────────────────────────

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

// ── observation property IDs ──────────────────────────────────────────────────

pub const OBS_CORE_IDLE: u64 = 1;
pub const OBS_METADATA: u64 = 2;
pub const OBS_VOLUME: u64 = 3;

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<anyhow::Result<Value>>>>>;

// ── internal channel types ────────────────────────────────────────────────────

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: oneshot::Sender<anyhow::Result<Value>>,
}

/// An mpv event / property-change that arrived unsolicited (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    /// Returns `Some((obs_id, data))` if this is a property-change event.
    pub fn as_property_change(&self) -> Option<(u64, &Value)> {
        if self.raw.get("event")?.as_str()? == "property-change" {
            let id = self.raw.get("id")?.as_u64()?;
            let data = self.raw.get("data").unwrap_or(&Value::Null);
            Some((id, data))
        } else {
            None
        }
    }
}

// ── MpvPlayer ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum PlayerCommand {
    SetStream(String),
    SetVolume(u8),
    Play,
    Stop,
}

/// `Player` handed to the core. Every call is queued for `player_task`.
pub struct MpvPlayer {
    tx: mpsc::UnboundedSender<PlayerCommand>,
}

impl MpvPlayer {
    /// Start the player task. Engine notifications are delivered on `radio_tx`.
    /// The task ends (and mpv is killed) once the `MpvPlayer` is dropped.
    pub fn spawn(radio_tx: mpsc::UnboundedSender<RadioEvent>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(player_task(rx, radio_tx));
        (Self { tx }, task)
    }

    fn queue(&self, cmd: PlayerCommand) -> Result<(), PlayerError> {
        self.tx.send(cmd).map_err(|_| PlayerError::Unavailable)
    }
}

impl Player for MpvPlayer {
    fn set_stream(&mut self, url: &str) -> Result<(), PlayerError> {
        self.queue(PlayerCommand::SetStream(url.to_string()))
    }

    fn set_volume(&mut self, volume: u8) -> Result<(), PlayerError> {
        self.queue(PlayerCommand::SetVolume(volume))
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        self.queue(PlayerCommand::Play)
    }

    fn stop(&mut self) -> Result<(), PlayerError> {
        self.queue(PlayerCommand::Stop)
    }
}

// ── player task ───────────────────────────────────────────────────────────────

struct PlayerTask {
    driver: MpvDriver,
    handle: Option<MpvHandle>,
    mpv_event_tx: mpsc::Sender<MpvEvent>,
    stream: Option<String>,
    volume: u8,
    /// true between our `loadfile` and `stop`; turns an idle core into Buffering.
    intend_playing: bool,
}

async fn player_task(
    mut cmd_rx: mpsc::UnboundedReceiver<PlayerCommand>,
    radio_tx: mpsc::UnboundedSender<RadioEvent>,
) {
    let (mpv_event_tx, mut mpv_event_rx) = mpsc::channel::<MpvEvent>(64);
    let mut task = PlayerTask {
        driver: MpvDriver::new(),
        handle: None,
        mpv_event_tx,
        stream: None,
        volume: radio_core::player::DEFAULT_VOLUME,
        intend_playing: false,
    };

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(cmd) => {
                    debug!("mpv player: {:?}", cmd);
                    if let Err(e) = task.apply(cmd).await {
                        warn!("mpv player: command failed: {}", e);
                    }
                }
                None => break,
            },
            Some(evt) = mpv_event_rx.recv() => {
                if let Some(player_event) = translate_event(&evt, task.intend_playing) {
                    if radio_tx.send(RadioEvent::Player(player_event)).is_err() {
                        break;
                    }
                }
            }
        }
    }

    info!("mpv player: shutting down");
    task.driver.kill().await;
}

impl PlayerTask {
    async fn apply(&mut self, cmd: PlayerCommand) -> anyhow::Result<()> {
        match cmd {
            PlayerCommand::SetStream(url) => self.stream = Some(url),
            PlayerCommand::SetVolume(volume) => {
                self.volume = volume;
                self.driver.last_volume = volume;
                if let Some(handle) = &self.handle {
                    handle.set_volume(volume).await?;
                }
            }
            PlayerCommand::Play => {
                let Some(url) = self.stream.clone() else {
                    anyhow::bail!("play without a stream");
                };
                let handle = self.ensure_handle().await?;
                self.intend_playing = true;
                handle.load_stream(&url, self.volume).await?;
            }
            PlayerCommand::Stop => {
                self.intend_playing = false;
                if let Some(handle) = &self.handle {
                    handle.stop().await?;
                }
            }
        }
        Ok(())
    }

    /// Live handle to mpv, spawning a fresh process if there is none or it died.
    async fn ensure_handle(&mut self) -> anyhow::Result<MpvHandle> {
        if let Some(handle) = &self.handle {
            if self.driver.process_alive() {
                return Ok(handle.clone());
            }
            warn!("mpv player: mpv process died, respawning");
            self.handle = None;
        }
        let handle = self
            .driver
            .spawn_and_connect(self.mpv_event_tx.clone())
            .await?;
        handle.observe_properties().await;
        self.handle = Some(handle.clone());
        Ok(handle)
    }
}

/// Map an mpv property change onto what the core understands.
fn translate_event(evt: &MpvEvent, intend_playing: bool) -> Option<PlayerEvent> {
    let (obs_id, data) = evt.as_property_change()?;
    match obs_id {
        OBS_CORE_IDLE => {
            let idle = data.as_bool()?;
            let state = match (idle, intend_playing) {
                (false, _) => EngineState::Playing,
                (true, true) => EngineState::Buffering,
                (true, false) => EngineState::Stopped,
            };
            Some(PlayerEvent::StateChanged(state))
        }
        OBS_VOLUME => data.as_f64().map(|v| PlayerEvent::VolumeChanged(clamp_volume(v))),
        OBS_METADATA => Some(PlayerEvent::MetadataChanged(metadata_map(data))),
        _ => None,
    }
}

/// mpv's `metadata` property as key → string; non-string values are rendered as JSON.
fn metadata_map(data: &Value) -> BTreeMap<String, String> {
    let Some(obj) = data.as_object() else {
        return BTreeMap::new();
    };
    obj.iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

// ── public handle ─────────────────────────────────────────────────────────────

/// Cloneable handle to the mpv writer task.  Use `send()` to fire a command
/// and await the response.
#[derive(Clone)]
pub struct MpvHandle {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvHandle {
    pub async fn send(&self, command: Value) -> anyhow::Result<Value> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw = serde_json::to_string(&msg)?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| anyhow::anyhow!("mpv writer task gone"))?;

        tokio::time::timeout(tokio::time::Duration::from_secs(5), reply_rx)
            .await
            .map_err(|_| anyhow::anyhow!("mpv IPC timeout for req={}", req_id))?
            .map_err(|_| anyhow::anyhow!("mpv reply channel dropped req={}", req_id))?
    }

    pub async fn load_stream(&self, url: &str, volume: u8) -> anyhow::Result<()> {
        self.send(json!(["loadfile", url])).await?;
        self.set_volume(volume).await
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.send(json!(["stop"])).await?;
        Ok(())
    }

    pub async fn set_volume(&self, volume: u8) -> anyhow::Result<()> {
        self.send(json!(["set_property", "volume", volume])).await?;
        Ok(())
    }

    /// Register observe_property for every property the core cares about.
    /// Must be called after every fresh connection.
    pub async fn observe_properties(&self) {
        let props = [
            (OBS_CORE_IDLE, "core-idle"),
            (OBS_METADATA, "metadata"),
            (OBS_VOLUME, "volume"),
        ];
        for (id, name) in &props {
            match self.send(json!(["observe_property", id, name])).await {
                Ok(_) => debug!("mpv: observe_property id={} name={}", id, name),
                Err(e) => warn!("mpv: observe_property {} failed: {}", name, e),
            }
        }
    }
}

// ── driver ────────────────────────────────────────────────────────────────────

/// Owns the mpv child process.
pub struct MpvDriver {
    socket_name: String,
    process: Option<tokio::process::Child>,
    pub last_volume: u8,
}

impl MpvDriver {
    pub fn new() -> Self {
        Self {
            socket_name: platform::mpv_socket_name(),
            process: None,
            last_volume: radio_core::player::DEFAULT_VOLUME,
        }
    }

    pub fn process_alive(&mut self) -> bool {
        if let Some(ref mut child) = self.process {
            child.try_wait().ok().flatten().is_none()
        } else {
            false
        }
    }

    /// Kill the process if running.
    pub async fn kill(&mut self) {
        if let Some(mut p) = self.process.take() {
            let _ = p.kill().await;
        }
    }

    fn spawn_process(&mut self) -> anyhow::Result<()> {
        let mpv_binary =
            platform::find_mpv_binary().ok_or_else(|| anyhow::anyhow!("mpv binary not found"))?;
        info!("mpv: spawning {:?}", mpv_binary);

        let child = tokio::process::Command::new(mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg(platform::mpv_socket_arg())
            .arg("--quiet")
            .arg(format!("--volume={}", self.last_volume))
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        self.process = Some(child);
        Ok(())
    }

    #[cfg(unix)]
    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;

        let socket_path = std::path::PathBuf::from(&self.socket_name);
        let _ = tokio::fs::remove_file(&socket_path).await;

        self.spawn_process()?;

        // Wait for socket to appear
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if socket_path.exists() {
                break;
            }
        }
        if !socket_path.exists() {
            anyhow::bail!("mpv IPC socket did not appear");
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

        let stream = UnixStream::connect(&socket_path).await?;
        info!("mpv: connected to IPC socket");
        let (read_half, write_half) = stream.into_split();
        Ok(start_io_tasks(read_half, write_half, event_tx))
    }

    #[cfg(windows)]
    pub async fn spawn_and_connect(
        &mut self,
        event_tx: mpsc::Sender<MpvEvent>,
    ) -> anyhow::Result<MpvHandle> {
        self.kill().await;
        self.spawn_process()?;

        let pipe_path = format!(r"\\.\pipe\{}", self.socket_name);
        for _ in 0..50 {
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            if let Ok(client) = ClientOptions::new().open(&pipe_path) {
                info!("mpv: connected to named pipe");
                let (read_half, write_half) = tokio::io::split(client);
                return Ok(start_io_tasks(read_half, write_half, event_tx));
            }
        }
        anyhow::bail!("mpv named pipe did not appear")
    }
}

fn start_io_tasks<R, W>(read_half: R, write_half: W, event_tx: mpsc::Sender<MpvEvent>) -> MpvHandle
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    // req_id → reply channel.  Writer inserts, reader resolves.
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(write_half, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(BufReader::new(read_half), pending, event_tx));

    MpvHandle { tx: cmd_tx }
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn fail_pending(pending: &PendingMap, reason: &str) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(anyhow::anyhow!("{}", reason)));
    }
}

async fn reader_task<R>(mut reader: BufReader<R>, pending: PendingMap, event_tx: mpsc::Sender<MpvEvent>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_pending(&pending, "mpv IPC connection closed").await;
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(|v| v.as_u64()) {
                    let mut map = pending.lock().await;
                    if let Some(tx) = map.remove(&req_id) {
                        let _ = tx.send(response_result(val));
                    } else {
                        debug!("mpv reader: response for unknown req={}", req_id);
                    }
                } else {
                    debug!("mpv reader: event {}", trimmed);
                    if event_tx.send(MpvEvent { raw: val }).await.is_err() {
                        break;
                    }
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_pending(&pending, &format!("mpv IPC read error: {}", e)).await;
                break;
            }
        }
    }
}

fn response_result(val: Value) -> anyhow::Result<Value> {
    match val["error"].as_str() {
        Some("success") => Ok(val),
        other => Err(anyhow::anyhow!("mpv error: {}", other.unwrap_or("unknown error"))),
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register reply channel before writing so reader can match it
        pending.lock().await.insert(req.req_id, req.reply);
        debug!("mpv writer: send req={} payload={}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(anyhow::anyhow!("mpv write error: {}", e)));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}
