use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use radio_core::core::{RadioEvent, RadioState};
use radio_core::player::MAX_VOLUME;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

#[derive(Clone)]
struct HttpState {
    state_rx: watch::Receiver<RadioState>,
    event_tx: mpsc::UnboundedSender<RadioEvent>,
}

#[derive(Serialize)]
struct VolumeStatus {
    volume: u8,
}

pub fn router(
    state_rx: watch::Receiver<RadioState>,
    event_tx: mpsc::UnboundedSender<RadioEvent>,
) -> Router {
    Router::new()
        .route("/api/state", get(get_state))
        .route("/api/select/:slot", get(select_station).post(select_station))
        .route("/api/play", get(play).post(play))
        .route("/api/stop", get(stop).post(stop))
        .route("/api/toggle", get(toggle).post(toggle))
        .route("/api/volume/:volume", get(set_volume).post(set_volume))
        .route("/api/volume", get(get_volume))
        .route("/api/logo/:slot", get(get_logo))
        .with_state(HttpState { state_rx, event_tx })
}

pub fn start_server(
    bind_address: String,
    port: u16,
    state_rx: watch::Receiver<RadioState>,
    event_tx: mpsc::UnboundedSender<RadioEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(state_rx, event_tx);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

fn enqueue(state: &HttpState, event: RadioEvent) -> StatusCode {
    if state.event_tx.send(event).is_err() {
        error!("HTTP API: radio core is gone");
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::ACCEPTED
}

async fn get_state(State(state): State<HttpState>) -> Json<RadioState> {
    Json(state.state_rx.borrow().clone())
}

async fn select_station(State(state): State<HttpState>, Path(slot): Path<usize>) -> StatusCode {
    info!("HTTP API: Select slot {}", slot);
    if state.state_rx.borrow().station(slot).is_none() {
        return StatusCode::NOT_FOUND;
    }
    enqueue(&state, RadioEvent::SelectSlot(slot))
}

async fn play(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: Play");
    enqueue(&state, RadioEvent::Play)
}

async fn stop(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: Stop");
    enqueue(&state, RadioEvent::Stop)
}

async fn toggle(State(state): State<HttpState>) -> StatusCode {
    info!("HTTP API: Toggle");
    enqueue(&state, RadioEvent::TogglePlayback)
}

async fn set_volume(State(state): State<HttpState>, Path(volume): Path<i64>) -> StatusCode {
    let volume = volume.clamp(0, MAX_VOLUME as i64) as u8;
    info!("HTTP API: Set volume to {}%", volume);
    enqueue(&state, RadioEvent::SetVolume(volume))
}

async fn get_volume(State(state): State<HttpState>) -> Json<VolumeStatus> {
    Json(VolumeStatus {
        volume: state.state_rx.borrow().volume,
    })
}

async fn get_logo(State(state): State<HttpState>, Path(slot): Path<usize>) -> Response {
    let logo = state
        .state_rx
        .borrow()
        .station(slot)
        .and_then(|s| s.logo.clone());
    match logo {
        Some(img) => (
            [(header::CONTENT_TYPE, img.mime_type())],
            img.data().to_vec(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
