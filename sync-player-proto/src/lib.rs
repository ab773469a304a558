//! Wire protocol for Sync-Player's persistent bidirectional message channel.
//!
//! Every event is a JSON object tagged by its `event` field, with the
//! event-specific payload nested under `data`. This mirrors how the server's
//! event router dispatches by event name rather than by a fixed RPC schema.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One audio or subtitle stream reported by the probe interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub index: i32,
    pub codec: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    Audio,
    Subtitle,
}

/// A single entry in a room's playlist, as broadcast to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub filename: String,
    #[serde(rename = "isExternal", default)]
    pub is_external: bool,
    #[serde(default)]
    pub audio_tracks: Vec<TrackInfo>,
    #[serde(default)]
    pub subtitle_tracks: Vec<TrackInfo>,
    #[serde(rename = "selectedAudioTrack", default)]
    pub selected_audio_track: i32,
    #[serde(rename = "selectedSubtitleTrack", default = "default_subtitle_track")]
    pub selected_subtitle_track: i32,
    #[serde(rename = "usesHEVC", default)]
    pub uses_hevc: bool,
}

const fn default_subtitle_track() -> i32 {
    -1
}

/// What a client sends when proposing a playlist via `set-playlist`.
///
/// Tracks are not accepted from the client; the server probes them.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistEntryInput {
    pub filename: String,
    #[serde(rename = "isExternal", default)]
    pub is_external: bool,
}

/// The full playlist snapshot broadcast as `playlist-update`.
#[derive(Debug, Clone, Serialize)]
pub struct PlaylistSnapshot {
    pub videos: Vec<PlaylistEntry>,
    #[serde(rename = "currentIndex")]
    pub current_index: i32,
    #[serde(rename = "mainVideoIndex")]
    pub main_video_index: i32,
    #[serde(rename = "mainVideoStartTime")]
    pub main_video_start_time: f64,
    #[serde(rename = "preloadMainVideo")]
    pub preload_main_video: bool,
}

/// The playback-state snapshot broadcast as `sync`.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSnapshot {
    #[serde(rename = "isPlaying")]
    pub is_playing: bool,
    #[serde(rename = "currentTime")]
    pub current_time: f64,
    #[serde(rename = "audioTrack")]
    pub audio_track: i32,
    #[serde(rename = "subtitleTrack")]
    pub subtitle_track: i32,
    #[serde(rename = "serverTime")]
    pub server_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitialStatePayload {
    pub playlist: PlaylistSnapshot,
    pub sync: SyncSnapshot,
    #[serde(rename = "isAdmin")]
    pub is_admin: bool,
    pub viewers: usize,
}

/// A file the client reports as locally available, for BSL-S² matching.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientFileDescriptor {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(rename = "type", default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BslPlaylistVideoRef {
    pub filename: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BslMatchedVideo {
    #[serde(rename = "playlistIndex")]
    pub playlist_index: i32,
    pub filename: String,
    #[serde(rename = "clientFileName")]
    pub client_file_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BslVideoStatus {
    pub active: bool,
    #[serde(rename = "matchedCount")]
    pub matched_count: usize,
    #[serde(rename = "reportingCount")]
    pub reporting_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientSummary {
    pub fingerprint: String,
    pub name: String,
    #[serde(rename = "isAdmin")]
    pub is_admin: bool,
    #[serde(rename = "connectedAt")]
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicRoomSummary {
    pub code: String,
    pub name: String,
    pub viewers: usize,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "isPrivate")]
    pub is_private: bool,
}

/// Messages a client sends over the persistent channel.
///
/// Unknown `event` tags deserialize to `Err` at the transport boundary and
/// are dropped by the caller rather than propagated (spec §9, "Unknown tags
/// are silently dropped").
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    CreateRoom {
        name: String,
        #[serde(rename = "isPrivate", default)]
        is_private: bool,
        fingerprint: String,
    },
    JoinRoom {
        #[serde(rename = "roomCode")]
        room_code: String,
        name: String,
        fingerprint: String,
    },
    LeaveRoom,
    SetPlaylist {
        playlist: Vec<PlaylistEntryInput>,
        #[serde(rename = "mainVideoIndex", default = "default_neg_one")]
        main_video_index: i32,
        #[serde(rename = "startTime", default)]
        start_time: f64,
    },
    Control(ControlMessage),
    PlaylistJump {
        index: i32,
    },
    PlaylistNext,
    SkipToNextVideo,
    PlaylistReorder {
        #[serde(rename = "fromIndex")]
        from_index: i32,
        #[serde(rename = "toIndex")]
        to_index: i32,
    },
    TrackChange {
        #[serde(rename = "videoIndex")]
        video_index: i32,
        #[serde(rename = "type")]
        track_type: TrackType,
        #[serde(rename = "trackIndex")]
        track_index: i32,
    },
    BslAdminRegister {
        #[serde(default)]
        fingerprint: Option<String>,
    },
    BslCheckRequest,
    BslGetStatus,
    BslFolderSelected {
        #[serde(rename = "clientId", default)]
        client_id: Option<String>,
        #[serde(rename = "clientName", default)]
        client_name: Option<String>,
        files: Vec<ClientFileDescriptor>,
    },
    BslManualMatch {
        #[serde(rename = "clientConnectionId")]
        client_connection_id: String,
        #[serde(rename = "clientFileName")]
        client_file_name: String,
        #[serde(rename = "playlistIndex")]
        playlist_index: i32,
    },
    BslSetDrift {
        #[serde(rename = "clientFingerprint")]
        client_fingerprint: String,
        #[serde(rename = "playlistIndex")]
        playlist_index: i32,
        #[serde(rename = "driftSeconds")]
        drift_seconds: f64,
    },
    SetClientName {
        name: String,
    },
    GetClientList,
    SetClientDisplayName {
        name: String,
    },
    DeleteRoom,
    RequestInitialState,
    RequestSync,
    ClientRegister {
        fingerprint: String,
    },
    GetConfig,
    GetRooms,
    ChatMessage {
        sender: String,
        message: String,
    },
}

const fn default_neg_one() -> i32 {
    -1
}

/// The inline `control` payload. `action` is absent for a raw client sync
/// push; present, it selects which of the remaining fields apply.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlMessage {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub state: Option<bool>,
    #[serde(default)]
    pub direction: Option<SkipDirection>,
    #[serde(default)]
    pub seconds: Option<f64>,
    #[serde(default)]
    pub time: Option<f64>,
    #[serde(rename = "type", default)]
    pub track_type: Option<TrackType>,
    #[serde(rename = "trackIndex", default)]
    pub track_index: Option<i32>,
    #[serde(rename = "isPlaying", default)]
    pub is_playing: Option<bool>,
    #[serde(rename = "currentTime", default)]
    pub current_time: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipDirection {
    Forward,
    Backward,
}

/// Messages the server pushes to a client over the persistent channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    Config(serde_json::Value),
    Sync(SyncSnapshot),
    PlaylistUpdate(PlaylistSnapshot),
    PlaylistPosition {
        #[serde(rename = "currentIndex")]
        current_index: i32,
    },
    TrackChange {
        #[serde(rename = "videoIndex")]
        video_index: i32,
        #[serde(rename = "type")]
        track_type: TrackType,
        #[serde(rename = "trackIndex")]
        track_index: i32,
    },
    InitialState(InitialStatePayload),
    BslCheckRequest {
        #[serde(rename = "playlistVideos")]
        playlist_videos: Vec<BslPlaylistVideoRef>,
    },
    BslMatchResult {
        #[serde(rename = "matchedVideos")]
        matched_videos: Vec<BslMatchedVideo>,
        #[serde(rename = "totalMatched")]
        total_matched: usize,
        #[serde(rename = "totalPlaylist")]
        total_playlist: usize,
    },
    BslDriftUpdate {
        #[serde(rename = "driftValues")]
        drift_values: HashMap<String, f64>,
    },
    BslStatusUpdate {
        #[serde(rename = "perVideo")]
        per_video: HashMap<String, BslVideoStatus>,
    },
    BslCheckStarted {
        #[serde(rename = "clientCount")]
        client_count: usize,
    },
    ClientCount {
        count: usize,
    },
    ChatMessage {
        sender: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    NameUpdated {
        fingerprint: String,
        name: String,
    },
    AdminAuthResult {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    AdminError {
        command: String,
        message: String,
    },
    RateLimitError {
        #[serde(rename = "retryAfter")]
        retry_after: u64,
    },
    ControlRejected {
        reason: String,
    },
    ClientList {
        clients: Vec<ClientSummary>,
    },
    ViewerCount {
        count: usize,
    },
    RoomsUpdated {
        rooms: Vec<PublicRoomSummary>,
    },
    RoomDeleted {
        #[serde(rename = "roomCode")]
        room_code: String,
    },
    /// Generic structured error for validation/persistence failures that
    /// have no more specific event (spec §7's "structured reply").
    Error {
        code: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_create_room() {
        let json = r#"{"event":"create-room","data":{"name":"Movie Night","isPrivate":true,"fingerprint":"fp1"}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::CreateRoom { name, is_private, fingerprint } => {
                assert_eq!(name, "Movie Night");
                assert!(is_private);
                assert_eq!(fingerprint, "fp1");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn decodes_raw_sync_control_without_action() {
        let json = r#"{"event":"control","data":{"isPlaying":true,"currentTime":12.5}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Control(c) => {
                assert!(c.action.is_none());
                assert_eq!(c.is_playing, Some(true));
                assert_eq!(c.current_time, Some(12.5));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn decodes_seek_control() {
        let json = r#"{"event":"control","data":{"action":"seek","time":42.0}}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Control(c) => {
                assert_eq!(c.action.as_deref(), Some("seek"));
                assert_eq!(c.time, Some(42.0));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_fails_to_decode() {
        let json = r#"{"event":"not-a-real-event","data":{}}"#;
        let result: Result<ClientMessage, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn server_message_round_trips_field_names() {
        let msg = ServerMessage::RateLimitError { retry_after: 5 };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"retryAfter\":5"));
        assert!(json.contains("\"event\":\"rate-limit-error\""));
    }
}
