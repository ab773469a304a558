//! The per-room actor (spec §9 "global mutable state -> per-room actor").
//!
//! Every mutation to a [`Room`][crate::models::Room] happens on this task,
//! processing one command at a time from its queue, which is what gives the
//! room its total-ordering guarantee (spec §5). Periodic clock ticks ride
//! the same queue as client commands rather than a separate lock, so a tick
//! can never interleave with a command mid-mutation.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{info, warn};

use sync_player_proto::{
    BslMatchedVideo, BslPlaylistVideoRef, BslVideoStatus, ClientFileDescriptor, ClientMessage, ClientSummary,
    ControlMessage, InitialStatePayload, PlaylistEntry, PlaylistEntryInput, ServerMessage, SkipDirection,
};

use crate::bsl::{self, MatcherConfig, PlaylistFileRef};
use crate::clock::{spawn_supervised_ticker, Tick};
use crate::config::{BslAggregationMode, Config, JoinMode};
use crate::content_filter::sanitize_chat_message;
use crate::models::id::ConnectionId;
use crate::models::room::AdminSeat;
use crate::models::{Member, Room};
use crate::prober::TrackProber;
use crate::rate_limit::RateLimiter;
use crate::resilience::timeout::{AUTOPLAY_DEFEAT_DELAY, FINGERPRINT_REJECTION_GRACE};
use crate::store::Store;
use crate::validation::{ChatMessageValidator, DisplayNameValidator, FilenameValidator};

/// A message destined for one or all room members. The websocket layer
/// subscribes to the room's broadcast channel and filters by connection id.
#[derive(Debug, Clone)]
pub enum Outbound {
    ToAll(ServerMessage),
    ToOne(ConnectionId, ServerMessage),
    /// Force-close this connection after the fingerprint-lock grace period.
    Disconnect(ConnectionId),
}

#[derive(Debug, Clone)]
pub struct JoinResult {
    pub is_admin: bool,
    pub viewers: usize,
}

enum RoomCommand {
    Join {
        connection_id: ConnectionId,
        name: String,
        fingerprint: String,
        source_ip: Option<IpAddr>,
        reply: oneshot::Sender<JoinResult>,
    },
    Client {
        connection_id: ConnectionId,
        fingerprint: String,
        source_ip: Option<IpAddr>,
        message: ClientMessage,
    },
    Leave(ConnectionId),
    Summary(oneshot::Sender<sync_player_proto::PublicRoomSummary>),
    Tick,
    Shutdown,
}

/// Cheap, cloneable handle to a running room actor.
#[derive(Clone)]
pub struct RoomHandle {
    code: String,
    commands: mpsc::Sender<RoomCommand>,
    outbound: broadcast::Sender<Outbound>,
}

impl RoomHandle {
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.outbound.subscribe()
    }

    pub async fn join(
        &self,
        connection_id: ConnectionId,
        name: String,
        fingerprint: String,
        source_ip: Option<IpAddr>,
    ) -> Option<JoinResult> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(RoomCommand::Join {
                connection_id,
                name,
                fingerprint,
                source_ip,
                reply,
            })
            .await
            .ok()?;
        rx.await.ok()
    }

    pub async fn dispatch(&self, connection_id: ConnectionId, fingerprint: String, source_ip: Option<IpAddr>, message: ClientMessage) {
        let _ = self
            .commands
            .send(RoomCommand::Client {
                connection_id,
                fingerprint,
                source_ip,
                message,
            })
            .await;
    }

    pub async fn leave(&self, connection_id: ConnectionId) {
        let _ = self.commands.send(RoomCommand::Leave(connection_id)).await;
    }

    pub async fn shutdown(&self) {
        let _ = self.commands.send(RoomCommand::Shutdown).await;
    }

    /// Public metadata for `/api/rooms` (spec §6.3). Returns `None` if the
    /// room has since shut down.
    pub async fn public_summary(&self) -> Option<sync_player_proto::PublicRoomSummary> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(RoomCommand::Summary(reply)).await.ok()?;
        rx.await.ok()
    }
}

/// Commands that mutate playback or room membership and therefore require
/// the sender to hold the admin seat (spec §4.5 step 2), unless exempted.
fn requires_admin(message: &ClientMessage) -> bool {
    matches!(
        message,
        ClientMessage::SetPlaylist { .. }
            | ClientMessage::PlaylistReorder { .. }
            | ClientMessage::PlaylistJump { .. }
            | ClientMessage::TrackChange { .. }
            | ClientMessage::SkipToNextVideo
            | ClientMessage::BslCheckRequest
            | ClientMessage::BslGetStatus
            | ClientMessage::BslManualMatch { .. }
            | ClientMessage::BslSetDrift { .. }
            | ClientMessage::SetClientName { .. }
            | ClientMessage::GetClientList
            | ClientMessage::SetClientDisplayName { .. }
            | ClientMessage::DeleteRoom
    )
}

pub struct RoomActor {
    room: Room,
    config: Arc<Config>,
    store: Store,
    rate_limiter: RateLimiter,
    prober: Arc<dyn TrackProber>,
    outbound: broadcast::Sender<Outbound>,
}

impl RoomActor {
    /// Spawns the actor and its ticker, returning a handle. `admin` is the
    /// creator's connection/fingerprint, already claimed (spec §4.5
    /// `create-room` "makes the sender admin, joins them as first member").
    ///
    /// `registry` is the room's own registry entry, used only to deregister
    /// the room once its command loop exits (on `delete-room` or shutdown) —
    /// the actor has no other way to remove itself from a map it doesn't own.
    pub fn spawn(
        room: Room,
        config: Arc<Config>,
        store: Store,
        rate_limiter: RateLimiter,
        prober: Arc<dyn TrackProber>,
        registry: crate::registry::RoomRegistry,
    ) -> RoomHandle {
        let code = room.code.clone();
        let (commands_tx, commands_rx) = mpsc::channel(256);
        let (outbound_tx, _) = broadcast::channel(256);

        let actor = RoomActor {
            room,
            config,
            store,
            rate_limiter,
            prober,
            outbound: outbound_tx.clone(),
        };

        let tick_tx = {
            let (tx, mut tick_rx) = mpsc::channel::<Tick>(4);
            let forward_tx = commands_tx.clone();
            tokio::spawn(async move {
                while tick_rx.recv().await.is_some() {
                    if forward_tx.send(RoomCommand::Tick).await.is_err() {
                        break;
                    }
                }
            });
            tx
        };
        spawn_supervised_ticker(code.clone(), tick_tx);

        let cleanup_code = code.clone();
        tokio::spawn(async move {
            actor.run(commands_rx).await;
            registry.remove(&cleanup_code).await;
        });

        RoomHandle {
            code,
            commands: commands_tx,
            outbound: outbound_tx,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<RoomCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                RoomCommand::Join {
                    connection_id,
                    name,
                    fingerprint,
                    source_ip,
                    reply,
                } => {
                    let result = self.handle_join(connection_id, name, fingerprint, source_ip).await;
                    let _ = reply.send(result);
                }
                RoomCommand::Client {
                    connection_id,
                    fingerprint,
                    source_ip,
                    message,
                } => {
                    if !self.handle_client_message(connection_id, fingerprint, source_ip, message).await {
                        break;
                    }
                }
                RoomCommand::Leave(connection_id) => {
                    self.handle_leave(connection_id);
                }
                RoomCommand::Summary(reply) => {
                    let _ = reply.send(sync_player_proto::PublicRoomSummary {
                        code: self.room.code.clone(),
                        name: self.room.name.clone(),
                        viewers: self.room.viewer_count(),
                        created_at: self.room.created_at,
                        is_private: self.room.is_private,
                    });
                }
                RoomCommand::Tick => {
                    self.room.playback.advance_to(chrono::Utc::now());
                }
                RoomCommand::Shutdown => {
                    break;
                }
            }
        }
        info!(room = %self.room.code, "room actor stopped");
    }

    fn send_all(&self, message: ServerMessage) {
        let _ = self.outbound.send(Outbound::ToAll(message));
    }

    fn send_one(&self, connection_id: ConnectionId, message: ServerMessage) {
        let _ = self.outbound.send(Outbound::ToOne(connection_id, message));
    }

    async fn handle_join(
        &mut self,
        connection_id: ConnectionId,
        name: String,
        fingerprint: String,
        _source_ip: Option<IpAddr>,
    ) -> JoinResult {
        let now = chrono::Utc::now();

        if self.config.join_mode == JoinMode::Reset {
            self.room.playback.reset(now);
        }

        let validated_name = if DisplayNameValidator::new().validate(&name).is_ok() {
            name
        } else {
            self.store.client_name(&fingerprint).unwrap_or_else(|| "Viewer".to_string())
        };

        let is_admin = match &self.room.admin_seat {
            AdminSeat::Disconnected { fingerprint: admin_fp } if *admin_fp == fingerprint => {
                self.room.claim_admin(fingerprint.clone(), connection_id.clone());
                true
            }
            AdminSeat::Claimed { fingerprint: admin_fp, .. } => *admin_fp == fingerprint,
            _ => false,
        };

        self.room
            .members
            .insert(connection_id.clone(), Member::new(connection_id.clone(), fingerprint, validated_name, now));

        let viewers = self.room.viewer_count();

        if self.config.join_mode == JoinMode::Reset {
            self.send_all(ServerMessage::Sync(self.room.playback.to_snapshot()));
        } else {
            self.send_one(connection_id, ServerMessage::Sync(self.room.playback.to_snapshot()));
        }
        self.send_all(ServerMessage::ClientCount { count: viewers });

        JoinResult { is_admin, viewers }
    }

    fn handle_leave(&mut self, connection_id: ConnectionId) {
        self.room.release_admin_if(&connection_id);
        self.room.members.remove(&connection_id);
        self.rate_limiter.forget(&connection_id.to_string());
        let viewers = self.room.viewer_count();
        self.send_all(ServerMessage::ClientCount { count: viewers });
    }

    /// Returns `false` when the room should stop running (`delete-room`),
    /// `true` otherwise.
    async fn handle_client_message(
        &mut self,
        connection_id: ConnectionId,
        fingerprint: String,
        source_ip: Option<IpAddr>,
        message: ClientMessage,
    ) -> bool {
        if let Err(exceeded) = self.rate_limiter.check(&connection_id.to_string(), source_ip) {
            self.send_one(
                connection_id,
                ServerMessage::RateLimitError {
                    retry_after: exceeded.retry_after_secs,
                },
            );
            return true;
        }

        if requires_admin(&message) && !self.room.is_admin_connection(&connection_id) {
            self.send_one(
                connection_id,
                ServerMessage::AdminError {
                    command: command_name(&message).to_string(),
                    message: "admin privileges required".to_string(),
                },
            );
            return true;
        }

        if matches!(&message, ClientMessage::DeleteRoom) {
            self.handle_delete_room().await;
            return false;
        }

        match message {
            ClientMessage::SetPlaylist {
                playlist,
                main_video_index,
                start_time,
            } => self.handle_set_playlist(playlist, main_video_index, start_time).await,
            ClientMessage::Control(control) => self.handle_control(connection_id, control),
            ClientMessage::PlaylistJump { index } => self.handle_playlist_jump(index),
            ClientMessage::PlaylistNext | ClientMessage::SkipToNextVideo => {
                let next = self.room.playlist.current_index + 1;
                self.handle_playlist_jump(next);
            }
            ClientMessage::PlaylistReorder { from_index, to_index } => {
                self.handle_playlist_reorder(from_index, to_index)
            }
            ClientMessage::TrackChange {
                video_index,
                track_type,
                track_index,
            } => self.handle_track_change(video_index, track_type, track_index),
            ClientMessage::BslAdminRegister { fingerprint: claimed_fp } => {
                self.handle_bsl_admin_register(connection_id, fingerprint, claimed_fp);
            }
            ClientMessage::BslCheckRequest => self.handle_bsl_check_request(connection_id),
            ClientMessage::BslGetStatus => self.handle_bsl_get_status(connection_id),
            ClientMessage::BslFolderSelected { client_id, client_name, files } => {
                self.handle_bsl_folder_selected(connection_id, fingerprint, client_id, client_name, files)
                    .await;
            }
            ClientMessage::BslManualMatch {
                client_connection_id,
                client_file_name,
                playlist_index,
            } => {
                self.handle_bsl_manual_match(client_connection_id, client_file_name, playlist_index)
                    .await;
            }
            ClientMessage::BslSetDrift {
                client_fingerprint,
                playlist_index,
                drift_seconds,
            } => self.handle_bsl_set_drift(client_fingerprint, playlist_index, drift_seconds),
            ClientMessage::ChatMessage { sender, message } => {
                self.handle_chat_message(connection_id, fingerprint, sender, message).await;
            }
            ClientMessage::SetClientName { name } | ClientMessage::SetClientDisplayName { name } => {
                self.handle_set_client_name(fingerprint, name).await;
            }
            ClientMessage::GetClientList => self.handle_get_client_list(connection_id),
            ClientMessage::RequestSync => {
                self.send_one(connection_id, ServerMessage::Sync(self.room.playback.to_snapshot()));
            }
            ClientMessage::RequestInitialState => {
                let payload = self.initial_state_for(&connection_id);
                self.send_one(connection_id, ServerMessage::InitialState(payload));
            }
            // CreateRoom/JoinRoom/LeaveRoom/ClientRegister/GetConfig/GetRooms/DeleteRoom
            // are handled above (registry-level, global state, or the early
            // return above, respectively).
            _ => {}
        }
        true
    }

    /// Deletes room-scoped persistence, tells every member, and disconnects
    /// them; the actor's run loop stops right after this (spec §4.3/§4.5).
    async fn handle_delete_room(&mut self) {
        if let Err(e) = self.store.remove_room(&self.room.code).await {
            warn!(room = %self.room.code, error = %e, "failed to remove room from persistent store");
        }
        self.send_all(ServerMessage::RoomDeleted {
            room_code: self.room.code.clone(),
        });
        for member in self.room.members.values() {
            let _ = self.outbound.send(Outbound::Disconnect(member.connection_id.clone()));
        }
    }

    fn initial_state_for(&self, connection_id: &ConnectionId) -> InitialStatePayload {
        InitialStatePayload {
            playlist: self.room.playlist.to_snapshot(),
            sync: self.room.playback.to_snapshot(),
            is_admin: self.room.is_admin_connection(connection_id),
            viewers: self.room.viewer_count(),
        }
    }

    async fn handle_set_playlist(&mut self, inputs: Vec<PlaylistEntryInput>, main_video_index: i32, start_time: f64) {
        let filename_validator = FilenameValidator::new();
        let mut entries = Vec::with_capacity(inputs.len());
        for input in inputs {
            if filename_validator.validate(&input.filename).is_err() {
                continue;
            }
            let probed = if input.is_external {
                Default::default()
            } else {
                self.prober.probe(&input.filename).await
            };
            entries.push(PlaylistEntry {
                filename: input.filename,
                is_external: input.is_external,
                audio_tracks: probed.audio,
                subtitle_tracks: probed.subtitles,
                selected_audio_track: 0,
                selected_subtitle_track: -1,
                uses_hevc: probed.uses_hevc,
            });
        }

        self.room.playlist.replace(entries, main_video_index, start_time);
        let now = chrono::Utc::now();
        self.room.playback.reset(now);
        self.room.playback.is_playing = self.config.video_autoplay;

        self.send_all(ServerMessage::PlaylistUpdate(self.room.playlist.to_snapshot()));
        self.send_all(ServerMessage::Sync(self.room.playback.to_snapshot()));

        if !self.config.video_autoplay {
            let outbound = self.outbound.clone();
            let snapshot = self.room.playback.to_snapshot();
            tokio::spawn(async move {
                tokio::time::sleep(AUTOPLAY_DEFEAT_DELAY).await;
                let mut defeated = snapshot;
                defeated.is_playing = false;
                let _ = outbound.send(Outbound::ToAll(ServerMessage::Sync(defeated)));
            });
        }
    }

    fn handle_control(&mut self, connection_id: ConnectionId, control: ControlMessage) {
        let now = chrono::Utc::now();
        let is_admin = self.room.is_admin_connection(&connection_id);

        let Some(action) = control.action.as_deref() else {
            // client_sync_disabled blocks raw position pushes from anyone but the admin.
            if !is_admin && self.config.client_sync_disabled {
                return;
            }
            if let (Some(is_playing), Some(current_time)) = (control.is_playing, control.current_time) {
                self.room.playback.advance_to(now);
                self.room.playback.is_playing = is_playing;
                self.room.playback.current_time = current_time.max(0.0);
                self.room.playback.last_update = now;
                self.send_all(ServerMessage::Sync(self.room.playback.to_snapshot()));
            }
            return;
        };

        // client_controls_disabled blocks named actions (play/pause/skip/seek/
        // track selection) from non-admins; it does not affect raw pushes above (spec §4.1).
        if !is_admin && self.config.client_controls_disabled {
            return;
        }

        match action {
            "playpause" => {
                if let Some(state) = control.state {
                    if state {
                        self.room.playback.play(now);
                    } else {
                        self.room.playback.pause(now);
                    }
                    self.send_all(ServerMessage::Sync(self.room.playback.to_snapshot()));
                }
            }
            "skip" => {
                if let Some(seconds) = control.seconds {
                    let delta = match control.direction {
                        Some(SkipDirection::Backward) => -seconds,
                        _ => seconds,
                    };
                    self.room.playback.advance_to(now);
                    let new_time = (self.room.playback.current_time + delta).max(0.0);
                    self.room.playback.current_time = new_time;
                    self.room.playback.last_update = now;
                    self.send_all(ServerMessage::Sync(self.room.playback.to_snapshot()));
                }
            }
            "seek" => {
                if let Some(time) = control.time {
                    if time.is_finite() && time >= 0.0 {
                        self.room.playback.seek(now, time);
                        self.send_all(ServerMessage::Sync(self.room.playback.to_snapshot()));
                    }
                }
            }
            "selectTrack" => {
                if let (Some(track_type), Some(track_index)) = (control.track_type, control.track_index) {
                    if track_index >= -1 {
                        match track_type {
                            sync_player_proto::TrackType::Audio => self.room.playback.audio_track = track_index,
                            sync_player_proto::TrackType::Subtitle => self.room.playback.subtitle_track = track_index,
                        }
                        self.send_all(ServerMessage::Sync(self.room.playback.to_snapshot()));
                    }
                }
            }
            _ => {
                self.send_one(
                    connection_id,
                    ServerMessage::ControlRejected {
                        reason: format!("unknown action: {action}"),
                    },
                );
            }
        }
    }

    fn handle_playlist_jump(&mut self, index: i32) {
        if !self.room.playlist.is_valid_index(index) {
            return;
        }
        self.room.playlist.current_index = index;
        let now = chrono::Utc::now();
        self.room.playback.reset(now);
        if let Some(entry) = self.room.playlist.current_entry() {
            self.room.playback.audio_track = entry.selected_audio_track;
            self.room.playback.subtitle_track = entry.selected_subtitle_track;
        }
        self.send_all(ServerMessage::PlaylistUpdate(self.room.playlist.to_snapshot()));
        self.send_all(ServerMessage::Sync(self.room.playback.to_snapshot()));
    }

    fn handle_playlist_reorder(&mut self, from_index: i32, to_index: i32) {
        if from_index < 0 || to_index < 0 {
            return;
        }
        if self.room.playlist.reorder(from_index as usize, to_index as usize) {
            self.send_all(ServerMessage::PlaylistUpdate(self.room.playlist.to_snapshot()));
        }
    }

    fn handle_track_change(&mut self, video_index: i32, track_type: sync_player_proto::TrackType, track_index: i32) {
        if !self.room.playlist.is_valid_index(video_index) || track_index < -1 {
            return;
        }
        let is_current = video_index == self.room.playlist.current_index;
        if let Some(entry) = self.room.playlist.videos.get_mut(video_index as usize) {
            match track_type {
                sync_player_proto::TrackType::Audio => entry.selected_audio_track = track_index,
                sync_player_proto::TrackType::Subtitle => entry.selected_subtitle_track = track_index,
            }
        }
        if is_current {
            match track_type {
                sync_player_proto::TrackType::Audio => self.room.playback.audio_track = track_index,
                sync_player_proto::TrackType::Subtitle => self.room.playback.subtitle_track = track_index,
            }
            self.send_all(ServerMessage::Sync(self.room.playback.to_snapshot()));
        }
        self.send_all(ServerMessage::TrackChange {
            video_index,
            track_type,
            track_index,
        });
    }

    fn handle_bsl_admin_register(&mut self, connection_id: ConnectionId, fingerprint: String, claimed: Option<String>) {
        let fingerprint = claimed.unwrap_or(fingerprint);

        if !self.config.admin_fingerprint_lock {
            self.room.claim_admin(fingerprint, connection_id.clone());
            self.send_one(connection_id, ServerMessage::AdminAuthResult { success: true, reason: None });
            return;
        }

        match self.room.admin_seat.fingerprint() {
            None => {
                self.room.claim_admin(fingerprint, connection_id.clone());
                self.send_one(connection_id, ServerMessage::AdminAuthResult { success: true, reason: None });
            }
            Some(existing) if existing == fingerprint => {
                self.room.claim_admin(fingerprint, connection_id.clone());
                self.send_one(connection_id, ServerMessage::AdminAuthResult { success: true, reason: None });
            }
            Some(_) => {
                self.send_one(
                    connection_id.clone(),
                    ServerMessage::AdminAuthResult {
                        success: false,
                        reason: Some("fingerprint does not match the registered admin".to_string()),
                    },
                );
                let outbound = self.outbound.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(FINGERPRINT_REJECTION_GRACE).await;
                    let _ = outbound.send(Outbound::Disconnect(connection_id));
                });
            }
        }
    }

    fn handle_bsl_check_request(&mut self, admin_connection: ConnectionId) {
        let playlist_videos: Vec<BslPlaylistVideoRef> = self
            .room
            .playlist
            .videos
            .iter()
            .map(|entry| BslPlaylistVideoRef { filename: entry.filename.clone() })
            .collect();

        let mut client_count = 0usize;
        for member in self.room.members.values() {
            if self.room.is_admin_connection(&member.connection_id) || member.bsl_report.is_some() {
                continue;
            }
            self.send_one(
                member.connection_id.clone(),
                ServerMessage::BslCheckRequest {
                    playlist_videos: playlist_videos.clone(),
                },
            );
            client_count += 1;
        }

        self.send_one(admin_connection, ServerMessage::BslCheckStarted { client_count });
    }

    fn handle_bsl_get_status(&mut self, admin_connection: ConnectionId) {
        let per_video = self.compute_bsl_status();
        self.send_one(admin_connection, ServerMessage::BslStatusUpdate { per_video });
    }

    fn compute_bsl_status(&self) -> HashMap<String, BslVideoStatus> {
        let reporting_count = self.room.members.values().filter(|m| m.bsl_report.is_some()).count();
        let mut per_video = HashMap::new();
        for (index, _) in self.room.playlist.videos.iter().enumerate() {
            let matched_count = self
                .room
                .members
                .values()
                .filter_map(|m| m.bsl_report.as_ref())
                .filter(|r| r.matches.contains_key(&(index as i32)))
                .count();
            per_video.insert(
                index.to_string(),
                BslVideoStatus {
                    active: bsl::is_active(self.config.bsl_s2_mode, matched_count, reporting_count),
                    matched_count,
                    reporting_count,
                },
            );
        }
        per_video
    }

    async fn handle_bsl_folder_selected(
        &mut self,
        connection_id: ConnectionId,
        fingerprint: String,
        client_id: Option<String>,
        client_name: Option<String>,
        files: Vec<ClientFileDescriptor>,
    ) {
        let filename_validator = FilenameValidator::new();
        let mut playlist_refs = Vec::with_capacity(self.room.playlist.videos.len());
        for entry in &self.room.playlist.videos {
            let size_bytes = if !entry.is_external && filename_validator.validate(&entry.filename).is_ok() {
                tokio::fs::metadata(self.config.media_dir.join(&entry.filename))
                    .await
                    .ok()
                    .map(|metadata| metadata.len())
            } else {
                None
            };
            playlist_refs.push(PlaylistFileRef {
                filename: entry.filename.clone(),
                size_bytes,
            });
        }

        let manual = self.store.bsl_matches(&fingerprint);
        let manual_lower: HashMap<String, String> = manual
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.to_lowercase()))
            .collect();

        let matched = bsl::match_files(
            &files,
            &playlist_refs,
            &manual_lower,
            MatcherConfig {
                advanced_match: self.config.bsl_advanced_match,
                threshold: self.config.bsl_advanced_match_threshold,
            },
        );

        let matched_videos: Vec<BslMatchedVideo> = matched
            .iter()
            .map(|(&index, client_file_name)| BslMatchedVideo {
                playlist_index: index as i32,
                filename: self.room.playlist.videos[index].filename.clone(),
                client_file_name: client_file_name.clone(),
            })
            .collect();
        let total_matched = matched_videos.len();
        let total_playlist = self.room.playlist.videos.len();

        if let Some(member) = self.room.members.get_mut(&connection_id) {
            member.bsl_report = Some(crate::models::BslReport {
                client_id,
                client_name,
                matches: matched.into_iter().map(|(idx, name)| (idx as i32, name)).collect(),
            });
        }

        self.send_one(
            connection_id,
            ServerMessage::BslMatchResult {
                matched_videos,
                total_matched,
                total_playlist,
            },
        );

        let per_video = self.compute_bsl_status();
        if let Some(admin) = self.room.admin_seat.holder_connection().cloned() {
            self.send_one(admin, ServerMessage::BslStatusUpdate { per_video });
        }
    }

    async fn handle_bsl_manual_match(&mut self, client_connection_id: String, client_file_name: String, playlist_index: i32) {
        if !self.room.playlist.is_valid_index(playlist_index) {
            return;
        }
        let target_connection = ConnectionId(client_connection_id);
        let Some(member) = self.room.members.get_mut(&target_connection) else {
            return;
        };
        let fingerprint = member.fingerprint.clone();
        let playlist_filename = self.room.playlist.videos[playlist_index as usize].filename.clone();

        member
            .bsl_report
            .get_or_insert_with(|| crate::models::BslReport {
                client_id: None,
                client_name: None,
                matches: HashMap::new(),
            })
            .matches
            .insert(playlist_index, client_file_name.clone());

        if let Err(e) = self
            .store
            .set_bsl_match(&fingerprint, &client_file_name.to_lowercase(), &playlist_filename.to_lowercase())
            .await
        {
            warn!(error = %e, "failed to persist manual BSL match");
        }

        self.send_one(
            target_connection,
            ServerMessage::BslMatchResult {
                matched_videos: vec![BslMatchedVideo {
                    playlist_index,
                    filename: playlist_filename,
                    client_file_name,
                }],
                total_matched: 1,
                total_playlist: self.room.playlist.videos.len(),
            },
        );
    }

    fn handle_bsl_set_drift(&mut self, client_fingerprint: String, playlist_index: i32, drift_seconds: f64) {
        let clamped = self.room.set_drift(&client_fingerprint, playlist_index, drift_seconds);
        let drift_values = self
            .room
            .drift
            .get(&client_fingerprint)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<HashMap<_, _>>();

        let targets: Vec<ConnectionId> = self.room.connections_for_fingerprint(&client_fingerprint).cloned().collect();
        for target in targets {
            self.send_one(target, ServerMessage::BslDriftUpdate { drift_values: drift_values.clone() });
        }
        let _ = clamped;
    }

    async fn handle_chat_message(&mut self, connection_id: ConnectionId, fingerprint: String, sender: String, message: String) {
        if !self.config.chat_enabled {
            return;
        }

        if let Some(new_name) = message.strip_prefix("/rename ") {
            let new_name = new_name.trim();
            if DisplayNameValidator::new().validate(new_name).is_ok() {
                self.handle_set_client_name(fingerprint.clone(), new_name.to_string()).await;
                self.send_all(ServerMessage::ChatMessage {
                    sender: "system".to_string(),
                    message: format!("{sender} is now known as {new_name}"),
                    timestamp: chrono::Utc::now(),
                });
            }
            return;
        }

        if ChatMessageValidator::new().validate(&message).is_err() {
            return;
        }

        let sanitized_sender = sanitize_chat_message(&sender);
        let sanitized_message = sanitize_chat_message(&message);
        self.send_all(ServerMessage::ChatMessage {
            sender: sanitized_sender,
            message: sanitized_message,
            timestamp: chrono::Utc::now(),
        });
        let _ = connection_id;
    }

    async fn handle_set_client_name(&mut self, fingerprint: String, name: String) {
        for member in self.room.members.values_mut() {
            if member.fingerprint == fingerprint {
                member.display_name = name.clone();
            }
        }
        if let Err(e) = self.store.set_client_name(&fingerprint, &name).await {
            warn!(error = %e, "failed to persist client name");
        }
        self.send_all(ServerMessage::NameUpdated { fingerprint, name });
    }

    fn handle_get_client_list(&mut self, requester: ConnectionId) {
        let clients: Vec<ClientSummary> = self
            .room
            .members
            .values()
            .map(|m| ClientSummary {
                fingerprint: m.fingerprint.clone(),
                name: m.display_name.clone(),
                is_admin: self.room.is_admin_connection(&m.connection_id),
                connected_at: m.connected_at,
            })
            .collect();
        self.send_one(requester, ServerMessage::ClientList { clients });
    }
}

fn command_name(message: &ClientMessage) -> &'static str {
    match message {
        ClientMessage::SetPlaylist { .. } => "set-playlist",
        ClientMessage::PlaylistReorder { .. } => "playlist-reorder",
        ClientMessage::PlaylistJump { .. } => "playlist-jump",
        ClientMessage::TrackChange { .. } => "track-change",
        ClientMessage::SkipToNextVideo => "skip-to-next-video",
        ClientMessage::BslCheckRequest => "bsl-check-request",
        ClientMessage::BslGetStatus => "bsl-get-status",
        ClientMessage::BslManualMatch { .. } => "bsl-manual-match",
        ClientMessage::BslSetDrift { .. } => "bsl-set-drift",
        ClientMessage::SetClientName { .. } => "set-client-name",
        ClientMessage::GetClientList => "get-client-list",
        ClientMessage::SetClientDisplayName { .. } => "set-client-display-name",
        ClientMessage::DeleteRoom => "delete-room",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prober::NullProber;
    use std::time::Duration as StdDuration;

    async fn test_actor_handle() -> RoomHandle {
        let room = Room::new("ABCDEF".into(), "Test Room".into(), false, chrono::Utc::now());
        let config = Arc::new(Config::default());
        let dir = std::env::temp_dir().join(format!("sync-player-actor-{}", nanoid::nanoid!(6)));
        let cipher = crate::secrets::FingerprintCipher::new(&(0u8..32).collect::<Vec<u8>>()).unwrap();
        let store = Store::load(dir.join("store.json"), cipher).await;
        RoomActor::spawn(
            room,
            config,
            store,
            RateLimiter::new(),
            Arc::new(NullProber),
            crate::registry::RoomRegistry::new(),
        )
    }

    #[tokio::test]
    async fn join_gives_admin_to_matching_fingerprint() {
        let handle = test_actor_handle().await;
        let conn = ConnectionId::new();
        let result = handle.join(conn.clone(), "Alex".into(), "fp1".into(), None).await.unwrap();
        // first join, no admin claimed yet by fingerprint lock alone
        assert!(!result.is_admin);
        assert_eq!(result.viewers, 1);
    }

    #[tokio::test]
    async fn non_admin_playlist_change_is_rejected() {
        let handle = test_actor_handle().await;
        let conn = ConnectionId::new();
        handle.join(conn.clone(), "Alex".into(), "fp1".into(), None).await.unwrap();

        let mut rx = handle.subscribe();
        handle
            .dispatch(
                conn.clone(),
                "fp1".into(),
                None,
                ClientMessage::SetPlaylist {
                    playlist: vec![],
                    main_video_index: -1,
                    start_time: 0.0,
                },
            )
            .await;

        let received = tokio::time::timeout(StdDuration::from_millis(200), rx.recv()).await;
        match received {
            Ok(Ok(Outbound::ToOne(_, ServerMessage::AdminError { command, .. }))) => {
                assert_eq!(command, "set-playlist");
            }
            other => panic!("expected admin-error, got {other:?}"),
        }
    }
}
