//! WebSocket upgrade and per-connection message pump (spec §6.4).
//!
//! `create-room`/`join-room` are handled here, against the registry,
//! because they happen before the connection is a member of any room's
//! actor; everything else is forwarded to the room's [`RoomHandle`]. Once a
//! join succeeds, the socket's write half moves into a dedicated pump task
//! that relays the room's broadcast channel, so this task only needs to
//! keep reading client frames.

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};

use sync_player_core::models::id::ConnectionId;
use sync_player_core::models::Room;
use sync_player_core::registry::LEGACY_ROOM_CODE;
use sync_player_core::room_actor::{Outbound, RoomActor, RoomHandle};
use sync_player_proto::{ClientMessage, InitialStatePayload, PlaylistSnapshot, ServerMessage, SyncSnapshot};

use crate::server::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(upgrade))
}

async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

async fn handle_socket(socket: WebSocket, state: AppState, addr: SocketAddr) {
    let (sink, mut stream) = socket.split();
    let mut sink = Some(sink);
    let connection_id = ConnectionId::new();
    let mut room: Option<RoomHandle> = None;
    let mut fingerprint = String::new();

    while let Some(frame) = stream.next().await {
        let Ok(Message::Text(text)) = frame else {
            continue;
        };

        let message: ClientMessage = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(_) => continue, // unknown/malformed tags are silently dropped (spec §9)
        };

        match message {
            ClientMessage::CreateRoom { name, is_private, fingerprint: fp } => {
                fingerprint = fp.clone();
                let Ok(code) = state.registry.generate_unique_code() else {
                    if let Some(s) = sink.as_mut() {
                        let _ = send(s, &error("room-creation-failed", "could not allocate a room code")).await;
                    }
                    continue;
                };
                let mut new_room = Room::new(code.clone(), name, is_private, chrono::Utc::now());
                new_room.claim_admin(fp.clone(), connection_id.clone());
                let handle = RoomActor::spawn(
                    new_room,
                    state.config.clone(),
                    state.store.clone(),
                    state.rate_limiter.clone(),
                    state.prober.clone(),
                    state.registry.clone(),
                );
                state.registry.insert(code.clone(), handle.clone());
                info!(room = %code, "room created");

                let outbound_rx = handle.subscribe();
                if let Some(join) = handle.join(connection_id.clone(), "Admin".into(), fp, Some(addr.ip())).await {
                    if let Some(mut s) = sink.take() {
                        let initial = initial_state_payload(join.is_admin, join.viewers);
                        let _ = send(&mut s, &initial).await;
                        spawn_outbound_pump(s, outbound_rx, connection_id.clone());
                    }
                }
                room = Some(handle);
            }
            ClientMessage::JoinRoom { room_code, name, fingerprint: fp } => {
                fingerprint = fp.clone();
                let code = if state.config.server_mode { room_code } else { LEGACY_ROOM_CODE.to_string() };
                let Some(handle) = state.registry.get(&code) else {
                    if let Some(s) = sink.as_mut() {
                        let _ = send(s, &error("room-not-found", &format!("no room with code {code}"))).await;
                    }
                    continue;
                };
                let outbound_rx = handle.subscribe();
                if let Some(join) = handle.join(connection_id.clone(), name, fp, Some(addr.ip())).await {
                    info!(room = %code, admin = join.is_admin, "connection joined");
                    if let Some(s) = sink.take() {
                        spawn_outbound_pump(s, outbound_rx, connection_id.clone());
                    }
                    room = Some(handle);
                }
            }
            ClientMessage::LeaveRoom => {
                if let Some(handle) = room.take() {
                    handle.leave(connection_id.clone()).await;
                }
            }
            other => {
                if let Some(handle) = &room {
                    handle.dispatch(connection_id.clone(), fingerprint.clone(), Some(addr.ip()), other).await;
                }
            }
        }
    }

    if let Some(handle) = room {
        handle.leave(connection_id).await;
    }
}

fn initial_state_payload(is_admin: bool, viewers: usize) -> ServerMessage {
    ServerMessage::InitialState(InitialStatePayload {
        playlist: PlaylistSnapshot {
            videos: vec![],
            current_index: -1,
            main_video_index: -1,
            main_video_start_time: 0.0,
            preload_main_video: false,
        },
        sync: SyncSnapshot {
            is_playing: false,
            current_time: 0.0,
            audio_track: 0,
            subtitle_track: -1,
            server_time: chrono::Utc::now(),
        },
        is_admin,
        viewers,
    })
}

fn error(code: &str, message: &str) -> ServerMessage {
    ServerMessage::Error {
        code: code.to_string(),
        message: message.to_string(),
    }
}

async fn send(sink: &mut SplitSink<WebSocket, Message>, message: &ServerMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(message) {
        Ok(json) => sink.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!(error = %e, "failed to serialize outbound message");
            Ok(())
        }
    }
}

fn spawn_outbound_pump(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound_rx: tokio::sync::broadcast::Receiver<Outbound>,
    connection_id: ConnectionId,
) {
    tokio::spawn(async move {
        loop {
            match outbound_rx.recv().await {
                Ok(Outbound::ToAll(message)) => {
                    if send(&mut sink, &message).await.is_err() {
                        break;
                    }
                }
                Ok(Outbound::ToOne(target, message)) if target == connection_id => {
                    if send(&mut sink, &message).await.is_err() {
                        break;
                    }
                }
                Ok(Outbound::ToOne(_, _)) => {}
                Ok(Outbound::Disconnect(target)) if target == connection_id => {
                    let _ = sink.close().await;
                    break;
                }
                Ok(Outbound::Disconnect(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
