mod http;
mod probe;
mod server;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info};

use sync_player_core::config::load_config;
use sync_player_core::logging::init_logging;
use sync_player_core::registry::RoomRegistry;
use sync_player_core::resilience::timeout::SHUTDOWN_DRAIN_TIMEOUT;
use sync_player_core::secrets::FingerprintCipher;
use sync_player_core::store::Store;

use crate::probe::FfprobeProber;
use crate::server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("SYNC_CONFIG_FILE").ok().map(std::path::PathBuf::from);
    let config = Arc::new(load_config(config_path.as_deref()));

    init_logging(&config.logging)?;
    info!(port = config.port, server_mode = config.server_mode, "sync-player starting");

    // Only bind failure and key-derivation failure are fatal (spec §7).
    let (cipher, key_source) = FingerprintCipher::from_env();
    info!(?key_source, "fingerprint encryption key ready");

    let store = Store::load(config.store_path.clone(), cipher).await;
    let registry = RoomRegistry::new();
    let prober: Arc<dyn sync_player_core::prober::TrackProber> = Arc::new(FfprobeProber::new(config.media_dir.clone()));

    let state = AppState::new(config.clone(), registry, store, prober);

    if !config.server_mode {
        bootstrap_legacy_room(&state).await;
    }

    let app = server::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(error = %e, %addr, "failed to bind listening port");
        e
    })?;
    info!(%addr, "listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

/// In single-room mode there is always exactly one implicit room (spec
/// §4.3); it is created eagerly rather than on first `create-room`.
async fn bootstrap_legacy_room(state: &AppState) {
    use sync_player_core::models::{AdminSeat, Room};
    use sync_player_core::registry::LEGACY_ROOM_CODE;
    use sync_player_core::room_actor::RoomActor;

    let mut room = Room::new(LEGACY_ROOM_CODE.to_string(), "Sync-Player".to_string(), false, chrono::Utc::now());
    if let Ok(Some(admin_fingerprint)) = state.store.admin_fingerprint() {
        room.admin_seat = AdminSeat::Disconnected { fingerprint: admin_fingerprint };
    }
    let handle = RoomActor::spawn(
        room,
        state.config.clone(),
        state.store.clone(),
        state.rate_limiter.clone(),
        state.prober.clone(),
        state.registry.clone(),
    );
    state.registry.insert(LEGACY_ROOM_CODE.to_string(), handle);
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        signal.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!(drain_timeout_secs = SHUTDOWN_DRAIN_TIMEOUT.as_secs(), "shutdown signal received, draining");
    tokio::time::sleep(SHUTDOWN_DRAIN_TIMEOUT).await;
}
