//! Server-rendered page stubs (spec §6.3, §1 "the UI itself is out of
//! scope"). Each route returns the minimal HTML shell plus the
//! server-derived state a client-side app needs to boot, rather than a
//! full templated page.

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;

use crate::http::csrf::{read_session_id, session_cookie};
use crate::server::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(landing))
        .route("/admin", get(admin_root))
        .route("/admin/{code}", get(admin_room))
        .route("/watch/{code}", get(watch_room))
}

fn shell(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html><head><title>{title}</title></head><body>{body}</body></html>"
    ))
}

async fn landing(State(state): State<AppState>) -> impl IntoResponse {
    if state.config.server_mode {
        shell("Sync-Player", "<div id=\"app\" data-mode=\"multi-room\"></div>")
    } else {
        shell("Sync-Player", "<div id=\"app\" data-mode=\"single-room\"></div>")
    }
}

async fn admin_root(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    render_admin(&state, headers, None).await
}

async fn admin_room(State(state): State<AppState>, headers: HeaderMap, Path(code): Path<String>) -> impl IntoResponse {
    render_admin(&state, headers, Some(code)).await
}

async fn render_admin(state: &AppState, headers: HeaderMap, code: Option<String>) -> axum::response::Response {
    let existing_session = read_session_id(&headers);
    let (session_id, csrf_token) = state.csrf_sessions.rotate(existing_session.as_deref());

    let room_json = match &code {
        Some(code) => state
            .registry
            .get(code)
            .map(|_| format!("\"{code}\""))
            .unwrap_or_else(|| "null".to_string()),
        None => "null".to_string(),
    };

    let body = format!(
        "<div id=\"app\" data-csrf=\"{csrf_token}\" data-room=\"{room_json}\"></div>"
    );
    let mut response = shell("Sync-Player Admin", &body).into_response();
    response.headers_mut().insert(header::SET_COOKIE, session_cookie(&session_id, state.config.use_https));
    response
}

async fn watch_room(State(state): State<AppState>, Path(code): Path<String>) -> impl IntoResponse {
    let exists = state.registry.get(&code).is_some();
    let body = format!("<div id=\"app\" data-room=\"{code}\" data-exists=\"{exists}\"></div>");
    shell("Sync-Player", &body)
}
