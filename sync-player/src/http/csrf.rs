//! CSRF token issuance and verification (spec §6.3).
//!
//! A `sync_session` cookie (HttpOnly, SameSite=Strict, 24h) identifies the
//! browser session; the CSRF token bound to it must accompany every
//! mutating request via the `x-csrf-token` header or a `_csrf` body field.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue};
use chrono::{DateTime, Utc};
use dashmap::DashMap;

const SESSION_COOKIE: &str = "sync_session";
const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone, Default)]
pub struct CsrfSessions {
    sessions: Arc<DashMap<String, (String, DateTime<Utc>)>>,
}

impl CsrfSessions {
    /// Issues a fresh session + CSRF token pair, returning
    /// `(session_id, csrf_token)`.
    pub fn issue(&self) -> (String, String) {
        let session_id = nanoid::nanoid!(21);
        let token = nanoid::nanoid!(32);
        let expires_at = Utc::now() + chrono::Duration::from_std(SESSION_TTL).expect("constant fits chrono::Duration");
        self.sessions.insert(session_id.clone(), (token.clone(), expires_at));
        (session_id, token)
    }

    /// Rotates the token for an existing session, or issues a new session
    /// if `session_id` is absent or expired.
    pub fn rotate(&self, session_id: Option<&str>) -> (String, String) {
        if let Some(id) = session_id {
            if self.sessions.get(id).is_some_and(|entry| entry.1 > Utc::now()) {
                let token = nanoid::nanoid!(32);
                let expires_at = Utc::now() + chrono::Duration::from_std(SESSION_TTL).expect("constant fits chrono::Duration");
                self.sessions.insert(id.to_string(), (token.clone(), expires_at));
                return (id.to_string(), token);
            }
        }
        self.issue()
    }

    pub fn verify(&self, session_id: &str, candidate_token: &str) -> bool {
        self.sessions
            .get(session_id)
            .is_some_and(|entry| entry.1 > Utc::now() && entry.0 == candidate_token)
    }
}

pub fn session_cookie(session_id: &str, secure: bool) -> HeaderValue {
    let secure_attr = if secure { "; Secure" } else { "" };
    let value = format!(
        "{SESSION_COOKIE}={session_id}; HttpOnly; SameSite=Strict; Max-Age={}{secure_attr}; Path=/",
        SESSION_TTL.as_secs()
    );
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static(""))
}

pub fn read_session_id(headers: &HeaderMap) -> Option<String> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    cookie_header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == SESSION_COOKIE).then(|| value.to_string())
    })
}

pub fn read_csrf_header(headers: &HeaderMap) -> Option<String> {
    headers.get("x-csrf-token").and_then(|v| v.to_str().ok()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_against_its_session() {
        let sessions = CsrfSessions::default();
        let (session_id, token) = sessions.issue();
        assert!(sessions.verify(&session_id, &token));
        assert!(!sessions.verify(&session_id, "wrong-token"));
    }

    #[test]
    fn rotate_reuses_a_live_session_id() {
        let sessions = CsrfSessions::default();
        let (session_id, _) = sessions.issue();
        let (rotated_id, new_token) = sessions.rotate(Some(&session_id));
        assert_eq!(rotated_id, session_id);
        assert!(sessions.verify(&session_id, &new_token));
    }

    #[test]
    fn rotate_issues_fresh_session_when_absent() {
        let sessions = CsrfSessions::default();
        let (session_id, token) = sessions.rotate(None);
        assert!(sessions.verify(&session_id, &token));
    }
}
