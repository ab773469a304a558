use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::id::ConnectionId;

/// What a member most recently reported for BSL-S² matching (spec §4.7).
#[derive(Debug, Clone)]
pub struct BslReport {
    pub client_id: Option<String>,
    pub client_name: Option<String>,
    /// playlist index -> local filename it was matched against.
    pub matches: HashMap<i32, String>,
}

/// One connected client (spec §3 "Member"). `fingerprint` is the
/// reconnect-stable identity; `connection_id` is transient and only unique
/// for the lifetime of the bidirectional channel. Drift is tracked per
/// fingerprint at the room level (see [`crate::room::Room::drift`]) since
/// several connections can share a fingerprint and must see the same values.
#[derive(Debug, Clone)]
pub struct Member {
    pub connection_id: ConnectionId,
    pub fingerprint: String,
    pub display_name: String,
    pub connected_at: DateTime<Utc>,
    pub bsl_report: Option<BslReport>,
}

impl Member {
    pub fn new(connection_id: ConnectionId, fingerprint: String, display_name: String, now: DateTime<Utc>) -> Self {
        Self {
            connection_id,
            fingerprint,
            display_name,
            connected_at: now,
            bsl_report: None,
        }
    }
}
