use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::id::ConnectionId;
use super::member::Member;
use super::playback::PlaybackState;
use super::playlist::Playlist;

pub const DRIFT_MIN: f64 = -60.0;
pub const DRIFT_MAX: f64 = 60.0;

/// The admin seat's lifecycle (spec §4.5.1): `Unclaimed`, `Claimed` by a
/// live connection, or `Disconnected` while the owning fingerprint is
/// retained so a later `join-room` can reclaim it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminSeat {
    Unclaimed,
    Claimed {
        fingerprint: String,
        connection_id: ConnectionId,
    },
    Disconnected {
        fingerprint: String,
    },
}

impl AdminSeat {
    pub fn holder_connection(&self) -> Option<&ConnectionId> {
        match self {
            Self::Claimed { connection_id, .. } => Some(connection_id),
            _ => None,
        }
    }

    pub fn fingerprint(&self) -> Option<&str> {
        match self {
            Self::Claimed { fingerprint, .. } | Self::Disconnected { fingerprint } => Some(fingerprint),
            Self::Unclaimed => None,
        }
    }
}

/// A single synchronized-playback session (spec §3). All mutation happens
/// through the per-room actor that owns this value; nothing here is
/// `Send`-shared directly across rooms.
#[derive(Debug, Clone)]
pub struct Room {
    pub code: String,
    pub name: String,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    pub admin_seat: AdminSeat,
    pub members: HashMap<ConnectionId, Member>,
    pub playlist: Playlist,
    pub playback: PlaybackState,
    /// fingerprint -> (playlist index -> drift seconds), spec §3 "drift map".
    pub drift: HashMap<String, HashMap<i32, f64>>,
}

impl Room {
    pub fn new(code: String, name: String, is_private: bool, now: DateTime<Utc>) -> Self {
        Self {
            code,
            name,
            is_private,
            created_at: now,
            admin_seat: AdminSeat::Unclaimed,
            members: HashMap::new(),
            playlist: Playlist::default(),
            playback: PlaybackState::default(),
            drift: HashMap::new(),
        }
    }

    pub fn viewer_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_admin_connection(&self, connection_id: &ConnectionId) -> bool {
        self.admin_seat.holder_connection() == Some(connection_id)
    }

    /// Claims the admin seat for `fingerprint`/`connection_id`, unconditionally.
    /// Callers (the admin-lock gate) decide whether a claim is allowed.
    pub fn claim_admin(&mut self, fingerprint: String, connection_id: ConnectionId) {
        self.admin_seat = AdminSeat::Claimed {
            fingerprint,
            connection_id,
        };
    }

    /// Moves a claimed seat to `Disconnected`, retaining the fingerprint, if
    /// the departing connection currently holds it.
    pub fn release_admin_if(&mut self, connection_id: &ConnectionId) {
        if let AdminSeat::Claimed { fingerprint, connection_id: holder } = &self.admin_seat {
            if holder == connection_id {
                self.admin_seat = AdminSeat::Disconnected {
                    fingerprint: fingerprint.clone(),
                };
            }
        }
    }

    /// Stores (clamping) a drift value and returns what was actually stored.
    pub fn set_drift(&mut self, fingerprint: &str, playlist_index: i32, seconds: f64) -> f64 {
        let clamped = seconds.clamp(DRIFT_MIN, DRIFT_MAX);
        self.drift
            .entry(fingerprint.to_string())
            .or_default()
            .insert(playlist_index, clamped);
        clamped
    }

    /// Connection ids of every member sharing `fingerprint`.
    pub fn connections_for_fingerprint<'a>(&'a self, fingerprint: &'a str) -> impl Iterator<Item = &'a ConnectionId> {
        self.members
            .values()
            .filter(move |m| m.fingerprint == fingerprint)
            .map(|m| &m.connection_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_seat_round_trips_through_disconnect() {
        let mut room = Room::new("ABCDEF".into(), "Movie Night".into(), false, Utc::now());
        let conn = ConnectionId::new();
        room.claim_admin("fp1".into(), conn.clone());
        assert!(room.is_admin_connection(&conn));

        room.release_admin_if(&conn);
        assert!(!room.is_admin_connection(&conn));
        assert_eq!(room.admin_seat.fingerprint(), Some("fp1"));

        let new_conn = ConnectionId::new();
        room.claim_admin("fp1".into(), new_conn.clone());
        assert!(room.is_admin_connection(&new_conn));
    }

    #[test]
    fn release_admin_if_ignores_non_holder() {
        let mut room = Room::new("ABCDEF".into(), "Movie Night".into(), false, Utc::now());
        let admin_conn = ConnectionId::new();
        let other_conn = ConnectionId::new();
        room.claim_admin("fp1".into(), admin_conn.clone());
        room.release_admin_if(&other_conn);
        assert!(room.is_admin_connection(&admin_conn));
    }

    #[test]
    fn drift_is_clamped_and_shared_by_fingerprint() {
        let mut room = Room::new("ABCDEF".into(), "Movie Night".into(), false, Utc::now());
        assert_eq!(room.set_drift("fpV", 0, 75.0), 60.0);
        assert_eq!(room.drift["fpV"][&0], 60.0);
    }
}
