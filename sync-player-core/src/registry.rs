//! Room registry (spec §4.3): creates, looks up, lists, and destroys rooms.
//! Each room is owned by its own actor task; the registry only holds a
//! cheap handle (a command-queue sender) per room, never the room's state
//! directly, so cross-room queries never contend with a room's own event
//! loop (spec §9 "global mutable state -> per-room actor").

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::error::{Error, Result};
use crate::models::id::{generate_room_code, ROOM_CODE_LENGTH};
use crate::room_actor::RoomHandle;

/// The single implicit room used when `server_mode` is off (spec §4.3).
pub const LEGACY_ROOM_CODE: &str = "LEGACY";

const MAX_CODE_GENERATION_ATTEMPTS: u32 = 64;

#[derive(Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<String, RoomHandle>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a unique room code via rejection sampling against the
    /// currently-registered codes.
    pub fn generate_unique_code(&self) -> Result<String> {
        for _ in 0..MAX_CODE_GENERATION_ATTEMPTS {
            let candidate = generate_room_code();
            if !self.rooms.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(Error::Internal(format!(
            "failed to generate a unique {ROOM_CODE_LENGTH}-character room code after {MAX_CODE_GENERATION_ATTEMPTS} attempts"
        )))
    }

    pub fn insert(&self, code: String, handle: RoomHandle) {
        info!(room = %code, "room registered");
        self.rooms.insert(code.to_uppercase(), handle);
    }

    /// Case-insensitive lookup (spec §4.3).
    pub fn get(&self, code: &str) -> Option<RoomHandle> {
        self.rooms.get(&code.to_uppercase()).map(|entry| entry.clone())
    }

    pub async fn remove(&self, code: &str) {
        if let Some((_, handle)) = self.rooms.remove(&code.to_uppercase()) {
            handle.shutdown().await;
            info!(room = %code, "room removed");
        }
    }

    pub fn all(&self) -> Vec<RoomHandle> {
        self.rooms.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_unique_against_registered_ones() {
        let registry = RoomRegistry::new();
        for _ in 0..20 {
            let code = registry.generate_unique_code().unwrap();
            assert_eq!(code.len(), ROOM_CODE_LENGTH);
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = RoomRegistry::new();
        assert!(registry.get("abcdef").is_none());
    }
}
