use nanoid::nanoid;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Characters a room code is drawn from. `I`, `O`, `0`, `1` are excluded to
/// reduce transcription error when a code is read aloud or typed by hand.
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const ROOM_CODE_LENGTH: usize = 6;

/// Generates one candidate room code. Callers retry on collision via
/// rejection sampling (spec §4.3) rather than this function tracking state.
pub fn generate_room_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ROOM_CODE_LENGTH)
        .map(|_| *ROOM_CODE_ALPHABET.choose(&mut rng).expect("alphabet is non-empty") as char)
        .collect()
}

/// A connection's transient id, unique per bidirectional channel, distinct
/// from its fingerprint (which survives reconnects).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(nanoid!(16))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_codes_are_the_right_length_and_alphabet() {
        for _ in 0..50 {
            let code = generate_room_code();
            assert_eq!(code.len(), ROOM_CODE_LENGTH);
            assert!(code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b)));
        }
    }
}
