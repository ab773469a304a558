use chrono::{DateTime, Utc};

use sync_player_proto::SyncSnapshot;

/// A room's playback clock (spec §3): `isPlaying`, `currentTime`, and the
/// wall-clock moment `currentTime` was last reconciled. The projection
/// invariant — `currentTime + (now - lastUpdate)` while playing, else
/// `currentTime` verbatim — is enforced by routing every mutation through
/// [`PlaybackState::advance_to`] before changing `is_playing` or `current_time`.
#[derive(Debug, Clone)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub current_time: f64,
    pub last_update: DateTime<Utc>,
    pub audio_track: i32,
    pub subtitle_track: i32,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            is_playing: false,
            current_time: 0.0,
            last_update: Utc::now(),
            audio_track: 0,
            subtitle_track: -1,
        }
    }
}

impl PlaybackState {
    /// Folds elapsed playing time into `current_time` and resets the
    /// reconciliation point to `now`, without changing `is_playing`. Called
    /// before every mutation that needs a fresh baseline (pause, seek, tick).
    pub fn advance_to(&mut self, now: DateTime<Utc>) {
        if self.is_playing {
            let elapsed = (now - self.last_update).num_milliseconds().max(0) as f64 / 1000.0;
            self.current_time += elapsed;
        }
        self.last_update = now;
    }

    pub fn play(&mut self, now: DateTime<Utc>) {
        self.advance_to(now);
        self.is_playing = true;
    }

    pub fn pause(&mut self, now: DateTime<Utc>) {
        self.advance_to(now);
        self.is_playing = false;
    }

    pub fn seek(&mut self, now: DateTime<Utc>, time: f64) {
        self.advance_to(now);
        self.current_time = time.max(0.0);
    }

    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.current_time = 0.0;
        self.last_update = now;
    }

    /// The position a client observing at `now` would compute.
    pub fn projected_time(&self, now: DateTime<Utc>) -> f64 {
        if self.is_playing {
            let elapsed = (now - self.last_update).num_milliseconds().max(0) as f64 / 1000.0;
            self.current_time + elapsed
        } else {
            self.current_time
        }
    }

    pub fn to_snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            is_playing: self.is_playing,
            current_time: self.current_time,
            audio_track: self.audio_track,
            subtitle_track: self.subtitle_track,
            server_time: self.last_update,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn projected_time_advances_while_playing() {
        let mut state = PlaybackState::default();
        let t0 = Utc::now();
        state.play(t0);
        let t1 = t0 + Duration::seconds(3);
        assert!((state.projected_time(t1) - 3.0).abs() < 0.01);
    }

    #[test]
    fn projected_time_frozen_while_paused() {
        let mut state = PlaybackState::default();
        let t0 = Utc::now();
        state.play(t0);
        let t1 = t0 + Duration::seconds(3);
        state.pause(t1);
        let t2 = t1 + Duration::seconds(10);
        assert!((state.projected_time(t2) - 3.0).abs() < 0.01);
        assert_eq!(state.last_update, t1);
    }

    #[test]
    fn seek_rebases_current_time_without_touching_is_playing() {
        let mut state = PlaybackState::default();
        let t0 = Utc::now();
        state.play(t0);
        state.seek(t0, 42.0);
        assert_eq!(state.current_time, 42.0);
        assert!(state.is_playing);
    }
}
