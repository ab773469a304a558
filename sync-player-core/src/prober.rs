//! Seam between the room actor and the external probe process (spec §6.5).
//! The core crate only needs "give me the tracks for this filename"; how
//! that's obtained (ffprobe subprocess, a test stub) is the caller's choice.

use async_trait::async_trait;

use sync_player_proto::TrackInfo;

/// Probed stream metadata for one file, split into audio/subtitle tracks.
#[derive(Debug, Clone, Default)]
pub struct ProbedTracks {
    pub audio: Vec<TrackInfo>,
    pub subtitles: Vec<TrackInfo>,
    pub uses_hevc: bool,
}

#[async_trait]
pub trait TrackProber: Send + Sync {
    /// Resolves tracks for `filename`. Implementations must swallow their
    /// own failures (spec §4.6 "External probe failure... never fail the
    /// whole playlist update") and return an empty `ProbedTracks` instead
    /// of erroring.
    async fn probe(&self, filename: &str) -> ProbedTracks;
}

/// A prober that always reports no tracks, for external-entry playlist
/// items and for tests that don't exercise the real subprocess path.
pub struct NullProber;

#[async_trait]
impl TrackProber for NullProber {
    async fn probe(&self, _filename: &str) -> ProbedTracks {
        ProbedTracks::default()
    }
}
