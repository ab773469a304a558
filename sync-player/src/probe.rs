//! Real [`TrackProber`] backed by an external probe binary (spec §6.5).
//!
//! Every invocation passes the filename as a single argument-vector element
//! — never interpolated into a shell string — and the filename is expected
//! to have already passed [`sync_player_core::validation::FilenameValidator`]
//! before reaching here (spec §4.5 step 3, §6.5).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::warn;

use sync_player_core::prober::{ProbedTracks, TrackProber};
use sync_player_core::resilience::timeout::PROBE_TIMEOUT;
use sync_player_proto::TrackInfo;

pub struct FfprobeProber {
    media_dir: PathBuf,
    binary: String,
}

impl FfprobeProber {
    pub fn new(media_dir: PathBuf) -> Self {
        Self {
            media_dir,
            binary: "ffprobe".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    #[serde(default)]
    codec_name: String,
    #[serde(default)]
    index: i32,
    #[serde(default)]
    tags: Option<FfprobeTags>,
    #[serde(default)]
    disposition: Option<FfprobeDisposition>,
    #[serde(default)]
    codec_long_name: String,
}

#[derive(Debug, Deserialize, Default)]
struct FfprobeTags {
    language: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct FfprobeDisposition {
    #[serde(default)]
    default: i32,
}

#[async_trait]
impl TrackProber for FfprobeProber {
    async fn probe(&self, filename: &str) -> ProbedTracks {
        match self.run(filename).await {
            Ok(tracks) => tracks,
            Err(e) => {
                // spec §4.6/§7: probe failure is swallowed, never propagated.
                warn!(filename, error = %e, "probe failed, reporting no tracks");
                ProbedTracks::default()
            }
        }
    }
}

impl FfprobeProber {
    async fn run(&self, filename: &str) -> anyhow::Result<ProbedTracks> {
        let path = resolve_within(&self.media_dir, filename)?;

        let output = tokio::time::timeout(
            PROBE_TIMEOUT,
            Command::new(&self.binary)
                .args([
                    "-v",
                    "quiet",
                    "-print_format",
                    "json",
                    "-show_streams",
                ])
                .arg(&path)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .output(),
        )
        .await??;

        if !output.status.success() {
            anyhow::bail!("ffprobe exited with status {}", output.status);
        }

        let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)?;

        let mut audio = Vec::new();
        let mut subtitles = Vec::new();
        let mut uses_hevc = false;

        for stream in parsed.streams {
            let info = TrackInfo {
                index: stream.index,
                codec: stream.codec_name.clone(),
                language: stream.tags.as_ref().and_then(|t| t.language.clone()),
                title: stream.tags.as_ref().and_then(|t| t.title.clone()),
                default: stream.disposition.as_ref().is_some_and(|d| d.default != 0),
            };
            match stream.codec_type.as_str() {
                "audio" => audio.push(info),
                "subtitle" => subtitles.push(info),
                "video" => {
                    if stream.codec_name.eq_ignore_ascii_case("hevc")
                        || stream.codec_long_name.to_lowercase().contains("h.265")
                    {
                        uses_hevc = true;
                    }
                }
                _ => {}
            }
        }

        Ok(ProbedTracks { audio, subtitles, uses_hevc })
    }
}

/// Joins `filename` under `base`, refusing anything that would escape it.
/// The filename validator already rejects `..`/`/`/`\`, but this is the
/// boundary where a subprocess argument is actually constructed, so it is
/// checked again rather than trusted.
fn resolve_within(base: &Path, filename: &str) -> anyhow::Result<PathBuf> {
    if filename.is_empty() || filename.contains('/') || filename.contains('\\') || filename.contains("..") {
        anyhow::bail!("rejected unsafe filename");
    }
    Ok(base.join(filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_within_rejects_traversal() {
        assert!(resolve_within(Path::new("/media"), "../etc/passwd").is_err());
        assert!(resolve_within(Path::new("/media"), "movie.mkv").is_ok());
    }
}
