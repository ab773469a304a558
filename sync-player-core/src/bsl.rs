//! BSL-S² (Both-Side Local Sync Stream) matcher (spec §4.7): decides which
//! locally-reported client file a playlist entry corresponds to, so a
//! client can play its own copy instead of streaming from the server while
//! staying in sync.

use std::collections::HashMap;

use sync_player_proto::ClientFileDescriptor;

use crate::config::BslAggregationMode;

const SIZE_TOLERANCE_BYTES: i64 = (1.5 * 1024.0 * 1024.0) as i64;

#[derive(Debug, Clone, Copy)]
pub struct MatcherConfig {
    pub advanced_match: bool,
    pub threshold: u8,
}

/// One playlist entry as seen by the matcher: its name and, if known, its
/// on-disk size (probed server-side, not client-reported).
#[derive(Debug, Clone)]
pub struct PlaylistFileRef {
    pub filename: String,
    pub size_bytes: Option<u64>,
}

fn extension_of(name: &str) -> Option<String> {
    name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())
}

fn mime_family(mime: &str) -> Option<&str> {
    mime.split_once('/').map(|(family, _)| family)
}

/// Canonical MIME type for a handful of extensions this matcher cares
/// about. Extend as new media types need BSL support.
fn canonical_mime(extension: &str) -> Option<&'static str> {
    match extension {
        "mkv" => Some("video/x-matroska"),
        "mp4" | "m4v" => Some("video/mp4"),
        "webm" => Some("video/webm"),
        "avi" => Some("video/x-msvideo"),
        "mov" => Some("video/quicktime"),
        "mp3" => Some("audio/mpeg"),
        "flac" => Some("audio/flac"),
        "m4a" | "aac" => Some("audio/aac"),
        "ogg" => Some("audio/ogg"),
        _ => None,
    }
}

fn score(client_file: &ClientFileDescriptor, playlist_file: &PlaylistFileRef) -> u8 {
    let mut score = 0u8;

    if client_file.name.eq_ignore_ascii_case(&playlist_file.filename) {
        score += 1;
    }

    let client_ext = extension_of(&client_file.name);
    let playlist_ext = extension_of(&playlist_file.filename);
    if client_ext.is_some() && client_ext == playlist_ext {
        score += 1;
    }

    if let (Some(client_size), Some(server_size)) = (client_file.size, playlist_file.size_bytes) {
        let diff = (client_size as i64 - server_size as i64).abs();
        if diff <= SIZE_TOLERANCE_BYTES {
            score += 1;
        }
    }

    if let (Some(mime), Some(ext)) = (client_file.mime_type.as_deref(), playlist_ext.as_deref()) {
        let canonical = canonical_mime(ext);
        let mime_matches_canonical = canonical.is_some_and(|c| c.eq_ignore_ascii_case(mime));
        let family_matches = match (mime_family(mime), canonical.and_then(mime_family)) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        };
        if mime_matches_canonical || family_matches {
            score += 1;
        }
    }

    score
}

/// Picks, for each reported client file, the best-matching playlist entry
/// (by index), preferring a persisted manual match. Returns `playlist
/// index -> client filename`.
pub fn match_files(
    files: &[ClientFileDescriptor],
    playlist: &[PlaylistFileRef],
    manual_matches: &HashMap<String, String>,
    config: MatcherConfig,
) -> HashMap<usize, String> {
    let mut matched = HashMap::new();

    for file in files {
        if let Some(manual_target) = manual_matches.get(&file.name.to_lowercase()) {
            if let Some(index) = playlist
                .iter()
                .position(|p| p.filename.to_lowercase() == manual_target.to_lowercase())
            {
                matched.insert(index, file.name.clone());
                continue;
            }
        }

        let best = playlist.iter().enumerate().max_by_key(|(_, p)| score(file, p));

        if let Some((index, candidate)) = best {
            let matches = if config.advanced_match {
                score(file, candidate) >= config.threshold
            } else {
                file.name.eq_ignore_ascii_case(&candidate.filename)
            };
            if matches {
                matched.insert(index, file.name.clone());
            }
        }
    }

    matched
}

/// Whether `playlist_index` counts as "BSL-active" given how many members
/// reported a folder and how many of those matched it (spec §4.7).
pub fn is_active(mode: BslAggregationMode, matched_count: usize, reporting_count: usize) -> bool {
    if reporting_count == 0 {
        return false;
    }
    match mode {
        BslAggregationMode::Any => matched_count >= 1,
        BslAggregationMode::All => matched_count == reporting_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_file(name: &str, size: Option<u64>, mime: Option<&str>) -> ClientFileDescriptor {
        ClientFileDescriptor {
            name: name.to_string(),
            size,
            mime_type: mime.map(str::to_string),
        }
    }

    #[test]
    fn advanced_match_scores_all_four_criteria() {
        let playlist = vec![PlaylistFileRef {
            filename: "movie.mkv".to_string(),
            size_bytes: Some(900_000_000),
        }];
        let files = vec![client_file("Movie.MKV", Some(900_001_000), Some("video/x-matroska"))];
        let matched = match_files(
            &files,
            &playlist,
            &HashMap::new(),
            MatcherConfig { advanced_match: true, threshold: 3 },
        );
        assert_eq!(matched.get(&0), Some(&"Movie.MKV".to_string()));
    }

    #[test]
    fn size_mismatch_still_matches_at_lower_threshold() {
        let playlist = vec![PlaylistFileRef {
            filename: "movie.mkv".to_string(),
            size_bytes: Some(900_000_000),
        }];
        // diff is 1.6MiB, over tolerance, so size criterion fails: score 3 (name+ext+mime)
        let files = vec![client_file("Movie.MKV", Some(901_600_000), Some("video/x-matroska"))];
        let matched = match_files(
            &files,
            &playlist,
            &HashMap::new(),
            MatcherConfig { advanced_match: true, threshold: 3 },
        );
        assert_eq!(matched.get(&0), Some(&"Movie.MKV".to_string()));
    }

    #[test]
    fn manual_match_takes_precedence() {
        let playlist = vec![
            PlaylistFileRef { filename: "a.mkv".to_string(), size_bytes: None },
            PlaylistFileRef { filename: "b.mkv".to_string(), size_bytes: None },
        ];
        let files = vec![client_file("custom_name.mkv", None, None)];
        let mut manual = HashMap::new();
        manual.insert("custom_name.mkv".to_string(), "b.mkv".to_string());
        let matched = match_files(
            &files,
            &playlist,
            &manual,
            MatcherConfig { advanced_match: true, threshold: 4 },
        );
        assert_eq!(matched.get(&1), Some(&"custom_name.mkv".to_string()));
    }

    #[test]
    fn aggregation_any_vs_all() {
        assert!(is_active(BslAggregationMode::Any, 1, 3));
        assert!(!is_active(BslAggregationMode::All, 1, 3));
        assert!(is_active(BslAggregationMode::All, 3, 3));
        assert!(!is_active(BslAggregationMode::Any, 0, 0));
    }
}
