use sync_player_proto::{PlaylistEntry, PlaylistSnapshot};

/// A room's ordered queue of playlist entries (spec §3). Entries themselves
/// are the wire-level [`PlaylistEntry`] type — the server holds no fields
/// beyond what it broadcasts, so there is nothing to translate at the edge.
#[derive(Debug, Clone, Default)]
pub struct Playlist {
    pub videos: Vec<PlaylistEntry>,
    pub current_index: i32,
    pub main_video_index: i32,
    pub main_video_start_time: f64,
    pub preload_main_video: bool,
}

impl Playlist {
    pub fn replace(&mut self, videos: Vec<PlaylistEntry>, main_video_index: i32, main_video_start_time: f64) {
        self.videos = videos;
        self.current_index = if self.videos.is_empty() { -1 } else { 0 };
        self.main_video_index = if (0..self.videos.len() as i32).contains(&main_video_index) {
            main_video_index
        } else {
            -1
        };
        self.main_video_start_time = main_video_start_time.max(0.0);
    }

    pub fn is_valid_index(&self, index: i32) -> bool {
        index >= 0 && (index as usize) < self.videos.len()
    }

    pub fn current_entry(&self) -> Option<&PlaylistEntry> {
        self.is_valid_index(self.current_index)
            .then(|| &self.videos[self.current_index as usize])
    }

    /// Swaps two entries and keeps `main_video_index`/`current_index`
    /// pointed at whichever entries they originally referenced.
    pub fn reorder(&mut self, from: usize, to: usize) -> bool {
        if from >= self.videos.len() || to >= self.videos.len() {
            return false;
        }
        self.videos.swap(from, to);
        remap_index(&mut self.current_index, from, to);
        remap_index(&mut self.main_video_index, from, to);
        true
    }

    pub fn to_snapshot(&self) -> PlaylistSnapshot {
        PlaylistSnapshot {
            videos: self.videos.clone(),
            current_index: self.current_index,
            main_video_index: self.main_video_index,
            main_video_start_time: self.main_video_start_time,
            preload_main_video: self.preload_main_video,
        }
    }
}

fn remap_index(index: &mut i32, from: usize, to: usize) {
    if *index == from as i32 {
        *index = to as i32;
    } else if *index == to as i32 {
        *index = from as i32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(filename: &str) -> PlaylistEntry {
        PlaylistEntry {
            filename: filename.to_string(),
            is_external: false,
            audio_tracks: vec![],
            subtitle_tracks: vec![],
            selected_audio_track: 0,
            selected_subtitle_track: -1,
            uses_hevc: false,
        }
    }

    #[test]
    fn replace_resets_current_index() {
        let mut playlist = Playlist::default();
        playlist.replace(vec![entry("a.mkv"), entry("b.mkv")], 0, 0.0);
        assert_eq!(playlist.current_index, 0);
        assert_eq!(playlist.main_video_index, 0);
    }

    #[test]
    fn replace_with_empty_playlist_clears_current_index() {
        let mut playlist = Playlist::default();
        playlist.replace(vec![], -1, 0.0);
        assert_eq!(playlist.current_index, -1);
    }

    #[test]
    fn reorder_swaps_and_remaps_current_index() {
        let mut playlist = Playlist::default();
        playlist.replace(vec![entry("a.mkv"), entry("b.mkv"), entry("c.mkv")], 0, 0.0);
        playlist.current_index = 0;
        assert!(playlist.reorder(0, 2));
        assert_eq!(playlist.videos[2].filename, "a.mkv");
        assert_eq!(playlist.current_index, 2);
    }

    #[test]
    fn reorder_rejects_out_of_range() {
        let mut playlist = Playlist::default();
        playlist.replace(vec![entry("a.mkv")], 0, 0.0);
        assert!(!playlist.reorder(0, 5));
    }
}
