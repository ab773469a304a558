pub mod id;
pub mod member;
pub mod playback;
pub mod playlist;
pub mod room;

pub use id::ConnectionId;
pub use member::{BslReport, Member};
pub use playback::PlaybackState;
pub use playlist::Playlist;
pub use room::{AdminSeat, Room};
