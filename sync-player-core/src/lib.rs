//! Domain logic for Sync-Player: rooms, playback state, the per-room actor,
//! BSL-S² matching, and the ambient stack (config, persistence, rate
//! limiting, validation, logging) that supports them. The binary crate owns
//! the HTTP/websocket surface and wires this crate's pieces together.

pub mod bsl;
pub mod clock;
pub mod config;
pub mod content_filter;
pub mod error;
pub mod logging;
pub mod models;
pub mod prober;
pub mod rate_limit;
pub mod registry;
pub mod resilience;
pub mod room_actor;
pub mod secrets;
pub mod store;
pub mod validation;

pub use error::{Error, Result};
