//! Timing constants that are part of the contract (spec §5 "Cancellation &
//! timeouts", §9 "Concurrency"), not tuning knobs.

pub mod timeout {
    use std::time::Duration;

    /// Virtual clock tick period (spec §4.4).
    pub const TICK_PERIOD: Duration = Duration::from_secs(5);

    /// Delay before the second, autoplay-defeating `sync` broadcast after
    /// `set-playlist` with autoplay off (spec §4.5).
    pub const AUTOPLAY_DEFEAT_DELAY: Duration = Duration::from_millis(500);

    /// Grace period before a fingerprint-lock-mismatch connection is force-closed
    /// (spec §4.5 `bsl-admin-register`, §5 cancellation).
    pub const FINGERPRINT_REJECTION_GRACE: Duration = Duration::from_secs(1);

    /// How long graceful shutdown waits for in-flight handlers before
    /// force-exiting (spec §5).
    pub const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

    /// Minimum timeout for a probe/thumbnail child process (spec §5, §6.5).
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
}
