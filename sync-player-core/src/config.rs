//! Configuration loading and validation.
//!
//! Values are read first from `SYNC_`-prefixed environment variables, then
//! from a `key: value` text file (`#` comments, lines without a colon
//! ignored). Each option is validated independently: an out-of-range or
//! malformed value is logged as a warning and the option's default is used
//! instead, rather than failing the whole load.

use std::path::{Path, PathBuf};

use config::{Config as ConfigBuilder, Environment};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Late-joiner reconciliation strategy (spec §4.1 `join_mode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinMode {
    Sync,
    Reset,
}

/// Aggregation rule for "is this video BSL-active" (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BslAggregationMode {
    Any,
    All,
}

/// Fully validated, process-lifetime-immutable configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub port: u16,
    pub volume_step: u8,
    pub skip_seconds: u32,
    pub join_mode: JoinMode,
    pub use_https: bool,
    pub bsl_s2_mode: BslAggregationMode,
    pub bsl_advanced_match: bool,
    pub bsl_advanced_match_threshold: u8,
    pub video_autoplay: bool,
    pub admin_fingerprint_lock: bool,
    pub server_mode: bool,
    pub client_controls_disabled: bool,
    pub client_sync_disabled: bool,
    pub chat_enabled: bool,
    pub max_volume: u32,
    pub skip_intro_seconds: u32,
    pub data_hydration: bool,

    /// Directory scanned by `GET /api/files` and passed to the probe
    /// interface. Not one of spec §4.1's validated options, but required
    /// ambient plumbing for the HTTP surface in spec §6.3.
    pub media_dir: PathBuf,
    /// Where the persistent store JSON file (spec §6.2) lives.
    pub store_path: PathBuf,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            volume_step: 5,
            skip_seconds: 5,
            join_mode: JoinMode::Sync,
            use_https: false,
            bsl_s2_mode: BslAggregationMode::Any,
            bsl_advanced_match: true,
            bsl_advanced_match_threshold: 1,
            video_autoplay: false,
            admin_fingerprint_lock: false,
            server_mode: false,
            client_controls_disabled: false,
            client_sync_disabled: false,
            chat_enabled: true,
            max_volume: 100,
            skip_intro_seconds: 87,
            data_hydration: true,
            media_dir: PathBuf::from("./media"),
            store_path: PathBuf::from("./data/sync-player.json"),
            tls_cert_path: None,
            tls_key_path: None,
            logging: LoggingConfig::default(),
        }
    }
}

/// Parse the `key: value` text format used by the on-disk config file
/// (spec §6.1). Blank lines, `#` comments, and lines without a colon are
/// skipped; keys are lowercased.
fn parse_colon_file(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let (key, value) = line.split_once(':')?;
            Some((key.trim().to_lowercase(), value.trim().to_string()))
        })
        .collect()
}

/// Load and validate configuration from `SYNC_*` environment variables
/// layered over an optional key:value file (env wins on conflict).
pub fn load_config(file_path: Option<&Path>) -> Config {
    let mut builder = ConfigBuilder::builder();

    if let Some(path) = file_path {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                for (key, value) in parse_colon_file(&contents) {
                    builder = match builder.clone().set_override(key.as_str(), value) {
                        Ok(b) => b,
                        Err(e) => {
                            warn!(key, error = %e, "failed to apply config file entry");
                            builder
                        }
                    };
                }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read config file, skipping");
            }
        }
    }

    builder = builder.add_source(Environment::with_prefix("SYNC").try_parsing(true));

    let raw = builder.build().unwrap_or_else(|e| {
        warn!(error = %e, "failed to build configuration layers, using defaults only");
        ConfigBuilder::builder()
            .build()
            .expect("empty config builder always succeeds")
    });

    validate(raw)
}

fn get_str(raw: &ConfigBuilder, key: &str) -> Option<String> {
    raw.get_string(key).ok()
}

fn clamp_u16(raw: &ConfigBuilder, key: &str, min: u16, max: u16, default: u16) -> u16 {
    match get_str(raw, key).and_then(|s| s.parse::<u16>().ok()) {
        Some(v) if (min..=max).contains(&v) => v,
        Some(v) => {
            warn!(key, value = v, min, max, "config value out of range, using default");
            default
        }
        None => default,
    }
}

fn clamp_u32(raw: &ConfigBuilder, key: &str, min: u32, max: u32, default: u32) -> u32 {
    match get_str(raw, key).and_then(|s| s.parse::<u32>().ok()) {
        Some(v) if (min..=max).contains(&v) => v,
        Some(v) => {
            warn!(key, value = v, min, max, "config value out of range, using default");
            default
        }
        None => default,
    }
}

fn clamp_u8(raw: &ConfigBuilder, key: &str, min: u8, max: u8, default: u8) -> u8 {
    match get_str(raw, key).and_then(|s| s.parse::<u8>().ok()) {
        Some(v) if (min..=max).contains(&v) => v,
        Some(v) => {
            warn!(key, value = v, min, max, "config value out of range, using default");
            default
        }
        None => default,
    }
}

fn get_bool(raw: &ConfigBuilder, key: &str, default: bool) -> bool {
    match get_str(raw, key).map(|s| s.to_lowercase()) {
        Some(s) if s == "true" || s == "1" => true,
        Some(s) if s == "false" || s == "0" => false,
        Some(s) => {
            warn!(key, value = s, "expected boolean, using default");
            default
        }
        None => default,
    }
}

fn get_enum<T, F: Fn(&str) -> Option<T>>(raw: &ConfigBuilder, key: &str, parse: F, default: T) -> T {
    match get_str(raw, key) {
        Some(s) => parse(&s.to_lowercase()).unwrap_or_else(|| {
            warn!(key, value = s, "invalid enum value, using default");
            default
        }),
        None => default,
    }
}

fn validate(raw: ConfigBuilder) -> Config {
    let defaults = Config::default();

    let port = clamp_u16(&raw, "port", 1024, 49151, defaults.port);
    let volume_step = clamp_u8(&raw, "volume_step", 1, 20, defaults.volume_step);
    let skip_seconds = clamp_u32(&raw, "skip_seconds", 5, 60, defaults.skip_seconds);
    let join_mode = get_enum(
        &raw,
        "join_mode",
        |s| match s {
            "sync" => Some(JoinMode::Sync),
            "reset" => Some(JoinMode::Reset),
            _ => None,
        },
        defaults.join_mode,
    );
    let use_https = get_bool(&raw, "use_https", defaults.use_https);
    let bsl_s2_mode = get_enum(
        &raw,
        "bsl_s2_mode",
        |s| match s {
            "any" => Some(BslAggregationMode::Any),
            "all" => Some(BslAggregationMode::All),
            _ => None,
        },
        defaults.bsl_s2_mode,
    );
    let bsl_advanced_match = get_bool(&raw, "bsl_advanced_match", defaults.bsl_advanced_match);
    let bsl_advanced_match_threshold =
        clamp_u8(&raw, "bsl_advanced_match_threshold", 1, 4, defaults.bsl_advanced_match_threshold);
    let video_autoplay = get_bool(&raw, "video_autoplay", defaults.video_autoplay);
    let admin_fingerprint_lock = get_bool(&raw, "admin_fingerprint_lock", defaults.admin_fingerprint_lock);
    let server_mode = get_bool(&raw, "server_mode", defaults.server_mode);
    let client_controls_disabled = get_bool(&raw, "client_controls_disabled", defaults.client_controls_disabled);
    let client_sync_disabled = get_bool(&raw, "client_sync_disabled", defaults.client_sync_disabled);
    let chat_enabled = get_bool(&raw, "chat_enabled", defaults.chat_enabled);
    let max_volume = clamp_u32(&raw, "max_volume", 100, 1000, defaults.max_volume);
    let skip_intro_seconds = match get_str(&raw, "skip_intro_seconds").and_then(|s| s.parse::<u32>().ok()) {
        Some(v) if v > 0 => v,
        Some(v) => {
            warn!(value = v, "skip_intro_seconds must be positive, using default");
            defaults.skip_intro_seconds
        }
        None => defaults.skip_intro_seconds,
    };
    let data_hydration = get_bool(&raw, "data_hydration", defaults.data_hydration);

    let media_dir = get_str(&raw, "media_dir").map_or(defaults.media_dir.clone(), PathBuf::from);
    let store_path = get_str(&raw, "store_path").map_or(defaults.store_path.clone(), PathBuf::from);
    let tls_cert_path = get_str(&raw, "tls_cert_path").map(PathBuf::from);
    let tls_key_path = get_str(&raw, "tls_key_path").map(PathBuf::from);

    let logging = LoggingConfig {
        level: get_str(&raw, "log_level").unwrap_or(defaults.logging.level),
        format: get_str(&raw, "log_format").unwrap_or(defaults.logging.format),
        file_path: get_str(&raw, "log_file").map(PathBuf::from),
    };

    Config {
        port,
        volume_step,
        skip_seconds,
        join_mode,
        use_https,
        bsl_s2_mode,
        bsl_advanced_match,
        bsl_advanced_match_threshold,
        video_autoplay,
        admin_fingerprint_lock,
        server_mode,
        client_controls_disabled,
        client_sync_disabled,
        chat_enabled,
        max_volume,
        skip_intro_seconds,
        data_hydration,
        media_dir,
        store_path,
        tls_cert_path,
        tls_key_path,
        logging,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_within_range() {
        let cfg = Config::default();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.bsl_advanced_match_threshold, 1);
    }

    #[test]
    fn out_of_range_port_falls_back_to_default() {
        std::env::set_var("SYNC_PORT", "80");
        let cfg = load_config(None);
        assert_eq!(cfg.port, 3000);
        std::env::remove_var("SYNC_PORT");
    }

    #[test]
    fn valid_env_override_is_applied() {
        std::env::set_var("SYNC_PORT", "4000");
        std::env::set_var("SYNC_JOIN_MODE", "reset");
        let cfg = load_config(None);
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.join_mode, JoinMode::Reset);
        std::env::remove_var("SYNC_PORT");
        std::env::remove_var("SYNC_JOIN_MODE");
    }

    #[test]
    fn colon_file_is_parsed() {
        let dir = std::env::temp_dir().join(format!("sync-player-test-{}", nanoid::nanoid!(6)));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("config.txt");
        std::fs::write(&file, "# comment\nport: 4100\nchat_enabled: false\n").unwrap();
        let cfg = load_config(Some(&file));
        assert_eq!(cfg.port, 4100);
        assert!(!cfg.chat_enabled);
        std::fs::remove_dir_all(&dir).ok();
    }
}
