//! Persistent state: the admin fingerprint, client display names, and
//! BSL-S² manual matches (spec §4.2, §6.2). One JSON file; writes replace
//! the whole file and are serialized, reads are served from an in-memory
//! copy kept coherent with it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, warn};

use crate::error::{Error, Result};
use crate::secrets::FingerprintCipher;

/// On-disk schema (spec §6.2). `#[serde(default)]` on every field tolerates
/// a file written by an earlier, smaller schema version — any field absent
/// in an older file just comes back empty rather than failing the load.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct StoreFile {
    #[serde(default)]
    encrypted: Option<String>,
    #[serde(default)]
    client_names: HashMap<String, String>,
    #[serde(default)]
    bsl_matches: HashMap<String, HashMap<String, String>>,
    /// room code -> {fingerprint, savedAt}, multi-room mode only.
    #[serde(default)]
    room_admins: HashMap<String, RoomAdminEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RoomAdminEntry {
    fingerprint: String,
    #[serde(rename = "savedAt")]
    saved_at: chrono::DateTime<chrono::Utc>,
}

/// In-memory, disk-backed store. Cloning shares the same underlying state.
#[derive(Clone)]
pub struct Store {
    path: PathBuf,
    cipher: FingerprintCipher,
    state: Arc<RwLock<StoreFile>>,
    write_lock: Arc<AsyncMutex<()>>,
}

impl Store {
    /// Loads `path` if it exists, migrating forward and saving back any
    /// legacy-shaped content; otherwise starts from an empty store.
    pub async fn load(path: PathBuf, cipher: FingerprintCipher) -> Self {
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => match serde_json::from_str::<StoreFile>(&contents) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "store file unreadable, starting fresh");
                    StoreFile::default()
                }
            },
            Err(_) => StoreFile::default(),
        };

        let store = Self {
            path,
            cipher,
            state: Arc::new(RwLock::new(state)),
            write_lock: Arc::new(AsyncMutex::new(())),
        };
        // Re-save immediately so a legacy/partial schema is normalized on disk.
        if let Err(e) = store.flush().await {
            warn!(error = %e, "failed to normalize store file on load");
        }
        store
    }

    /// The decrypted admin fingerprint, if one has been persisted.
    pub fn admin_fingerprint(&self) -> Result<Option<String>> {
        let encrypted = self.state.read().encrypted.clone();
        match encrypted {
            Some(value) => self.cipher.decrypt(&value).map(Some),
            None => Ok(None),
        }
    }

    pub async fn set_admin_fingerprint(&self, fingerprint: &str) -> Result<()> {
        let encrypted = self.cipher.encrypt(fingerprint)?;
        self.state.write().encrypted = Some(encrypted);
        self.flush().await
    }

    pub fn client_name(&self, fingerprint: &str) -> Option<String> {
        self.state.read().client_names.get(fingerprint).cloned()
    }

    pub async fn set_client_name(&self, fingerprint: &str, name: &str) -> Result<()> {
        self.state.write().client_names.insert(fingerprint.to_string(), name.to_string());
        self.flush().await
    }

    pub fn bsl_matches(&self, fingerprint: &str) -> HashMap<String, String> {
        self.state.read().bsl_matches.get(fingerprint).cloned().unwrap_or_default()
    }

    pub async fn set_bsl_match(&self, fingerprint: &str, local_filename: &str, playlist_filename: &str) -> Result<()> {
        self.state
            .write()
            .bsl_matches
            .entry(fingerprint.to_string())
            .or_default()
            .insert(local_filename.to_string(), playlist_filename.to_string());
        self.flush().await
    }

    pub fn room_admin_fingerprint(&self, room_code: &str) -> Option<String> {
        self.state.read().room_admins.get(room_code).map(|e| e.fingerprint.clone())
    }

    pub async fn set_room_admin_fingerprint(&self, room_code: &str, fingerprint: &str) -> Result<()> {
        self.state.write().room_admins.insert(
            room_code.to_string(),
            RoomAdminEntry {
                fingerprint: fingerprint.to_string(),
                saved_at: chrono::Utc::now(),
            },
        );
        self.flush().await
    }

    pub async fn remove_room(&self, room_code: &str) -> Result<()> {
        self.state.write().room_admins.remove(room_code);
        self.flush().await
    }

    /// Serializes the in-memory snapshot and replaces the file contents
    /// atomically (write to a sibling temp file, then rename). A failure
    /// here is logged and otherwise ignored: the in-memory copy stays
    /// authoritative and the next successful write heals the file (spec §4.6).
    async fn flush(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.state.read().clone();
        let json = serde_json::to_vec_pretty(&snapshot)?;

        let tmp_path = self.path.with_extension("json.tmp");
        if let Some(parent) = self.path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                error!(error = %e, "failed to create store directory");
                return Err(Error::Persistence(e.to_string()));
            }
        }
        if let Err(e) = tokio::fs::write(&tmp_path, &json).await {
            error!(error = %e, "failed to write store temp file");
            return Err(Error::Persistence(e.to_string()));
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
            error!(error = %e, "failed to install store file");
            return Err(Error::Persistence(e.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> FingerprintCipher {
        FingerprintCipher::new(&(0u8..32).collect::<Vec<u8>>()).unwrap()
    }

    #[tokio::test]
    async fn round_trips_admin_fingerprint() {
        let dir = std::env::temp_dir().join(format!("sync-player-store-{}", nanoid::nanoid!(6)));
        let path = dir.join("store.json");
        let store = Store::load(path.clone(), test_cipher()).await;

        assert_eq!(store.admin_fingerprint().unwrap(), None);
        store.set_admin_fingerprint("fp-admin").await.unwrap();
        assert_eq!(store.admin_fingerprint().unwrap(), Some("fp-admin".to_string()));

        let reloaded = Store::load(path, test_cipher()).await;
        assert_eq!(reloaded.admin_fingerprint().unwrap(), Some("fp-admin".to_string()));
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn persists_bsl_matches_keyed_by_fingerprint() {
        let dir = std::env::temp_dir().join(format!("sync-player-store-{}", nanoid::nanoid!(6)));
        let path = dir.join("store.json");
        let store = Store::load(path, test_cipher()).await;

        store.set_bsl_match("fp1", "movie.mkv", "Movie.MKV").await.unwrap();
        let matches = store.bsl_matches("fp1");
        assert_eq!(matches.get("movie.mkv"), Some(&"Movie.MKV".to_string()));
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = std::env::temp_dir().join(format!("sync-player-store-missing-{}", nanoid::nanoid!(6)));
        let store = Store::load(dir.join("nope.json"), test_cipher()).await;
        assert_eq!(store.client_name("anyone"), None);
    }
}
