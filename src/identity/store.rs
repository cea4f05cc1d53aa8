//! Durable credential storage. Every call is atomic with respect to other callers and
//! visible to the next `load` (read-after-write).

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::warn;

use super::credentials::Credentials;
use crate::error::{AuthError, AuthResult};

pub trait CredentialStore: Send + Sync {
    /// Current credentials, or empty ones. A partial token pair is cleared and reported empty.
    fn load(&self) -> Credentials;
    fn save(&self, creds: &Credentials) -> AuthResult<()>;
    fn clear(&self) -> AuthResult<()>;
}

fn reject_partial(creds: Credentials, origin: &str) -> Option<Credentials> {
    if creds.is_partial() {
        warn!(target: "sessionguard::store", "{}: partial token pair found, clearing credentials", origin);
        None
    } else {
        Some(creds)
    }
}

/// Process-local store; does not survive a restart.
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: RwLock<Credentials>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self { Self::default() }
    pub fn with(creds: Credentials) -> Self { Self { inner: RwLock::new(creds) } }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Credentials {
        let mut guard = self.inner.write();
        match reject_partial(guard.clone(), "memory") {
            Some(c) => c,
            None => {
                *guard = Credentials::empty();
                Credentials::empty()
            }
        }
    }
    fn save(&self, creds: &Credentials) -> AuthResult<()> {
        *self.inner.write() = creds.clone();
        Ok(())
    }
    fn clear(&self) -> AuthResult<()> {
        *self.inner.write() = Credentials::empty();
        Ok(())
    }
}

/// JSON file store. The whole record is one document replaced via tmp+rename, so the
/// token pair, profile, roles and permissions are always written and cleared together.
pub struct FileCredentialStore {
    path: PathBuf,
    cache: RwLock<Credentials>,
}

impl FileCredentialStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let creds = Self::read_file(&path);
        Self { path, cache: RwLock::new(creds) }
    }

    pub fn path(&self) -> &Path { &self.path }

    fn read_file(path: &Path) -> Credentials {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Credentials::empty(),
            Err(e) => {
                warn!(target: "sessionguard::store", "cannot read {}: {}", path.display(), e);
                return Credentials::empty();
            }
        };
        serde_json::from_slice::<Credentials>(&bytes).unwrap_or_else(|e| {
            warn!(target: "sessionguard::store", "ignoring corrupt credentials file {}: {}", path.display(), e);
            Credentials::empty()
        })
    }

    fn write_file(&self, creds: &Credentials) -> AuthResult<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| AuthError::storage(e.to_string()))?;
            }
        }
        let bytes = serde_json::to_vec_pretty(creds).map_err(|e| AuthError::storage(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes).map_err(|e| AuthError::storage(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| AuthError::storage(e.to_string()))?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Credentials {
        let current = self.cache.read().clone();
        match reject_partial(current, "file") {
            Some(c) => c,
            None => {
                if let Err(e) = self.clear() {
                    warn!(target: "sessionguard::store", "failed to clear partial credentials: {}", e);
                }
                Credentials::empty()
            }
        }
    }

    fn save(&self, creds: &Credentials) -> AuthResult<()> {
        // hold the write lock across the file write so readers never see file and cache disagree
        let mut guard = self.cache.write();
        self.write_file(creds)?;
        *guard = creds.clone();
        Ok(())
    }

    fn clear(&self) -> AuthResult<()> {
        let mut guard = self.cache.write();
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(AuthError::storage(e.to_string())),
        }
        *guard = Credentials::empty();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::UserProfile;

    fn sample() -> Credentials {
        let mut c = Credentials::empty().with_tokens("access".into(), "refresh".into());
        c.user = Some(UserProfile { id: "7".into(), user_name: "ada".into(), email: "ada@example.test".into() });
        c.roles.insert("admin".into());
        c.permissions.insert("events.edit".into());
        c
    }

    #[test]
    fn file_store_roundtrip_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("creds.json");
        let store = FileCredentialStore::open(&path);
        assert!(store.load().is_empty());
        store.save(&sample()).unwrap();
        assert_eq!(store.load(), sample());
        drop(store);
        let reopened = FileCredentialStore::open(&path);
        assert_eq!(reopened.load(), sample());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn clear_removes_everything() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("creds.json");
        let store = FileCredentialStore::open(&path);
        store.save(&sample()).unwrap();
        store.clear().unwrap();
        assert!(store.load().is_empty());
        assert!(!path.exists());
        // clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn partial_pair_on_disk_loads_empty_and_is_cleared() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("creds.json");
        std::fs::write(&path, br#"{"accessToken":"only-access","roles":["admin"]}"#).unwrap();
        let store = FileCredentialStore::open(&path);
        assert!(store.load().is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("creds.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(FileCredentialStore::open(&path).load().is_empty());
    }

    #[test]
    fn memory_store_rejects_partial() {
        let mut partial = Credentials::empty();
        partial.refresh_token = Some("r".into());
        let store = MemoryCredentialStore::with(partial);
        assert!(store.load().is_empty());
        store.save(&sample()).unwrap();
        assert_eq!(store.load(), sample());
    }
}
