use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Tokens currently persisted; either value may be missing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Session {
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

/// Token pair issued by `/login` and `/refresh-token`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl From<TokenPair> for Session {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: Some(pair.access_token),
            refresh_token: Some(pair.refresh_token),
        }
    }
}

/// Single source of truth for the current session.
///
/// Every call reads the tokens fresh from the store, so a refresh performed by
/// one call is visible to the next one without any in-memory copy.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Result<Session, StoreError>;
    fn save(&self, tokens: &TokenPair) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

/// Session persisted as a small toml file
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.config/casedesk/session.toml`
    pub fn default_location() -> Result<Self, StoreError> {
        let dir = crate::config::Config::config_dir().ok_or(StoreError::NoHomeDir)?;
        Ok(Self::new(dir.join("session.toml")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Session, StoreError> {
        if !self.path.exists() {
            return Ok(Session::default());
        }

        let contents = fs::read_to_string(&self.path)?;
        Ok(toml::from_str(&contents)?)
    }

    fn save(&self, tokens: &TokenPair) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        // Written aside and renamed so readers see the old or the new pair, never half
        let contents = toml::to_string_pretty(tokens)?;
        let staging = self.path.with_extension("toml.tmp");
        write_private(&staging, contents.as_bytes())?;
        fs::rename(&staging, &self.path)?;

        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Create `path` afresh, readable by the owner only from the first byte on
fn write_private(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
        _ => {}
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    Ok(())
}

/// In-process store, used by tests and embedders that manage persistence themselves
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: Mutex<Session>,
}

impl MemorySessionStore {
    pub fn new(session: Session) -> Self {
        Self {
            session: Mutex::new(session),
        }
    }

    pub fn with_tokens(access_token: &str, refresh_token: &str) -> Self {
        Self::new(Session {
            access_token: Some(access_token.to_string()),
            refresh_token: Some(refresh_token.to_string()),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Session> {
        // A panic while holding the lock cannot leave a Session half-written
        self.session
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Session, StoreError> {
        Ok(self.lock().clone())
    }

    fn save(&self, tokens: &TokenPair) -> Result<(), StoreError> {
        *self.lock() = tokens.clone().into();
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.lock() = Session::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(access: &str, refresh: &str) -> TokenPair {
        TokenPair {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
        }
    }

    #[test]
    fn test_file_store_missing_file_is_empty_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("session.toml"));

        let session = store.load().unwrap();
        assert!(session.is_empty());
    }

    #[test]
    fn test_file_store_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("nested").join("session.toml"));

        store.save(&pair("A1", "R1")).unwrap();
        let session = store.load().unwrap();

        assert_eq!(session.access_token.as_deref(), Some("A1"));
        assert_eq!(session.refresh_token.as_deref(), Some("R1"));
    }

    #[test]
    fn test_file_store_uses_fixed_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("session.toml"));

        store.save(&pair("A1", "R1")).unwrap();
        let raw = fs::read_to_string(store.path()).unwrap();

        assert!(raw.contains("access_token = \"A1\""));
        assert!(raw.contains("refresh_token = \"R1\""));
    }

    #[test]
    fn test_file_store_overwrite_on_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("session.toml"));

        store.save(&pair("A1", "R1")).unwrap();
        store.save(&pair("A2", "R2")).unwrap();

        assert_eq!(store.load().unwrap(), pair("A2", "R2").into());
    }

    #[test]
    fn test_file_store_partial_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        fs::write(&path, "access_token = \"only-access\"\n").unwrap();

        let session = FileSessionStore::new(&path).load().unwrap();
        assert_eq!(session.access_token.as_deref(), Some("only-access"));
        assert_eq!(session.refresh_token, None);
    }

    #[test]
    fn test_file_store_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("session.toml"));

        store.save(&pair("A1", "R1")).unwrap();
        store.clear().unwrap();
        assert!(!store.path().exists());

        // Clearing again is not an error
        store.clear().unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_file_store_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        fs::write(&path, "this is = = not toml").unwrap();

        let result = FileSessionStore::new(&path).load();
        assert!(matches!(result, Err(StoreError::Parse(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("session.toml"));
        store.save(&pair("A1", "R1")).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_private_file_is_created_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml.tmp");
        // A leftover file from an interrupted save must not keep its wider mode
        fs::write(&path, "stale").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        write_private(&path, b"access_token = \"A1\"\n").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(fs::read_to_string(&path).unwrap(), "access_token = \"A1\"\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_replaces_readable_session_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("session.toml"));
        fs::write(store.path(), "access_token = \"old\"\n").unwrap();
        fs::set_permissions(store.path(), fs::Permissions::from_mode(0o644)).unwrap();

        store.save(&pair("A1", "R1")).unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(store.load().unwrap(), pair("A1", "R1").into());
        assert!(!dir.path().join("session.toml.tmp").exists());
    }

    #[test]
    fn test_memory_store_round_trip_and_clear() {
        let store = MemorySessionStore::default();
        assert!(store.load().unwrap().is_empty());

        store.save(&pair("A1", "R1")).unwrap();
        assert_eq!(store.load().unwrap().access_token.as_deref(), Some("A1"));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_empty());
    }
}
