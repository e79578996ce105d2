use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::error::StorageError;
use super::token::TokenPair;

/// Lifetime of the persisted access token.
pub const ACCESS_TOKEN_TTL_DAYS: i64 = 7;
/// Lifetime of the persisted refresh token.
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 30;

const SESSION_FILE: &str = "session.toml";

/// Durable holder of the current token pair.
///
/// Implementations must never expose a half-written pair to a concurrent
/// reader.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Result<Option<TokenPair>, StorageError>;
    fn set(&self, pair: &TokenPair) -> Result<(), StorageError>;
    fn clear(&self) -> Result<(), StorageError>;
}

/// Process-local token store.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    pair: RwLock<Option<TokenPair>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(pair: TokenPair) -> Self {
        Self {
            pair: RwLock::new(Some(pair)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Result<Option<TokenPair>, StorageError> {
        Ok(self
            .pair
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn set(&self, pair: &TokenPair) -> Result<(), StorageError> {
        *self.pair.write().unwrap_or_else(PoisonError::into_inner) = Some(pair.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        *self.pair.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Configuration for file-backed token storage.
#[derive(Debug, Clone)]
pub struct TokenStoreConfig {
    pub base_dir: PathBuf,
}

impl TokenStoreConfig {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn default_dir() -> PathBuf {
        default_storedesk_dir()
    }
}

/// File-backed token store.
///
/// Persists two named values, `authToken` and `refreshToken`, each with its
/// own expiry, mirroring the console's cookie pair. Values past their expiry
/// are ignored on read.
///
/// # Example
/// ```no_run
/// use storedesk::auth::{FileTokenStore, TokenPair, TokenStore};
///
/// let store = FileTokenStore::new_default();
/// store.set(&TokenPair::new("access", Some("refresh".to_string())))?;
/// # Ok::<(), storedesk::auth::StorageError>(())
/// ```
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    // Serializes writers within this process; rename keeps readers consistent across processes.
    guard: RwLock<()>,
}

impl FileTokenStore {
    pub fn new(config: TokenStoreConfig) -> Self {
        Self {
            path: config.base_dir.join(SESSION_FILE),
            guard: RwLock::new(()),
        }
    }

    pub fn new_default() -> Self {
        Self::new(TokenStoreConfig::new(default_storedesk_dir()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<Option<SessionFile>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StorageError::Io(err.to_string())),
        };
        Ok(Some(toml::from_str(&raw)?))
    }

    fn write_file(&self, file: &SessionFile) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = toml::to_string(file)?;
        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, serialized)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Result<Option<TokenPair>, StorageError> {
        let _read = self.guard.read().unwrap_or_else(PoisonError::into_inner);
        let Some(file) = self.read_file()? else {
            return Ok(None);
        };
        let now = Utc::now();
        let access = file.auth_token.filter(|value| value.is_live(now));
        let refresh = file.refresh_token.filter(|value| value.is_live(now));
        Ok(match (access, refresh) {
            (Some(access), refresh) => Some(TokenPair::new(
                access.value,
                refresh.map(|value| value.value),
            )),
            // Access cookie expired; keep the refresh token reachable so the
            // next 401 can still rotate the pair.
            (None, Some(refresh)) => Some(TokenPair::new(String::new(), Some(refresh.value))),
            (None, None) => None,
        })
    }

    fn set(&self, pair: &TokenPair) -> Result<(), StorageError> {
        let _write = self.guard.write().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        let file = SessionFile {
            version: 1,
            auth_token: Some(StoredValue {
                value: pair.access_token.clone(),
                expires_at: now + Duration::days(ACCESS_TOKEN_TTL_DAYS),
            }),
            refresh_token: pair.refresh_token.as_ref().map(|value| StoredValue {
                value: value.clone(),
                expires_at: now + Duration::days(REFRESH_TOKEN_TTL_DAYS),
            }),
            saved_at: now,
        };
        self.write_file(&file)
    }

    fn clear(&self) -> Result<(), StorageError> {
        let _write = self.guard.write().unwrap_or_else(PoisonError::into_inner);
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::Io(err.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionFile {
    version: u32,
    saved_at: DateTime<Utc>,
    // Tables last so scalars stay above the first table header.
    #[serde(rename = "authToken", default, skip_serializing_if = "Option::is_none")]
    auth_token: Option<StoredValue>,
    #[serde(rename = "refreshToken", default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<StoredValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredValue {
    value: String,
    expires_at: DateTime<Utc>,
}

impl StoredValue {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now && !self.value.is_empty()
    }
}

fn default_storedesk_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".storedesk"))
        .unwrap_or_else(|| PathBuf::from(".storedesk"))
}
