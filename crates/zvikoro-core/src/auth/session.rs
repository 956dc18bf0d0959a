use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::Profile;
use crate::storage::{KeyValueStore, StorageError};

/// Storage key for the token pair
pub const TOKENS_KEY: &str = "authTokens";

/// Storage key for the user profile
pub const USER_KEY: &str = "user";

/// Access and refresh token, always held together.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

impl TokenPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }
}

// Tokens are bearer credentials; keep them out of logs and panics
impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &format_args!("<{} bytes>", self.access.len()))
            .field("refresh", &format_args!("<{} bytes>", self.refresh.len()))
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub tokens: Option<TokenPair>,
    pub user: Option<Profile>,
}

impl Session {
    pub fn new(tokens: TokenPair, user: Profile) -> Self {
        Self {
            tokens: Some(tokens),
            user: Some(user),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_none() && self.user.is_none()
    }
}

/// Owns the current session and mirrors it to durable storage.
///
/// Storage is read once in [`SessionStore::open`]; after that memory is
/// authoritative and every mutation is written through.
pub struct SessionStore {
    storage: Arc<dyn KeyValueStore>,
    current: RwLock<Session>,
}

impl SessionStore {
    /// Restore the session persisted by a previous run.
    ///
    /// Unreadable or partial records start the process logged out.
    pub fn open(storage: Arc<dyn KeyValueStore>) -> Self {
        let session = Self::load(storage.as_ref()).unwrap_or_else(|e| {
            warn!(error = %e, "Discarding unreadable stored session");
            Session::default()
        });
        debug!(authenticated = session.tokens.is_some(), "Session loaded");

        Self {
            storage,
            current: RwLock::new(session),
        }
    }

    fn load(storage: &dyn KeyValueStore) -> Result<Session, StorageError> {
        let tokens = match storage.get(TOKENS_KEY)? {
            Some(raw) => serde_json::from_str::<Option<TokenPair>>(&raw)?,
            None => None,
        };
        let user = match storage.get(USER_KEY)? {
            Some(raw) => serde_json::from_str::<Option<Profile>>(&raw)?,
            None => None,
        };

        // A profile without tokens cannot make a call; tokens without a
        // profile came from an interrupted write
        match (tokens, user) {
            (Some(tokens), Some(user)) => Ok(Session::new(tokens, user)),
            (None, None) => Ok(Session::default()),
            _ => {
                warn!("Stored session is incomplete, starting logged out");
                Ok(Session::default())
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Session> {
        // Writers only assign whole values, so a poisoned lock still holds a
        // consistent session
        self.current.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.current.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the current session
    pub fn session(&self) -> Session {
        self.read().clone()
    }

    pub fn tokens(&self) -> Option<TokenPair> {
        self.read().tokens.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().tokens.as_ref().map(|t| t.access.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read().tokens.as_ref().map(|t| t.refresh.clone())
    }

    pub fn user(&self) -> Option<Profile> {
        self.read().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().tokens.is_some()
    }

    /// Replace the whole session. Memory changes only if both entries were
    /// persisted.
    pub fn set(&self, session: Session) -> Result<(), StorageError> {
        let mut current = self.write();
        if let Err(e) = self.persist(&session) {
            self.restore(&current);
            return Err(e);
        }
        *current = session;
        Ok(())
    }

    /// Replace the tokens after a renewal, leaving the profile untouched.
    ///
    /// Applies only while the stored refresh token is still `expected`, the
    /// one the renewal presented. Returns `Ok(false)` without writing when the
    /// session was cleared or replaced in the meantime.
    pub fn set_tokens(&self, expected: &str, tokens: TokenPair) -> Result<bool, StorageError> {
        let mut current = self.write();
        if current.tokens.as_ref().map(|t| t.refresh.as_str()) != Some(expected) {
            debug!("Session changed during renewal, discarding renewed tokens");
            return Ok(false);
        }
        self.storage
            .set(TOKENS_KEY, &serde_json::to_string(&tokens)?)?;
        current.tokens = Some(tokens);
        Ok(true)
    }

    /// Replace the profile wholesale, leaving the tokens untouched.
    ///
    /// Returns `Ok(false)` without writing when nobody is logged in.
    pub fn set_profile(&self, user: Profile) -> Result<bool, StorageError> {
        let mut current = self.write();
        if current.tokens.is_none() {
            debug!("No session, discarding fetched profile");
            return Ok(false);
        }
        self.storage.set(USER_KEY, &serde_json::to_string(&user)?)?;
        current.user = Some(user);
        Ok(true)
    }

    /// Forget the session in memory and in storage.
    ///
    /// Memory is always cleared, even when storage removal fails.
    pub fn clear(&self) -> Result<(), StorageError> {
        let mut current = self.write();
        *current = Session::default();
        let tokens = self.storage.remove(TOKENS_KEY);
        let user = self.storage.remove(USER_KEY);
        tokens.and(user)
    }

    fn persist(&self, session: &Session) -> Result<(), StorageError> {
        // Encode both first so a serialization error writes nothing
        let tokens = session
            .tokens
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let user = session.user.as_ref().map(serde_json::to_string).transpose()?;

        match tokens {
            Some(raw) => self.storage.set(TOKENS_KEY, &raw)?,
            None => self.storage.remove(TOKENS_KEY)?,
        }
        match user {
            Some(raw) => self.storage.set(USER_KEY, &raw)?,
            None => self.storage.remove(USER_KEY)?,
        }
        Ok(())
    }

    fn restore(&self, previous: &Session) {
        if let Err(e) = self.persist(previous) {
            warn!(error = %e, "Failed to restore previous session in storage");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn profile(name: &str) -> Profile {
        serde_json::from_value(json!({"username": name, "department": "HR"})).unwrap()
    }

    fn memory() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new())
    }

    /// Fails every write to one key
    struct FailingStore {
        inner: MemoryStore,
        fail_key: &'static str,
    }

    impl KeyValueStore for FailingStore {
        fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if key == self.fail_key {
                return Err(std::io::Error::other("disk full").into());
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_open_empty_storage() {
        let store = SessionStore::open(memory());
        assert!(store.session().is_empty());
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_set_persists_and_reopens() {
        let storage = memory();
        let store = SessionStore::open(storage.clone());
        store
            .set(Session::new(TokenPair::new("a1", "r1"), profile("alice")))
            .unwrap();

        assert!(storage.contains(TOKENS_KEY));
        assert!(storage.contains(USER_KEY));

        let reopened = SessionStore::open(storage);
        assert_eq!(reopened.tokens(), Some(TokenPair::new("a1", "r1")));
        assert_eq!(reopened.user(), Some(profile("alice")));
    }

    #[test]
    fn test_stored_layout() {
        let storage = memory();
        let store = SessionStore::open(storage.clone());
        store
            .set(Session::new(TokenPair::new("a1", "r1"), profile("alice")))
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&storage.get(TOKENS_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(raw, json!({"access": "a1", "refresh": "r1"}));
    }

    #[test]
    fn test_open_discards_garbage() {
        let storage = memory();
        storage.set(TOKENS_KEY, "{not json").unwrap();
        storage.set(USER_KEY, r#"{"username":"alice"}"#).unwrap();
        let store = SessionStore::open(storage);
        assert!(store.session().is_empty());
    }

    #[test]
    fn test_open_discards_partial_pair() {
        let storage = memory();
        storage.set(TOKENS_KEY, r#"{"access":"a1"}"#).unwrap();
        storage.set(USER_KEY, r#"{"username":"alice"}"#).unwrap();
        assert!(SessionStore::open(storage).session().is_empty());
    }

    #[test]
    fn test_open_discards_tokens_without_profile() {
        let storage = memory();
        storage
            .set(TOKENS_KEY, r#"{"access":"a1","refresh":"r1"}"#)
            .unwrap();
        assert!(SessionStore::open(storage).session().is_empty());
    }

    #[test]
    fn test_open_accepts_null_entries() {
        let storage = memory();
        storage.set(TOKENS_KEY, "null").unwrap();
        storage.set(USER_KEY, "null").unwrap();
        assert!(SessionStore::open(storage).session().is_empty());
    }

    #[test]
    fn test_set_tokens_keeps_profile() {
        let store = SessionStore::open(memory());
        store
            .set(Session::new(TokenPair::new("a1", "r1"), profile("alice")))
            .unwrap();
        assert!(store.set_tokens("r1", TokenPair::new("a2", "r2")).unwrap());

        assert_eq!(store.access_token().as_deref(), Some("a2"));
        assert_eq!(store.refresh_token().as_deref(), Some("r2"));
        assert_eq!(store.user(), Some(profile("alice")));
    }

    #[test]
    fn test_set_tokens_after_clear_is_discarded() {
        let storage = memory();
        let store = SessionStore::open(storage.clone());
        store
            .set(Session::new(TokenPair::new("a1", "r1"), profile("alice")))
            .unwrap();
        store.clear().unwrap();

        assert!(!store.set_tokens("r1", TokenPair::new("a2", "r2")).unwrap());
        assert!(store.session().is_empty());
        assert!(!storage.contains(TOKENS_KEY));
    }

    #[test]
    fn test_set_tokens_for_replaced_session_is_discarded() {
        let store = SessionStore::open(memory());
        store
            .set(Session::new(TokenPair::new("a1", "r1"), profile("alice")))
            .unwrap();
        // Someone logged in again while the old renewal was in flight
        store
            .set(Session::new(TokenPair::new("b1", "s1"), profile("bob")))
            .unwrap();

        assert!(!store.set_tokens("r1", TokenPair::new("a2", "r2")).unwrap());
        assert_eq!(store.tokens(), Some(TokenPair::new("b1", "s1")));
    }

    #[test]
    fn test_set_profile_without_session_is_discarded() {
        let storage = memory();
        let store = SessionStore::open(storage.clone());

        assert!(!store.set_profile(profile("alice")).unwrap());
        assert!(store.session().is_empty());
        assert!(!storage.contains(USER_KEY));
    }

    #[test]
    fn test_clear_removes_everything() {
        let storage = memory();
        let store = SessionStore::open(storage.clone());
        store
            .set(Session::new(TokenPair::new("a1", "r1"), profile("alice")))
            .unwrap();
        store.clear().unwrap();

        assert!(store.session().is_empty());
        assert!(!storage.contains(TOKENS_KEY));
        assert!(!storage.contains(USER_KEY));
        // Clearing an empty store is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_failed_set_leaves_memory_and_storage_unchanged() {
        let storage = Arc::new(FailingStore {
            inner: MemoryStore::new(),
            fail_key: USER_KEY,
        });
        let store = SessionStore::open(storage.clone());

        let result = store.set(Session::new(TokenPair::new("a1", "r1"), profile("alice")));
        assert!(result.is_err());
        assert!(store.session().is_empty());
        // The tokens entry written before the failure was rolled back
        assert!(!storage.inner.contains(TOKENS_KEY));
    }

    #[test]
    fn test_token_pair_debug_hides_values() {
        let debug = format!("{:?}", TokenPair::new("secret-access", "secret-refresh"));
        assert!(!debug.contains("secret"));
    }
}
