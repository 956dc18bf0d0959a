//! Durable key-value storage for session state.
//!
//! This module provides:
//! - `KeyValueStore`: the trait the session store persists through
//! - `FileStore`: one JSON file per key in a data directory
//! - `KeyringStore`: entries in the OS keychain
//! - `MemoryStore`: process-local map, used by tests and ephemeral runs
//!
//! Values are opaque strings; the session store owns their JSON encoding.

pub mod file;
pub mod keyring;
pub mod memory;

use thiserror::Error;

pub use self::file::FileStore;
pub use self::keyring::KeyringStore;
pub use self::memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode stored value: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] ::keyring::Error),
}

/// A string-keyed store that survives process restarts.
pub trait KeyValueStore: Send + Sync {
    /// Read a value, returning `None` when the key has never been written
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}
