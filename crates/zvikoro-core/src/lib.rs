//! Core library for zvikoro, the district administration client.
//!
//! The interesting part is the session layer: bearer tokens are decoded to
//! judge their freshness, renewed before they expire, persisted across
//! restarts, and every protected request is funneled through
//! [`ApiClient::call`], which decides when to renew and when to end the
//! session.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use zvikoro_core::{ApiClient, Config, RequestOptions};
//!
//! let mut config = Config::load()?;
//! config.apply_env();
//! let client = ApiClient::new(&config, config.open_storage()?)?;
//!
//! client.login("alice", "secret").await?;
//! let url = client.endpoints().url("secondary-schools/");
//! let response = client.call(&url, RequestOptions::get()).await?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod storage;

pub use api::{ApiClient, ApiError, Endpoints, RequestBody, RequestOptions};
pub use auth::{
    AuthState, Claims, ExpiryPolicy, LoginFailure, LogoutReason, RenewalFailure, Session,
    SessionStore, TokenPair, ValidationFailure,
};
pub use config::{Config, StorageBackend};
pub use models::{Announcement, Profile, RegistrationForm};
pub use storage::{FileStore, KeyValueStore, KeyringStore, MemoryStore, StorageError};
