//! Authentication module for managing user sessions and bearer tokens.
//!
//! This module provides:
//! - `decode` / `ExpiryPolicy`: reading token claims and deciding staleness
//! - `SessionStore`: the current token pair and profile, mirrored to storage
//! - `Refresher`: single-flight renewal of the access token
//! - `SessionLifecycle`: login, logout and account registration
//!
//! Access tokens are renewed one minute before they expire by default.

pub mod claims;
pub mod error;
pub mod lifecycle;
pub mod refresher;
pub mod session;

pub use claims::{decode, Claims, ExpiryPolicy, DEFAULT_REFRESH_BUFFER_MS};
pub use error::{DecodeFailure, LoginFailure, RenewalFailure, ValidationFailure};
pub use lifecycle::{AuthState, LogoutReason, SessionLifecycle};
pub use refresher::Refresher;
pub use session::{Session, SessionStore, TokenPair, TOKENS_KEY, USER_KEY};
