use std::sync::Arc;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use super::error::{LoginFailure, ValidationFailure};
use super::session::{Session, SessionStore, TokenPair};
use crate::api::Endpoints;
use crate::models::{Profile, RegistrationForm};

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// The user asked to log out
    UserRequested,
    /// The refresh token was missing or the renewal endpoint refused it
    RenewalFailed,
    /// A protected call came back 401
    Unauthorized,
}

/// Published whenever the session starts or ends.
///
/// Presentation code watches this to move between the login screen and the
/// rest of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Authenticated,
    Unauthenticated { reason: Option<LogoutReason> },
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated)
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access: String,
    refresh: String,
    user: Profile,
}

/// Starts and ends sessions.
pub struct SessionLifecycle {
    http: Client,
    endpoints: Endpoints,
    store: Arc<SessionStore>,
    state: watch::Sender<AuthState>,
}

impl SessionLifecycle {
    pub fn new(http: Client, endpoints: Endpoints, store: Arc<SessionStore>) -> Self {
        let initial = if store.is_authenticated() {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated { reason: None }
        };
        let (state, _) = watch::channel(initial);

        Self {
            http,
            endpoints,
            store,
            state,
        }
    }

    /// Watch session transitions
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> AuthState {
        *self.state.borrow()
    }

    /// Exchange credentials for a token pair and profile, and store both.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, LoginFailure> {
        let response = self
            .http
            .post(self.endpoints.token())
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Login rejected");
            return Err(LoginFailure::Rejected(ValidationFailure::from_body(
                &body,
                "Invalid credentials",
            )));
        }

        let auth: LoginResponse = response
            .json()
            .await
            .map_err(|e| LoginFailure::InvalidResponse(e.to_string()))?;

        let session = Session::new(TokenPair::new(auth.access, auth.refresh), auth.user);
        self.store.set(session.clone())?;
        self.state.send_replace(AuthState::Authenticated);

        info!(username, "Logged in");
        Ok(session)
    }

    /// End the session and signal the unauthenticated entry point.
    ///
    /// Safe to call repeatedly; only the first call after a login notifies
    /// watchers.
    pub fn logout(&self, reason: LogoutReason) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to remove stored session");
        }

        let next = AuthState::Unauthenticated {
            reason: Some(reason),
        };
        let changed = self.state.send_if_modified(|state| {
            if state.is_authenticated() {
                *state = next;
                true
            } else {
                false
            }
        });
        if changed {
            info!(?reason, "Logged out");
        }
    }

    /// Create a regular account
    pub async fn register_user(&self, form: &RegistrationForm) -> Result<(), LoginFailure> {
        self.register(self.endpoints.register_user(), form).await
    }

    /// Create an administrator account
    pub async fn create_admin(&self, form: &RegistrationForm) -> Result<(), LoginFailure> {
        self.register(self.endpoints.register_admin(), form).await
    }

    async fn register(&self, url: String, form: &RegistrationForm) -> Result<(), LoginFailure> {
        if !form.passwords_match() {
            return Err(LoginFailure::Rejected(ValidationFailure::new(
                "Passwords do not match",
            )));
        }

        let response = self.http.post(&url).json(form).send().await?;
        if response.status() == StatusCode::CREATED {
            info!(username = %form.username, "Account created");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(LoginFailure::Rejected(ValidationFailure::from_body(
            &body,
            "Check your data",
        )))
    }
}
