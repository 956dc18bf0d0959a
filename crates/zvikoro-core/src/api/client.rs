//! API client for the district administration REST API.
//!
//! `ApiClient::call` is the authenticated-request gate: every protected
//! request goes through it so that a stale token is renewed before dispatch
//! and a rejected token ends the session. The account helpers further down
//! are ordinary consumers of that gate.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{multipart, Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{ApiError, Endpoints};
use crate::auth::{
    AuthState, ExpiryPolicy, LoginFailure, LogoutReason, Refresher, RenewalFailure, Session,
    SessionLifecycle, SessionStore, ValidationFailure,
};
use crate::config::Config;
use crate::models::{Announcement, Profile, RegistrationForm};
use crate::storage::KeyValueStore;

/// Marker sent with every non-multipart body
const JSON_CONTENT_TYPE: &str = "application/json";

/// Body of a protected request.
#[derive(Debug, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Text(String),
    /// Sent with reqwest's own boundary-aware content type
    Multipart(multipart::Form),
}

/// Method, extra headers and body for [`ApiClient::call`].
#[derive(Debug)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    pub fn put() -> Self {
        Self::new(Method::PUT)
    }

    pub fn patch() -> Self {
        Self::new(Method::PATCH)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Unserializable body: {}", e)))?;
        self.body = RequestBody::Json(value);
        Ok(self)
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = RequestBody::Text(body.into());
        self
    }

    pub fn multipart(mut self, form: multipart::Form) -> Self {
        self.body = RequestBody::Multipart(form);
        self
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::get()
    }
}

/// API client for the district administration service.
/// Clone is cheap - the session components and reqwest::Client are shared.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    endpoints: Endpoints,
    policy: ExpiryPolicy,
    store: Arc<SessionStore>,
    refresher: Arc<Refresher>,
    lifecycle: Arc<SessionLifecycle>,
}

impl ApiClient {
    /// Build a client from configuration, restoring any stored session
    pub fn new(config: &Config, storage: Arc<dyn KeyValueStore>) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs()))
            .build()?;
        Ok(Self::with_http(
            http,
            Endpoints::new(config.base_url()),
            config.expiry_policy(),
            storage,
        ))
    }

    /// Assemble the session components around an existing HTTP client
    pub fn with_http(
        http: Client,
        endpoints: Endpoints,
        policy: ExpiryPolicy,
        storage: Arc<dyn KeyValueStore>,
    ) -> Self {
        let store = Arc::new(SessionStore::open(storage));
        let refresher = Arc::new(Refresher::new(
            http.clone(),
            endpoints.token_refresh(),
            Arc::clone(&store),
            policy,
        ));
        let lifecycle = Arc::new(SessionLifecycle::new(
            http.clone(),
            endpoints.clone(),
            Arc::clone(&store),
        ));

        Self {
            http,
            endpoints,
            policy,
            store,
            refresher,
            lifecycle,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// The current session snapshot
    pub fn session(&self) -> Session {
        self.store.session()
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.is_authenticated()
    }

    pub fn lifecycle(&self) -> &SessionLifecycle {
        &self.lifecycle
    }

    /// Watch login/logout transitions
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<AuthState> {
        self.lifecycle.subscribe()
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Session, LoginFailure> {
        self.lifecycle.login(username, password).await
    }

    pub fn logout(&self) {
        self.lifecycle.logout(LogoutReason::UserRequested);
    }

    pub async fn register_user(&self, form: &RegistrationForm) -> Result<(), LoginFailure> {
        self.lifecycle.register_user(form).await
    }

    pub async fn create_admin(&self, form: &RegistrationForm) -> Result<(), LoginFailure> {
        self.lifecycle.create_admin(form).await
    }

    // ===== Authenticated Request Gate =====

    /// Send a protected request.
    ///
    /// Renews the access token first when it is missing or stale; if renewal
    /// fails the session is ended and `ApiError::NoSession` returned without
    /// dispatching. A 401 response also ends the session, but the response
    /// is still handed back so the caller can inspect it. The request is
    /// never retried.
    pub async fn call(&self, target: &str, options: RequestOptions) -> Result<Response, ApiError> {
        let access = match self.store.access_token() {
            Some(token) if !self.policy.is_stale(&token) => token,
            _ => self.renew_or_logout().await?,
        };

        let RequestOptions {
            method,
            headers: extra,
            body,
        } = options;

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", access)).map_err(|_| {
            ApiError::InvalidResponse("Access token is not a valid header value".to_string())
        })?;
        headers.insert(header::AUTHORIZATION, bearer);
        // Caller headers win, including an explicit Authorization
        headers.extend(extra);

        let request = self.http.request(method.clone(), target);
        let request = match body {
            RequestBody::Multipart(form) => {
                headers.remove(header::CONTENT_TYPE);
                request.headers(headers).multipart(form)
            }
            RequestBody::Json(value) => {
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
                request.headers(headers).body(value.to_string())
            }
            RequestBody::Text(text) => {
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
                request.headers(headers).body(text)
            }
            RequestBody::Empty => {
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
                request.headers(headers)
            }
        };

        debug!(%method, url = target, "Sending authenticated request");
        let response = request.send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(url = target, "Request unauthorized, ending session");
            self.lifecycle.logout(LogoutReason::Unauthorized);
        }

        Ok(response)
    }

    async fn renew_or_logout(&self) -> Result<String, ApiError> {
        match self.refresher.renew().await {
            Ok(tokens) => Ok(tokens.access),
            // Whoever cleared or replaced the session already owns the
            // logout signal
            Err(RenewalFailure::Superseded) => {
                debug!("Renewal superseded, request not sent");
                Err(ApiError::NoSession)
            }
            Err(e) => {
                warn!(error = %e, "Token renewal failed, ending session");
                self.lifecycle.logout(LogoutReason::RenewalFailed);
                Err(ApiError::NoSession)
            }
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// GET a protected resource and parse its JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let response = Self::check_response(self.call(url, RequestOptions::get()).await?).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", url, e)))
    }

    /// Send a JSON body to a protected resource, discarding the reply body
    pub async fn send_json<B: Serialize>(
        &self,
        method: Method,
        url: &str,
        body: &B,
    ) -> Result<(), ApiError> {
        let options = RequestOptions::new(method).json(body)?;
        Self::check_response(self.call(url, options).await?).await?;
        Ok(())
    }

    // ===== Account Operations =====

    /// Re-fetch the current user and replace the stored profile.
    ///
    /// Returns `Ok(None)` when nobody is logged in, including when the
    /// session ended while the request was in flight.
    pub async fn fetch_user_profile(&self) -> Result<Option<Profile>, ApiError> {
        if !self.store.is_authenticated() {
            return Ok(None);
        }
        let profile: Profile = self.get_json(&self.endpoints.user_me()).await?;
        if !self.store.set_profile(profile.clone())? {
            return Ok(None);
        }
        debug!("User profile refreshed");
        Ok(Some(profile))
    }

    /// Partially update the current user, then re-fetch the full profile
    pub async fn update_user_profile(&self, changes: &Value) -> Result<Option<Profile>, ApiError> {
        self.send_json(Method::PATCH, &self.endpoints.user_me(), changes)
            .await?;
        self.fetch_user_profile().await
    }

    /// Ask the server to recompute term balances for all schools
    pub async fn update_term_balances(&self) -> Result<(), ApiError> {
        let response = self
            .call(&self.endpoints.update_balances(), RequestOptions::post())
            .await?;
        Self::check_response(response).await?;
        Ok(())
    }

    /// Post an announcement
    pub async fn send_message(&self, message: &str) -> Result<(), ApiError> {
        if message.trim().is_empty() {
            return Err(ApiError::Validation(ValidationFailure::new(
                "Message cannot be empty",
            )));
        }
        self.send_json(
            Method::POST,
            &self.endpoints.messages(),
            &serde_json::json!({ "message": message }),
        )
        .await
    }

    /// Public announcements; no session needed
    pub async fn fetch_public_announcements(&self) -> Result<Vec<Announcement>, ApiError> {
        let response = self.http.get(self.endpoints.messages_public()).send().await?;
        let response = Self::check_response(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse announcements: {}", e)))
    }
}
