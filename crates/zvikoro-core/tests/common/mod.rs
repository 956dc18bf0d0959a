//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde_json::{json, Value};
use wiremock::MockServer;
use zvikoro_core::auth::{TOKENS_KEY, USER_KEY};
use zvikoro_core::{ApiClient, Endpoints, ExpiryPolicy, KeyValueStore, MemoryStore};

/// Path prefix the mock service is mounted under
pub const BASE_PATH: &str = "/schools/";

pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// A compact token whose `exp` is `expires_in_secs` from now
pub fn token(label: &str, expires_in_secs: i64) -> String {
    let payload = json!({
        "exp": Utc::now().timestamp() + expires_in_secs,
        "jti": label,
    });
    format!(
        "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.{}.sig-{}",
        URL_SAFE_NO_PAD.encode(payload.to_string()),
        label
    )
}

pub fn fresh_token(label: &str) -> String {
    token(label, 3600)
}

/// Expires in 10 seconds, inside the default 60 second buffer
pub fn stale_token(label: &str) -> String {
    token(label, 10)
}

pub fn profile_json(username: &str) -> Value {
    json!({"id": 1, "username": username, "department": "Accounts", "is_admin": false})
}

/// Storage holding a complete session, as left by a previous run
pub fn seeded_storage(access: &str, refresh: &str) -> Arc<MemoryStore> {
    let storage = Arc::new(MemoryStore::new());
    storage
        .set(
            TOKENS_KEY,
            &json!({"access": access, "refresh": refresh}).to_string(),
        )
        .unwrap();
    storage
        .set(USER_KEY, &profile_json("alice").to_string())
        .unwrap();
    storage
}

pub fn client(server: &MockServer, storage: Arc<MemoryStore>) -> ApiClient {
    ApiClient::with_http(
        reqwest::Client::new(),
        Endpoints::new(format!("{}{}", server.uri(), BASE_PATH)),
        ExpiryPolicy::default(),
        storage,
    )
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}
