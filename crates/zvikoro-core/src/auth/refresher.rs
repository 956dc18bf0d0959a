//! Access token renewal.
//!
//! Renewal is single-flight: while one exchange is in progress, every other
//! caller that needs a fresh token awaits that same exchange. With refresh
//! token rotation this matters, because a second exchange would present a
//! refresh token the first one just invalidated.

use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::claims::ExpiryPolicy;
use super::error::RenewalFailure;
use super::session::{SessionStore, TokenPair};

type PendingRenewal = Shared<BoxFuture<'static, Result<TokenPair, RenewalFailure>>>;

#[derive(Debug, Serialize)]
struct RenewalRequest<'a> {
    refresh: &'a str,
}

#[derive(Debug, Deserialize)]
struct RenewalResponse {
    access: String,
    /// Present only when the server rotates refresh tokens
    #[serde(default)]
    refresh: Option<String>,
}

/// Exchanges the stored refresh token for a new token pair.
pub struct Refresher {
    http: Client,
    endpoint: String,
    store: Arc<SessionStore>,
    policy: ExpiryPolicy,
    /// Generation counter and the renewal currently in flight
    pending: Mutex<(u64, Option<PendingRenewal>)>,
}

impl Refresher {
    pub fn new(
        http: Client,
        endpoint: impl Into<String>,
        store: Arc<SessionStore>,
        policy: ExpiryPolicy,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            store,
            policy,
            pending: Mutex::new((0, None)),
        }
    }

    /// Obtain a fresh token pair, joining a renewal already in flight.
    ///
    /// If no renewal is running and the stored access token is already fresh
    /// (another caller just renewed it), the stored pair is returned without
    /// contacting the server.
    pub async fn renew(&self) -> Result<TokenPair, RenewalFailure> {
        let (generation, renewal) = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            match &pending.1 {
                Some(renewal) => {
                    debug!("Joining renewal already in flight");
                    (pending.0, renewal.clone())
                }
                None => {
                    if let Some(tokens) = self.store.tokens() {
                        if !self.policy.is_stale(&tokens.access) {
                            return Ok(tokens);
                        }
                    }
                    pending.0 += 1;
                    let renewal = Self::exchange(
                        self.http.clone(),
                        self.endpoint.clone(),
                        Arc::clone(&self.store),
                    )
                    .boxed()
                    .shared();
                    pending.1 = Some(renewal.clone());
                    (pending.0, renewal)
                }
            }
        };

        let result = renewal.await;

        // The first waiter to finish retires this renewal so the next stale
        // check starts a new one
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if pending.0 == generation {
            pending.1 = None;
        }
        result
    }

    async fn exchange(
        http: Client,
        endpoint: String,
        store: Arc<SessionStore>,
    ) -> Result<TokenPair, RenewalFailure> {
        let current = store
            .refresh_token()
            .ok_or(RenewalFailure::MissingRefreshToken)?;

        debug!(endpoint = %endpoint, "Renewing access token");
        let response = http
            .post(&endpoint)
            .json(&RenewalRequest { refresh: &current })
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Renewal request failed");
                RenewalFailure::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Renewal rejected");
            return Err(RenewalFailure::Rejected(status.as_u16()));
        }

        let body: RenewalResponse = response
            .json()
            .await
            .map_err(|e| RenewalFailure::InvalidResponse(e.to_string()))?;

        let rotated = body.refresh.is_some();
        let tokens = TokenPair {
            access: body.access,
            refresh: body.refresh.unwrap_or_else(|| current.clone()),
        };

        let applied = store
            .set_tokens(&current, tokens.clone())
            .map_err(|e| RenewalFailure::Storage(e.to_string()))?;
        if !applied {
            warn!("Session ended or changed during renewal");
            return Err(RenewalFailure::Superseded);
        }

        info!(rotated, "Access token renewed");
        Ok(tokens)
    }
}
