//! Client-side decoding of bearer token claims.
//!
//! Tokens are compact `header.payload.signature` strings. Only the payload is
//! read, and only to decide when to renew. The signature is never checked:
//! nothing decoded here is trusted for authorization.

use std::time::Duration;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::error::DecodeFailure;

/// Renew this long before the token's own expiry (60 seconds)
pub const DEFAULT_REFRESH_BUFFER_MS: u64 = 60_000;

/// base64url that accepts payloads with or without `=` padding
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Claims read from a token payload.
///
/// Only numeric `exp`/`iat` and string `sub` are recognised. A claim with the
/// wrong JSON type is treated as absent rather than coerced.
#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    /// Expiry, seconds since the Unix epoch
    pub exp: Option<i64>,
    /// Issued-at, seconds since the Unix epoch
    pub iat: Option<i64>,
    pub sub: Option<String>,
    /// The full payload object
    pub raw: Map<String, Value>,
}

impl Claims {
    fn from_payload(raw: Map<String, Value>) -> Self {
        Self {
            exp: raw.get("exp").and_then(numeric_seconds),
            iat: raw.get("iat").and_then(numeric_seconds),
            sub: raw.get("sub").and_then(Value::as_str).map(str::to_string),
            raw,
        }
    }

    /// Expiry as a timestamp, if the token declares a usable one
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }
}

fn numeric_seconds(value: &Value) -> Option<i64> {
    if let Some(secs) = value.as_i64() {
        return Some(secs);
    }
    // serde_json never yields NaN or infinity, but large floats can overflow
    value
        .as_f64()
        .map(f64::floor)
        .filter(|secs| *secs >= i64::MIN as f64 && *secs <= i64::MAX as f64)
        .map(|secs| secs as i64)
}

/// Decode the payload segment of a compact token.
pub fn decode(token: &str) -> Result<Claims, DecodeFailure> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(DecodeFailure::MalformedToken(segments.len()));
    }

    let bytes = PAYLOAD_ENGINE
        .decode(segments[1])
        .map_err(|_| DecodeFailure::InvalidEncoding)?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(raw)) => Ok(Claims::from_payload(raw)),
        Ok(_) => Err(DecodeFailure::InvalidPayload(
            "payload is not a JSON object".to_string(),
        )),
        Err(e) => Err(DecodeFailure::InvalidPayload(e.to_string())),
    }
}

/// Decides whether an access token is too close to expiry to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    buffer: Duration,
}

impl ExpiryPolicy {
    pub fn new(buffer: Duration) -> Self {
        Self { buffer }
    }

    pub fn from_millis(buffer_ms: u64) -> Self {
        Self::new(Duration::from_millis(buffer_ms))
    }

    pub fn buffer(&self) -> Duration {
        self.buffer
    }

    /// Check the token against the current time
    pub fn is_stale(&self, token: &str) -> bool {
        self.is_stale_at(token, Utc::now())
    }

    /// A token is stale when it cannot be decoded, declares no expiry, or
    /// expires within the buffer of `now`.
    pub fn is_stale_at(&self, token: &str, now: DateTime<Utc>) -> bool {
        let exp = match decode(token) {
            Ok(Claims { exp: Some(exp), .. }) => exp,
            Ok(_) => return true,
            Err(_) => return true,
        };

        let remaining_ms = i128::from(exp) * 1000 - i128::from(now.timestamp_millis());
        remaining_ms <= self.buffer.as_millis() as i128
    }
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self::from_millis(DEFAULT_REFRESH_BUFFER_MS)
    }
}

// ============================================================================
// Tests
// ============================================================================
