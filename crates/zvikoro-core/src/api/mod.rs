//! REST API client module for the district administration service.
//!
//! This module provides the `ApiClient`, the single gate every protected
//! request passes through. It renews stale access tokens before dispatch,
//! attaches the bearer header, and ends the session on a 401.

pub mod client;
pub mod endpoints;
pub mod error;

pub use client::{ApiClient, RequestBody, RequestOptions};
pub use endpoints::Endpoints;
pub use error::ApiError;
