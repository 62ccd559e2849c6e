//! HTTP client module for the Inkdesk platform services.
//!
//! This module provides the `ApiClient` for talking to the platform's
//! authentication endpoints (login challenges, scan-status polling,
//! password login) and its data API (user profile).
//!
//! Authenticated requests carry the bearer token obtained from either
//! login path.

pub mod client;
pub mod error;

pub use client::{ApiClient, LoginChallenge, LoginStatus};
pub use error::ApiError;
