//! REST client for the energy backend.
//!
//! This module provides the `ApiClient` for login/registration, device
//! listing and creation, per-device usage stats and the query assistant,
//! plus `HttpAuthenticator`, the login endpoint as seen by the session.
//!
//! Authenticated calls carry `Authorization: Bearer <token>`, where the token
//! is taken from the `SessionController` at request time.

pub mod authenticator;
pub mod client;
pub mod error;

pub use authenticator::HttpAuthenticator;
pub use client::ApiClient;
pub use error::ApiError;
