//! Client-side authentication session.
//!
//! This module provides:
//! - `TokenCodec`: reads the `exp` claim out of a bearer token
//! - `TokenStore`: durable copy of the current raw token
//! - `SessionController`: the single owner of session state, login/logout,
//!   and the background expiry sweep
//! - `RouteGuard`: the read-only check protected views consult before rendering
//!
//! Expiry is always re-checked on demand; the sweep only makes sure an idle
//! session still ends (and subscribers hear about it) without anyone asking.

pub mod clock;
pub mod error;
pub mod guard;
pub mod session;
pub mod store;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::AuthError;
pub use guard::{Access, Route, RouteGuard};
pub use session::{
    Authenticator, Session, SessionController, SessionEvent, SessionState, DEFAULT_SWEEP_INTERVAL,
};
pub use store::{TokenStore, TOKEN_KEY};
pub use token::{DecodeError, DecodedToken, TokenCodec};
