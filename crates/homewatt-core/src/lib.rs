//! Core library for homewatt.
//!
//! The heart of this crate is the client-side session: [`auth::SessionController`]
//! owns the bearer token, answers "is the user signed in?" with a fresh expiry
//! check every time, and runs a cancellable background sweep that ends a session
//! as soon as its token lapses. Everything else here is the plumbing a client
//! needs around it:
//!
//! - `storage`: durable key/value backends (JSON file, OS keyring, memory)
//! - `api`: REST client for devices, stats and the query assistant
//! - `models`: wire types shared with the backend
//! - `chat`: append-only conversation transcript
//! - `config`: on-disk configuration and well-known directories

pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod models;
pub mod storage;

pub use api::{ApiClient, ApiError, HttpAuthenticator};
pub use auth::{
    Access, AuthError, Authenticator, Clock, DecodeError, DecodedToken, ManualClock, Route,
    RouteGuard, Session, SessionController, SessionEvent, SessionState, SystemClock, TokenCodec,
    TokenStore,
};
pub use chat::{ChatHistory, Message, Role};
pub use config::{Config, TokenBackend};
pub use storage::{FileStore, KeyValueStore, KeyringStore, MemoryStore, PersistenceError};
