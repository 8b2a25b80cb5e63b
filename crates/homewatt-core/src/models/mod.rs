//! Wire types shared with the energy backend.
//!
//! - `AuthResponse`, `UserPublic`: login and registration
//! - `DevicePublic`, `DeviceStats`, `HourlyUsage`: devices and usage
//! - `QueryResponse`: answers from the query assistant

pub mod auth;
pub mod device;
pub mod query;

pub use auth::{AuthResponse, UserPublic};
pub use device::{DeviceCreate, DevicePublic, DeviceStats, HourlyUsage, DEFAULT_DEVICE_TYPE};
pub use query::{QueryRequest, QueryResponse};
