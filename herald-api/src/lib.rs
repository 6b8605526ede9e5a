//! Herald API - Change Processor, Broadcast Channel and Transport
//!
//! Hosts the write path (store write → cache invalidate → broadcast), the
//! process-wide broadcast channel, and the thin HTTP/WebSocket surface that
//! exposes them.

pub mod auth;
pub mod broadcast;
pub mod config;
pub mod error;
mod macros;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;
pub mod ws;

pub use auth::{Identity, Role, USER_ID_HEADER, USER_ROLE_HEADER};
pub use broadcast::{BroadcastChannel, PublishReport, Subscription};
pub use config::{CacheBackendKind, ServerConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_api_router;
pub use services::ChangeProcessor;
pub use state::AppState;
