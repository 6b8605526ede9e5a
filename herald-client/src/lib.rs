//! Herald client: a reconciled, live view of one user's notifications.
//!
//! The client fetches a snapshot over REST, listens to the push feed over a
//! WebSocket, and merges the two in a [`ReconcilerSession`].

pub mod api_client;
pub mod config;
pub mod error;
pub mod realtime;
pub mod reconciler;
pub mod view;

pub use api_client::{RestClient, SnapshotSource, WsClient};
pub use config::{ClientConfig, ConfigError, ReconnectConfig};
pub use error::ClientError;
pub use reconciler::{FeedEvent, ReconcilerSession};
pub use view::{Applied, ClientView, ViewStatus};
