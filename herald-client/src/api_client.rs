//! REST and WebSocket clients for the Herald API.

use async_trait::async_trait;
use herald_api::{ApiError, USER_ID_HEADER};
use herald_core::{Notification, NotificationDraft, NotificationId, Snapshot, UserId};
use serde::Serialize;
use std::time::Duration;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::{ClientConfig, ReconnectConfig};
use crate::error::ClientError;
use crate::view::ClientView;

pub type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Where a reconciler gets its initial snapshot from.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<Snapshot, ClientError>;
}

#[derive(Debug, Serialize)]
struct SetReadBody {
    read: bool,
}

#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    user_id: UserId,
}

impl RestClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            user_id: config.user_id,
        })
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub async fn list(&self) -> Result<Snapshot, ClientError> {
        let response = self.request(reqwest::Method::GET, "/api/notifications").send().await?;
        parse_response(response).await
    }

    pub async fn create(&self, draft: &NotificationDraft) -> Result<Notification, ClientError> {
        let response = self
            .request(reqwest::Method::POST, "/api/notifications")
            .json(draft)
            .send()
            .await?;
        parse_response(response).await
    }

    pub async fn set_read(&self, id: NotificationId, read: bool) -> Result<Notification, ClientError> {
        let path = format!("/api/notifications/{}", id);
        let response = self
            .request(reqwest::Method::PATCH, &path)
            .json(&SetReadBody { read })
            .send()
            .await?;
        parse_response(response).await
    }

    /// Flip the read flag of a notification currently shown in `view`.
    pub async fn toggle_read(
        &self,
        view: &ClientView,
        id: NotificationId,
    ) -> Result<Notification, ClientError> {
        let read = view.toggled_read(id).ok_or(ClientError::NotInView { id })?;
        self.set_read(id, read).await
    }

    pub async fn delete(&self, id: NotificationId) -> Result<(), ClientError> {
        let path = format!("/api/notifications/{}", id);
        let response = self.request(reqwest::Method::DELETE, &path).send().await?;
        if response.status().is_success() {
            return Ok(());
        }
        Err(error_from_response(response).await)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header(USER_ID_HEADER, self.user_id.to_string())
    }
}

#[async_trait]
impl SnapshotSource for RestClient {
    async fn fetch_snapshot(&self) -> Result<Snapshot, ClientError> {
        self.list().await
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ClientError> {
    if response.status().is_success() {
        Ok(response.json::<T>().await?)
    } else {
        Err(error_from_response(response).await)
    }
}

async fn error_from_response(response: reqwest::Response) -> ClientError {
    let status = response.status();
    let text = match response.text().await {
        Ok(text) => text,
        Err(err) => return ClientError::Http(err),
    };
    match serde_json::from_str::<ApiError>(&text) {
        Ok(api_error) => ClientError::Api {
            code: api_error.code,
            message: api_error.message,
        },
        Err(_) => ClientError::InvalidResponse(format!("HTTP {}: {}", status.as_u16(), text)),
    }
}

#[derive(Clone)]
pub struct WsClient {
    endpoint: String,
    user_id: UserId,
    reconnect: ReconnectConfig,
    connect_timeout: Duration,
}

impl WsClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            endpoint: config.ws_endpoint.clone(),
            user_id: config.user_id,
            reconnect: config.reconnect.clone(),
            connect_timeout: config.request_timeout(),
        }
    }

    pub async fn connect(&self) -> Result<WsStream, ClientError> {
        let mut request = self.endpoint.as_str().into_client_request()?;
        let user = HeaderValue::from_str(&self.user_id.to_string())
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
        request.headers_mut().insert(USER_ID_HEADER, user);

        let connect = tokio_tungstenite::connect_async(request);
        let (stream, _) = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| ClientError::Timeout {
                after_ms: self.connect_timeout.as_millis() as u64,
            })??;
        Ok(stream)
    }

    pub fn reconnect_config(&self) -> &ReconnectConfig {
        &self.reconnect
    }
}
