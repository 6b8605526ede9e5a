//! Notification REST endpoints.
//!
//! Every handler is a thin shell over the change processor: extract the
//! acting user, call one processor operation, map the result.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use herald_core::{Notification, NotificationDraft, NotificationId};
use herald_storage::RecipientDirectory;
use serde::{Deserialize, Serialize};

use crate::auth::Identity;
use crate::error::ApiResult;
use crate::services::ChangeProcessor;
use crate::state::AppState;

/// Header reporting whether a snapshot came from the cache.
pub const CACHE_HEADER: &str = "x-cache";

/// Body of `PATCH /api/notifications/:id`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UpdateNotificationRequest {
    pub read: bool,
}

/// Response of `POST /api/notifications/send-to-all`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendToAllResponse {
    pub delivered: usize,
    pub notifications: Vec<Notification>,
}

/// GET /api/notifications
pub async fn list_notifications(
    State(processor): State<Arc<ChangeProcessor>>,
    identity: Identity,
) -> ApiResult<impl IntoResponse> {
    let read = processor.snapshot(identity.user_id).await?;
    let source = if read.was_cache_hit() { "hit" } else { "miss" };
    Ok(([(CACHE_HEADER, source)], Json(read.into_value())))
}

/// POST /api/notifications
pub async fn create_notification(
    State(processor): State<Arc<ChangeProcessor>>,
    identity: Identity,
    Json(draft): Json<NotificationDraft>,
) -> ApiResult<impl IntoResponse> {
    let notification = processor.create(identity.user_id, &draft).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

/// PATCH /api/notifications/:id
pub async fn update_notification(
    State(processor): State<Arc<ChangeProcessor>>,
    identity: Identity,
    Path(id): Path<NotificationId>,
    Json(req): Json<UpdateNotificationRequest>,
) -> ApiResult<Json<Notification>> {
    let notification = processor.set_read(id, identity.user_id, req.read).await?;
    Ok(Json(notification))
}

/// DELETE /api/notifications/:id
pub async fn delete_notification(
    State(processor): State<Arc<ChangeProcessor>>,
    identity: Identity,
    Path(id): Path<NotificationId>,
) -> ApiResult<StatusCode> {
    processor.delete(id, identity.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/notifications/send-to-all
pub async fn send_to_all(
    State(processor): State<Arc<ChangeProcessor>>,
    State(recipients): State<Arc<dyn RecipientDirectory>>,
    identity: Identity,
    Json(draft): Json<NotificationDraft>,
) -> ApiResult<impl IntoResponse> {
    identity.require_admin()?;
    let users = recipients
        .all_recipients()
        .await
        .map_err(herald_core::HeraldError::from)?;
    let notifications = processor.create_for_all(&users, &draft).await?;
    Ok((
        StatusCode::CREATED,
        Json(SendToAllResponse {
            delivered: notifications.len(),
            notifications,
        }),
    ))
}

/// Create the notification routes router.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications).post(create_notification))
        .route("/send-to-all", post(send_to_all))
        .route(
            "/:id",
            patch(update_notification).delete(delete_notification),
        )
}
