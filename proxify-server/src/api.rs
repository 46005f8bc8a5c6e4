//! HTTP routes.
//!
//! Every route except `/health` requires a caller identity; `/admin/*`
//! additionally requires the moderator role.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use proxify_core::{ModerationError, NewReport, ReportId, ReportStatus};

use crate::identity::Caller;
use crate::AppState;

/// Error returned by a handler.
#[derive(Debug)]
pub enum ApiError {
    /// No usable `X-User-Id` header.
    Unauthenticated,
    /// Path segment that cannot name anything.
    BadRequest(String),
    /// Request body could not be decoded.
    InvalidBody(String),
    Moderation(ModerationError),
}

impl From<ModerationError> for ApiError {
    fn from(err: ModerationError) -> Self {
        ApiError::Moderation(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidBody(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Moderation(err) => match err {
                ModerationError::NotFound(_) => StatusCode::NOT_FOUND,
                ModerationError::AlreadyFinalized | ModerationError::DuplicateVote => {
                    StatusCode::CONFLICT
                }
                ModerationError::InvalidReport(_) => StatusCode::UNPROCESSABLE_ENTITY,
                ModerationError::Forbidden(_) => StatusCode::FORBIDDEN,
                ModerationError::TransactionConflict | ModerationError::StoreUnavailable(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            },
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Unauthenticated => "missing caller identity".to_string(),
            ApiError::BadRequest(msg) | ApiError::InvalidBody(msg) => msg.clone(),
            ApiError::Moderation(err) => err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.message() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn require_moderator(caller: &Caller) -> ApiResult<()> {
    if caller.is_moderator {
        Ok(())
    } else {
        Err(ModerationError::Forbidden("moderator role required").into())
    }
}

fn parse_report_id(raw: &str) -> ApiResult<ReportId> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid alert id '{}'", raw)))
}

fn parse_notification_id(raw: &str) -> ApiResult<Uuid> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid notification id '{}'", raw)))
}

// =============================================================================
// Request and response bodies
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ApprovedParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct MineParams {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationParams {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub vote: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub alert_id: ReportId,
    pub status: String,
    pub message: String,
}

// =============================================================================
// Handlers
// =============================================================================

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "proxify-moderation"
    }))
}

async fn create_alert(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    body: Result<Json<NewReport>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(new_report) = body.map_err(|e| ApiError::InvalidBody(e.body_text()))?;
    let report = state
        .lifecycle
        .create_report(&caller.user_id, new_report)
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

async fn list_alerts(
    State(state): State<Arc<AppState>>,
    _caller: Caller,
    Query(params): Query<ApprovedParams>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.lifecycle.list_approved(params.limit).await?))
}

async fn list_my_alerts(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(params): Query<MineParams>,
) -> ApiResult<impl IntoResponse> {
    let status = params
        .status
        .as_deref()
        .map(|raw| {
            raw.parse::<ReportStatus>()
                .map_err(|_| ApiError::BadRequest(format!("invalid status '{}'", raw)))
        })
        .transpose()?;
    Ok(Json(
        state
            .lifecycle
            .list_by_submitter(&caller.user_id, status)
            .await?,
    ))
}

async fn my_alert_stats(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.lifecycle.submitter_stats(&caller.user_id).await?))
}

async fn get_alert(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_report_id(&id)?;
    Ok(Json(state.lifecycle.get_report(&id, &caller).await?))
}

async fn list_pending_alerts(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> ApiResult<impl IntoResponse> {
    require_moderator(&caller)?;
    Ok(Json(state.lifecycle.list_pending().await?))
}

async fn review_alert(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
    body: Result<Json<ReviewRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    require_moderator(&caller)?;
    let id = parse_report_id(&id)?;
    let Json(request) = body.map_err(|e| ApiError::InvalidBody(e.body_text()))?;

    let receipt = state
        .lifecycle
        .submit_vote(&caller, id, request.vote)
        .await?;

    Ok(Json(ReviewResponse {
        alert_id: receipt.report_id,
        status: receipt.outcome.to_string(),
        message: receipt.message,
    }))
}

async fn alert_votes(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require_moderator(&caller)?;
    let id = parse_report_id(&id)?;
    Ok(Json(state.lifecycle.vote_details(&id).await?))
}

async fn mark_alert_ai_reviewed(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    require_moderator(&caller)?;
    let id = parse_report_id(&id)?;
    Ok(Json(state.lifecycle.mark_ai_reviewed(&id).await?))
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(params): Query<NotificationParams>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(
        state
            .notifications
            .list(&caller.user_id, params.unread_only)
            .await?,
    ))
}

async fn notification_count(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> ApiResult<impl IntoResponse> {
    let unread = state.notifications.unread_count(&caller.user_id).await?;
    Ok(Json(json!({ "unread": unread })))
}

async fn mark_notification_read(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_notification_id(&id)?;
    state.notifications.mark_read(&caller.user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn mark_all_notifications_read(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> ApiResult<impl IntoResponse> {
    let updated = state.notifications.mark_all_read(&caller.user_id).await?;
    Ok(Json(json!({ "updated": updated })))
}

async fn delete_notification(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_notification_id(&id)?;
    state.notifications.delete(&caller.user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// All routes, with state attached.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/alerts", post(create_alert).get(list_alerts))
        .route("/alerts/mine", get(list_my_alerts))
        .route("/alerts/mine/stats", get(my_alert_stats))
        .route("/alerts/:id", get(get_alert))
        .route("/admin/alerts/pending", get(list_pending_alerts))
        .route("/admin/alerts/:id/review", post(review_alert))
        .route("/admin/alerts/:id/votes", get(alert_votes))
        .route("/admin/alerts/:id/ai-reviewed", post(mark_alert_ai_reviewed))
        .route("/notifications", get(list_notifications))
        .route("/notifications/count", get(notification_count))
        .route("/notifications/mark-all-read", put(mark_all_notifications_read))
        .route("/notifications/:id/read", put(mark_notification_read))
        .route("/notifications/:id", delete(delete_notification))
        .with_state(state)
}
