//! # Campaign Handlers
//!
//! Manual "send now" for a single campaign and an HTTP form of the periodic
//! scheduler trigger.

use axum::{
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dispatch::{DispatchError, DispatchReport};
use crate::error::ApiError;
use crate::scheduler::{SchedulerError, TickReport};
use crate::server::AppState;

/// Request body for a manual send
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    /// Replaces the campaign message for this dispatch when non-blank
    #[serde(default)]
    pub custom_message: Option<String>,
}

impl From<DispatchError> for ApiError {
    fn from(error: DispatchError) -> Self {
        match error {
            DispatchError::NotFound(id) => ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND".to_string(),
                format!("campaign {id} not found"),
            ),
            DispatchError::DeviceInactive(_) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "DEVICE_INACTIVE".to_string(),
                error.to_string(),
            ),
            DispatchError::NoRecipients(_) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "NO_RECIPIENTS".to_string(),
                error.to_string(),
            ),
            DispatchError::NotPending { status, .. } => ApiError::new(
                StatusCode::CONFLICT,
                "CAMPAIGN_NOT_PENDING".to_string(),
                error.to_string(),
            )
            .with_details(json!({ "status": status })),
            DispatchError::ClaimLost(_) => ApiError::new(
                StatusCode::CONFLICT,
                "CAMPAIGN_ALREADY_CLAIMED".to_string(),
                error.to_string(),
            ),
            DispatchError::GatewayMisconfigured(reason) => {
                tracing::error!(reason = %reason, "Messaging gateway is misconfigured");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "GATEWAY_MISCONFIGURED",
                    "Messaging gateway is not configured",
                )
            }
            DispatchError::Store(err) => err.into(),
            DispatchError::Aborted { id, reason } => ApiError::new(
                StatusCode::BAD_GATEWAY,
                "DISPATCH_ABORTED".to_string(),
                format!("dispatch of campaign {id} aborted; campaign marked failed"),
            )
            .with_details(json!({ "reason": reason })),
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(error: SchedulerError) -> Self {
        match error {
            SchedulerError::Snapshot(err) => err.into(),
            SchedulerError::GatewayMisconfigured(reason) => {
                DispatchError::GatewayMisconfigured(reason).into()
            }
        }
    }
}

/// Dispatch a pending campaign immediately
#[utoipa::path(
    post,
    path = "/campaigns/{id}/send-message",
    params(("id" = Uuid, Path, description = "Campaign identifier")),
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "Campaign dispatched", body = DispatchReport),
        (status = 400, description = "Device inactive, no recipients, or invalid request", body = ApiError),
        (status = 404, description = "Campaign not found", body = ApiError),
        (status = 409, description = "Campaign is not pending", body = ApiError),
        (status = 500, description = "Gateway not configured", body = ApiError),
        (status = 502, description = "Dispatch aborted after the campaign was claimed", body = ApiError)
    ),
    tag = "campaigns"
)]
pub async fn send_message(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<DispatchReport>, ApiError> {
    let Path(campaign_id) = id.map_err(|rejection| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED".to_string(),
            format!("invalid campaign id: {rejection}"),
        )
    })?;
    let Json(request) = payload?;

    let report = state
        .dispatcher
        .dispatch(campaign_id, request.custom_message)
        .await?;

    Ok(Json(report))
}

/// Dispatch every campaign that is due now
#[utoipa::path(
    post,
    path = "/campaigns/run-due",
    responses(
        (status = 200, description = "Due campaigns processed", body = TickReport),
        (status = 500, description = "Gateway not configured or storage failure", body = ApiError)
    ),
    tag = "campaigns"
)]
pub async fn run_due(State(state): State<AppState>) -> Result<Json<TickReport>, ApiError> {
    Ok(Json(state.scheduler.tick().await?))
}
