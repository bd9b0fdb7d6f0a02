use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, Result};
#[allow(unused_imports)] // referenced only by name inside utoipa::path attributes
use crate::error::ErrorResponse;
use crate::store::ReturnRecord;
use crate::AppState;

/// Longest order id accepted, in characters.
pub const MAX_ORDER_ID_LEN: usize = 100;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateReturnRequest {
    pub order_id: String,
}

impl CreateReturnRequest {
    fn validate(&self) -> Result<()> {
        if self.order_id.trim().is_empty() {
            return Err(ApiError::BadRequest("orderId is required".to_string()));
        }
        if self.order_id.chars().count() > MAX_ORDER_ID_LEN {
            return Err(ApiError::BadRequest(format!(
                "orderId must be at most {} characters",
                MAX_ORDER_ID_LEN
            )));
        }
        Ok(())
    }
}

/// Submit a return request
#[utoipa::path(
    post,
    path = "/returns",
    tag = "returns",
    request_body = CreateReturnRequest,
    responses(
        (status = 201, description = "Return request stored", body = ReturnRecord),
        (status = 400, description = "Malformed or invalid payload", body = ErrorResponse),
        (status = 429, description = "Client exceeded its rate limit")
    )
)]
pub async fn create_return(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CreateReturnRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ReturnRecord>)> {
    let Json(payload) = payload.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "Rejected return request payload");
        ApiError::BadRequest(rejection.body_text())
    })?;

    payload.validate()?;

    let record = state.store.insert(payload.order_id).await;
    crate::metrics::record_return_created();
    info!(id = %record.id, order_id = %record.order_id, "Return request created");

    Ok((StatusCode::CREATED, Json(record)))
}

/// Fetch a return request by id
#[utoipa::path(
    get,
    path = "/returns/{id}",
    tag = "returns",
    params(("id" = String, Path, description = "Return request id")),
    responses(
        (status = 200, description = "Return request found", body = ReturnRecord),
        (status = 400, description = "Id is not a UUID", body = ErrorResponse),
        (status = 404, description = "No return request with this id", body = ErrorResponse),
        (status = 429, description = "Client exceeded its rate limit")
    )
)]
pub async fn get_return(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReturnRecord>> {
    let parsed = Uuid::parse_str(&id).map_err(|_| ApiError::InvalidId(id.clone()))?;

    state
        .store
        .get(&parsed)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound(id))
}
