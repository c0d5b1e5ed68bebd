use axum::{Json, extract::State};
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthStatus {
    pub status: &'static str,
    pub db: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service and database status", body = HealthStatus)
    ),
    tag = "health"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    match common::database::ping(&state.pool).await {
        Ok(()) => Json(HealthStatus {
            status: "ok",
            db: "connected".to_owned(),
        }),
        Err(e) => {
            tracing::warn!("Health check failed: {e}");
            Json(HealthStatus {
                status: "error",
                db: e.to_string(),
            })
        }
    }
}
