use axum::{Json, extract::State};

use crate::{
    AppState,
    models::user::{EmailRequest, User},
    utils::{
        database::{USER_COLUMNS, map_user_row},
        error::{ApiError, Result},
    },
};

#[utoipa::path(
    post,
    path = "/api/v1/users/me",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Customer profile", body = User),
        (status = 404, description = "User not found")
    ),
    tag = "users"
)]
pub async fn get_user_by_email(
    State(state): State<AppState>,
    Json(request): Json<EmailRequest>,
) -> Result<Json<User>> {
    let email = request.email.trim();
    if email.is_empty() {
        return Err(ApiError::validation("email", "Email is required"));
    }

    let client = state.pool.get().await?;
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
    let row = client
        .query_opt(&query, &[&email])
        .await?
        .ok_or_else(|| ApiError::not_found("User", email))?;

    Ok(Json(map_user_row(&row)))
}
