use axum::{Json, extract::State};

use crate::{
    AppState,
    middleware::AuthUser,
    models::{
        auth::{LoginRequest, SignupRequest, StatusResponse, TokenResponse},
        user::AccountProfile,
    },
    utils::error::Result,
};

#[utoipa::path(
    post,
    path = "/api/v1/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Account created", body = StatusResponse),
        (status = 400, description = "Invalid input or email already registered")
    ),
    tag = "auth"
)]
pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<Json<StatusResponse>> {
    state.auth.signup(&state.pool, request).await.map(Json)
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Access token issued", body = TokenResponse),
        (status = 401, description = "Invalid credentials")
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>> {
    state.auth.login(&state.pool, request).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Profile of the token holder", body = AccountProfile),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 404, description = "Account no longer exists")
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<AccountProfile>> {
    state.auth.current_user(&state.pool, &claims).await.map(Json)
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses(
        (status = 200, description = "Acknowledged; tokens are stateless", body = StatusResponse)
    ),
    tag = "auth"
)]
pub async fn logout() -> Json<StatusResponse> {
    Json(StatusResponse::success("Logged out"))
}
