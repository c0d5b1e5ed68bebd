use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::{
    AppState,
    models::{
        artisan::{Artisan, ArtisanFilter, ArtisanProfileUpdate, CreateForEmailQuery, CreateForUserQuery},
        auth::StatusResponse,
    },
    services::artisans,
    utils::error::{ApiError, Result},
};

#[utoipa::path(
    get,
    path = "/api/v1/artisans/",
    params(ArtisanFilter),
    responses(
        (status = 200, description = "Artisans matching the optional filters", body = [Artisan])
    ),
    tag = "artisans"
)]
pub async fn list_artisans(
    State(state): State<AppState>,
    Query(filter): Query<ArtisanFilter>,
) -> Result<Json<Vec<Artisan>>> {
    let client = state.pool.get().await?;
    artisans::search(&client, &filter).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/api/v1/artisans/skill/{skill}",
    params(("skill" = String, Path, description = "Skill substring, case-insensitive")),
    responses(
        (status = 200, description = "Artisans with a matching skill", body = [Artisan])
    ),
    tag = "artisans"
)]
pub async fn artisans_by_skill(
    State(state): State<AppState>,
    Path(skill): Path<String>,
) -> Result<Json<Vec<Artisan>>> {
    let filter = ArtisanFilter {
        skill: Some(skill),
        ..ArtisanFilter::default()
    };
    let client = state.pool.get().await?;
    artisans::search(&client, &filter).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/api/v1/artisans/location/{location}",
    params(("location" = String, Path, description = "Location substring, case-insensitive")),
    responses(
        (status = 200, description = "Artisans in a matching location", body = [Artisan])
    ),
    tag = "artisans"
)]
pub async fn artisans_by_location(
    State(state): State<AppState>,
    Path(location): Path<String>,
) -> Result<Json<Vec<Artisan>>> {
    let filter = ArtisanFilter {
        location: Some(location),
        ..ArtisanFilter::default()
    };
    let client = state.pool.get().await?;
    artisans::search(&client, &filter).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/api/v1/artisans/{id}",
    params(("id" = String, Path, description = "Artisan row id or user_id")),
    responses(
        (status = 200, description = "Artisan profile", body = Artisan),
        (status = 400, description = "Invalid artisan ID"),
        (status = 404, description = "Artisan not found")
    ),
    tag = "artisans"
)]
pub async fn get_artisan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Artisan>> {
    let client = state.pool.get().await?;
    artisans::resolve(&client, &id).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/api/v1/artisans/by-email/{email}",
    params(("email" = String, Path, description = "Artisan email")),
    responses(
        (status = 200, description = "Artisan profile", body = Artisan),
        (status = 404, description = "Artisan not found")
    ),
    tag = "artisans"
)]
pub async fn get_artisan_by_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<Artisan>> {
    let client = state.pool.get().await?;
    artisans::get_by_email(&client, &email).await.map(Json)
}

#[utoipa::path(
    post,
    path = "/api/v1/artisans/create",
    params(CreateForUserQuery),
    responses(
        (status = 200, description = "Existing or newly created artisan profile", body = Artisan),
        (status = 404, description = "User not found")
    ),
    tag = "artisans"
)]
pub async fn create_artisan(
    State(state): State<AppState>,
    Query(query): Query<CreateForUserQuery>,
) -> Result<Json<Artisan>> {
    if query.user_id.trim().is_empty() {
        return Err(ApiError::validation("user_id", "user_id is required"));
    }
    let client = state.pool.get().await?;
    artisans::create_for_user(&client, &query.user_id).await.map(Json)
}

#[utoipa::path(
    post,
    path = "/api/v1/artisans/create-by-email",
    params(CreateForEmailQuery),
    responses(
        (status = 200, description = "Existing or newly created artisan profile", body = Artisan),
        (status = 404, description = "User not found")
    ),
    tag = "artisans"
)]
pub async fn create_artisan_by_email(
    State(state): State<AppState>,
    Query(query): Query<CreateForEmailQuery>,
) -> Result<Json<Artisan>> {
    if query.email.trim().is_empty() {
        return Err(ApiError::validation("email", "email is required"));
    }
    let client = state.pool.get().await?;
    artisans::create_for_email(&client, &query.email).await.map(Json)
}

/// Serves both `PATCH /artisans/{id}` and `PATCH /artisans/{id}/profile`.
#[utoipa::path(
    patch,
    path = "/api/v1/artisans/{id}",
    params(("id" = String, Path, description = "Artisan row id or user_id")),
    request_body = ArtisanProfileUpdate,
    responses(
        (status = 200, description = "Profile updated", body = StatusResponse),
        (status = 400, description = "Invalid artisan ID or empty update"),
        (status = 404, description = "Artisan not found")
    ),
    tag = "artisans"
)]
pub async fn update_artisan(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<ArtisanProfileUpdate>,
) -> Result<Json<StatusResponse>> {
    if update.is_empty() {
        return Err(ApiError::validation("body", "No update fields provided"));
    }
    let client = state.pool.get().await?;
    artisans::update_profile(&client, &id, update).await.map(Json)
}
