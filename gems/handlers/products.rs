use axum::{
    Json,
    extract::{Path, State},
};

use crate::{
    AppState,
    models::{
        auth::StatusResponse,
        product::{Product, ProductCreate, ProductCreated, ProductUpdate},
    },
    services::{artisans, products},
    utils::error::Result,
};

#[utoipa::path(
    get,
    path = "/api/v1/artisans/{id}/products",
    params(("id" = String, Path, description = "Artisan row id or user_id")),
    responses(
        (status = 200, description = "Products listed by the artisan", body = [Product]),
        (status = 404, description = "Artisan not found")
    ),
    tag = "products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Product>>> {
    let client = state.pool.get().await?;
    let artisan = artisans::resolve(&client, &id).await?;
    products::list_for(&client, &artisan).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/api/v1/artisans/by-email/{email}/products",
    params(("email" = String, Path, description = "Artisan email")),
    responses(
        (status = 200, description = "Products listed by the artisan", body = [Product]),
        (status = 404, description = "Artisan not found")
    ),
    tag = "products"
)]
pub async fn list_products_by_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<Vec<Product>>> {
    let client = state.pool.get().await?;
    let artisan = artisans::get_by_email(&client, &email).await?;
    products::list_for(&client, &artisan).await.map(Json)
}

#[utoipa::path(
    post,
    path = "/api/v1/artisans/{id}/products",
    params(("id" = String, Path, description = "Artisan row id or user_id")),
    request_body = ProductCreate,
    responses(
        (status = 200, description = "Product added", body = ProductCreated),
        (status = 400, description = "Invalid product"),
        (status = 404, description = "Artisan not found")
    ),
    tag = "products"
)]
pub async fn add_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(product): Json<ProductCreate>,
) -> Result<Json<ProductCreated>> {
    products::validate_create(&product)?;
    let client = state.pool.get().await?;
    let artisan = artisans::resolve(&client, &id).await?;
    products::add_for(&client, &artisan, product).await.map(Json)
}

#[utoipa::path(
    post,
    path = "/api/v1/artisans/by-email/{email}/products",
    params(("email" = String, Path, description = "Artisan email")),
    request_body = ProductCreate,
    responses(
        (status = 200, description = "Product added", body = ProductCreated),
        (status = 400, description = "Invalid product"),
        (status = 404, description = "Artisan not found")
    ),
    tag = "products"
)]
pub async fn add_product_by_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Json(product): Json<ProductCreate>,
) -> Result<Json<ProductCreated>> {
    products::validate_create(&product)?;
    let client = state.pool.get().await?;
    let artisan = artisans::get_by_email(&client, &email).await?;
    products::add_for(&client, &artisan, product).await.map(Json)
}

#[utoipa::path(
    patch,
    path = "/api/v1/artisans/{id}/products/{product_id}",
    params(
        ("id" = String, Path, description = "Artisan row id or user_id"),
        ("product_id" = String, Path, description = "Product id")
    ),
    request_body = ProductUpdate,
    responses(
        (status = 200, description = "Product updated", body = StatusResponse),
        (status = 400, description = "Invalid update"),
        (status = 404, description = "Product not found")
    ),
    tag = "products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    Path((id, product_id)): Path<(String, String)>,
    Json(update): Json<ProductUpdate>,
) -> Result<Json<StatusResponse>> {
    products::validate_update(&update)?;
    let client = state.pool.get().await?;
    let artisan = artisans::resolve(&client, &id).await?;
    products::update_for(&client, &artisan, &product_id, update).await.map(Json)
}

#[utoipa::path(
    delete,
    path = "/api/v1/artisans/{id}/products/{product_id}",
    params(
        ("id" = String, Path, description = "Artisan row id or user_id"),
        ("product_id" = String, Path, description = "Product id")
    ),
    responses(
        (status = 200, description = "Product deleted", body = StatusResponse),
        (status = 404, description = "Product not found")
    ),
    tag = "products"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    Path((id, product_id)): Path<(String, String)>,
) -> Result<Json<StatusResponse>> {
    let client = state.pool.get().await?;
    let artisan = artisans::resolve(&client, &id).await?;
    products::delete_for(&client, &artisan, &product_id).await.map(Json)
}
