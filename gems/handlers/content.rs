use axum::{
    Json,
    body::Bytes,
    extract::{FromRequest, Multipart, Path, Query, Request, State, multipart::Field},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use utoipa::ToSchema;

use common::services::gemini::InlineImage;

use crate::{
    AppState,
    models::marketing::{
        BulkProductRequest, BulkProductResponse, MarketingQuery, MarketingResponse, PosterForm,
        ProductDescriptionRequest, ProductDescriptionResponse, StoryQuery, StoryResponse,
    },
    services::{artisans, content},
    utils::error::{ApiError, Result},
};

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct MarketingBody {
    pub prompt: Option<String>,
}

fn bad_body(message: impl Into<String>) -> ApiError {
    ApiError::validation("body", message)
}

/// Reads an uploaded file field, insisting on an `image/*` content type.
async fn read_image(field: Field<'_>) -> Result<Option<InlineImage>> {
    let mime_type = field.content_type().unwrap_or_default().to_owned();
    if !mime_type.starts_with("image/") {
        return Err(ApiError::validation("image", "File must be an image."));
    }
    let bytes = field.bytes().await.map_err(|e| bad_body(e.body_text()))?;
    if bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(InlineImage {
        mime_type,
        bytes: bytes.to_vec(),
    }))
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"))
}

#[utoipa::path(
    post,
    path = "/api/v1/artisans/{id}/marketing",
    params(
        ("id" = String, Path, description = "Artisan id echoed back in the response"),
        MarketingQuery
    ),
    request_body(content = MarketingBody, description = "JSON body, or multipart with `prompt` and an optional `image` file"),
    responses(
        (status = 200, description = "Marketing statement", body = MarketingResponse),
        (status = 400, description = "No prompt or image, or a non-image upload"),
        (status = 502, description = "Generation provider failed")
    ),
    tag = "marketing"
)]
pub async fn generate_marketing(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<MarketingQuery>,
    request: Request,
) -> Result<Json<MarketingResponse>> {
    let mut prompt = query.prompt.unwrap_or_default();
    let mut image = None;

    if is_multipart(&request) {
        let mut multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| bad_body(e.body_text()))?;
        while let Some(field) = multipart.next_field().await.map_err(|e| bad_body(e.body_text()))? {
            let name = field.name().unwrap_or_default().to_owned();
            match name.as_str() {
                "prompt" => {
                    let text = field.text().await.map_err(|e| bad_body(e.body_text()))?;
                    if !text.trim().is_empty() {
                        prompt = text;
                    }
                }
                "image" => image = read_image(field).await?,
                _ => {}
            }
        }
    } else {
        let bytes = Bytes::from_request(request, &state)
            .await
            .map_err(|e| bad_body(e.body_text()))?;
        if !bytes.iter().all(u8::is_ascii_whitespace) {
            let body: MarketingBody = serde_json::from_slice(&bytes)
                .map_err(|e| bad_body(format!("Invalid JSON body: {e}")))?;
            if let Some(text) = body.prompt.filter(|p| !p.trim().is_empty()) {
                prompt = text;
            }
        }
    }

    content::generate_marketing(&state.gemini, &id, &prompt, image)
        .await
        .map(Json)
}

#[utoipa::path(
    get,
    path = "/api/v1/generate-story",
    params(StoryQuery),
    responses(
        (status = 200, description = "Rewritten artisan story", body = StoryResponse),
        (status = 400, description = "Missing or invalid artisan ID"),
        (status = 404, description = "Artisan not found")
    ),
    tag = "marketing"
)]
pub async fn generate_story(
    State(state): State<AppState>,
    Query(query): Query<StoryQuery>,
) -> Result<Json<StoryResponse>> {
    let artisan_id = query.artisan_id.trim();
    if artisan_id.is_empty() {
        return Err(ApiError::validation("artisan_id", "artisan_id is required"));
    }

    let artisan = {
        let client = state.pool.get().await?;
        artisans::resolve(&client, artisan_id).await?
    };

    content::generate_story(&state.gemini, artisan_id, &artisan, &query.extra_info)
        .await
        .map(Json)
}

#[utoipa::path(
    post,
    path = "/api/v1/product-description/generate",
    request_body = ProductDescriptionRequest,
    responses(
        (status = 200, description = "Generated product copy", body = ProductDescriptionResponse),
        (status = 400, description = "No keywords given"),
        (status = 502, description = "Generation provider failed")
    ),
    tag = "product-description"
)]
pub async fn generate_description(
    State(state): State<AppState>,
    Json(request): Json<ProductDescriptionRequest>,
) -> Result<Json<ProductDescriptionResponse>> {
    content::describe_product(&state.groq, &request).await.map(Json)
}

#[utoipa::path(
    post,
    path = "/api/v1/product-description/bulk",
    request_body = BulkProductRequest,
    responses(
        (status = 200, description = "Per-product results in request order", body = BulkProductResponse),
        (status = 400, description = "No products given")
    ),
    tag = "product-description"
)]
pub async fn generate_bulk_descriptions(
    State(state): State<AppState>,
    Json(request): Json<BulkProductRequest>,
) -> Result<Json<BulkProductResponse>> {
    content::describe_products(&state.groq, &request.products, content::BULK_BATCH_PAUSE)
        .await
        .map(Json)
}

#[utoipa::path(
    post,
    path = "/api/v1/poster/generate",
    request_body(content = PosterForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Poster image as an attachment"),
        (status = 400, description = "Missing image or not an image"),
        (status = 502, description = "Generation provider failed")
    ),
    tag = "marketing"
)]
pub async fn generate_poster(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response> {
    let mut image = None;
    let mut product_name = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| bad_body(e.body_text()))? {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "image" => {
                image = Some(
                    read_image(field)
                        .await?
                        .ok_or_else(|| ApiError::validation("image", "Image file is empty"))?,
                );
            }
            "product_name" => {
                product_name = Some(field.text().await.map_err(|e| bad_body(e.body_text()))?);
            }
            _ => {}
        }
    }

    let image = image.ok_or_else(|| ApiError::validation("image", "An image file is required"))?;
    let poster = content::generate_poster(&state.gemini, image, product_name.as_deref()).await?;

    let disposition = format!("attachment; filename=poster.{}", poster.extension());
    Ok((
        [
            (header::CONTENT_TYPE, poster.mime_type.clone()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        poster.bytes,
    )
        .into_response())
}
