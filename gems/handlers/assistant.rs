use axum::{Json, extract::State};

use crate::{
    AppState,
    models::assistant::{ChatRequest, ChatResponse},
    services::assistant,
    utils::error::Result,
};

#[utoipa::path(
    post,
    path = "/api/v1/assistant/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Answer grounded in the knowledge base", body = ChatResponse),
        (status = 400, description = "Empty query"),
        (status = 502, description = "Embedding or generation provider failed")
    ),
    tag = "assistant"
)]
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    assistant::answer(&state.pool, &state.embedding_service, &state.gemini, request)
        .await
        .map(Json)
}
