use axum::{
    Json,
    extract::{Query, State},
};

use crate::{
    AppState,
    models::event::{Event, EventQuery, EventSearchResponse},
    services::events,
    utils::{
        database::parse_query_date,
        error::{ApiError, Result},
    },
};

#[utoipa::path(
    get,
    path = "/api/v1/events/find",
    params(EventQuery),
    responses(
        (status = 200, description = "Events near the location", body = EventSearchResponse),
        (status = 400, description = "Missing location or malformed date")
    ),
    tag = "events"
)]
pub async fn find_events(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
) -> Result<Json<EventSearchResponse>> {
    let location = query.location.trim();
    if location.is_empty() {
        return Err(ApiError::validation("location", "location is required"));
    }
    let date = query
        .date
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .map(parse_query_date)
        .transpose()?;

    let client = state.pool.get().await?;
    let results = events::find_events(&client, location, date, state.event_match_threshold).await?;

    Ok(Json(EventSearchResponse {
        count: results.len(),
        results,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/events/",
    responses(
        (status = 200, description = "Stored events, most recently scraped first", body = [Event])
    ),
    tag = "events"
)]
pub async fn list_events(State(state): State<AppState>) -> Result<Json<Vec<Event>>> {
    let client = state.pool.get().await?;
    events::list_events(&client).await.map(Json)
}
