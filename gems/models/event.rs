use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Event {
    pub id: Uuid,
    pub event_url: String,
    pub title: Option<String>,
    pub venue: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Every field scraped from the event page, keyed by its table heading.
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
    pub scraped_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EventQuery {
    /// Location to search for (fuzzy match)
    pub location: String,
    /// Date in YYYY-MM-DD format
    pub date: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EventSearchResponse {
    pub results: Vec<Event>,
    pub count: usize,
}
