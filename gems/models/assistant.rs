use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

fn default_top_k() -> i64 {
    3
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RetrievedDocument {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub score: f64,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    pub query: String,
    pub retrieved: Vec<RetrievedDocument>,
    pub answer: String,
}
