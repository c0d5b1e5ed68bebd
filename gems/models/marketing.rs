use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct MarketingQuery {
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MarketingResponse {
    pub status: String,
    pub content: String,
    pub artisan_id: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StoryQuery {
    /// Artisan ID
    pub artisan_id: String,
    /// Additional info from artisan
    #[serde(default)]
    pub extra_info: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StoryResponse {
    pub status: String,
    pub story: String,
    pub artisan_id: String,
    pub original_context: String,
}

fn default_length() -> String {
    "medium".to_owned()
}

fn default_tone() -> String {
    "professional".to_owned()
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ProductDescriptionRequest {
    #[serde(default)]
    pub keywords: Vec<String>,
    pub product_name: Option<String>,
    pub craft_type: Option<String>,
    pub artisan_location: Option<String>,
    #[serde(default = "default_length")]
    pub target_length: String,
    #[serde(default = "default_tone")]
    pub tone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductDescriptionResponse {
    pub description: String,
    pub title: String,
    pub short_description: String,
    pub highlights: Vec<String>,
    pub generated_at: String,
    pub keywords_used: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkProductRequest {
    pub products: Vec<ProductDescriptionRequest>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum BulkItem {
    Generated(ProductDescriptionResponse),
    Failed { error: String, product_index: usize },
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkProductResponse {
    pub results: Vec<BulkItem>,
    pub success_count: usize,
    pub error_count: usize,
}

/// Multipart body accepted by the poster endpoint.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct PosterForm {
    #[schema(value_type = String, format = Binary)]
    pub image: Vec<u8>,
    pub product_name: Option<String>,
}
