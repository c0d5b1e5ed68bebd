use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub artisan_user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub images: Vec<String>,
    pub availability: bool,
    pub product_link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProductCreate {
    pub name: String,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub category: Option<String>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
    pub availability: Option<bool>,
    pub product_link: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub images: Option<Vec<String>>,
    pub availability: Option<bool>,
    pub product_link: Option<String>,
}

impl ProductUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.category.is_none()
            && self.images.is_none()
            && self.availability.is_none()
            && self.product_link.is_none()
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductCreated {
    pub status: String,
    pub message: String,
    pub product_id: Uuid,
}
