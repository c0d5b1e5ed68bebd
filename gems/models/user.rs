use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{artisan::Artisan, auth::UserType};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub user_type: UserType,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EmailRequest {
    pub email: String,
}

/// Whoever a bearer token points at: a customer row or an artisan profile.
#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum AccountProfile {
    Artisan(Artisan),
    Customer(User),
}
