use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Artisan {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub shop_name: Option<String>,
    pub story: Option<String>,
    pub skills: Vec<String>,
    pub profile_photo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    pub user_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial profile update; absent fields are left alone.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ArtisanProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub shop_name: Option<String>,
    pub story: Option<String>,
    pub skills: Option<Vec<String>>,
    pub profile_photo: Option<String>,
    pub password: Option<String>,
}

impl ArtisanProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.phone.is_none()
            && self.location.is_none()
            && self.bio.is_none()
            && self.shop_name.is_none()
            && self.story.is_none()
            && self.skills.is_none()
            && self.profile_photo.is_none()
            && self.password.is_none()
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ArtisanFilter {
    pub skill: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CreateForUserQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct CreateForEmailQuery {
    pub email: String,
}
