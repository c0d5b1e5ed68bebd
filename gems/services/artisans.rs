use deadpool_postgres::Client;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    models::{
        artisan::{Artisan, ArtisanFilter, ArtisanProfileUpdate},
        auth::StatusResponse,
    },
    services::auth::hash_password,
    utils::{
        database::{ARTISAN_COLUMNS, QueryBuilder, like_pattern, map_artisan_row},
        error::{ApiError, Result},
    },
};

const DEFAULT_BIO: &str = "Welcome to my artisan profile!";
const DEFAULT_SKILL: &str = "Traditional Crafts";
const DEFAULT_LOCATION: &str = "India";

fn parse_artisan_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id.trim()).map_err(|_| ApiError::validation("artisan_id", "Invalid artisan ID"))
}

/// Looks an artisan up by row id or by `user_id`; both forms are accepted
/// wherever an artisan appears in a path.
pub async fn resolve(client: &Client, id: &str) -> Result<Artisan> {
    let row_id = parse_artisan_id(id)?;
    let user_id = row_id.to_string();

    let query = format!(
        "SELECT {ARTISAN_COLUMNS} FROM artisans WHERE id = $1 OR user_id = $2 \
         ORDER BY (id = $1) DESC LIMIT 1"
    );
    client
        .query_opt(&query, &[&row_id, &user_id])
        .await?
        .map(|row| map_artisan_row(&row))
        .ok_or_else(|| ApiError::not_found("Artisan", id))
}

pub async fn find_by_email(client: &Client, email: &str) -> Result<Option<Artisan>> {
    let query = format!("SELECT {ARTISAN_COLUMNS} FROM artisans WHERE email = $1");
    let row = client.query_opt(&query, &[&email.trim()]).await?;
    Ok(row.map(|row| map_artisan_row(&row)))
}

pub async fn get_by_email(client: &Client, email: &str) -> Result<Artisan> {
    find_by_email(client, email)
        .await?
        .ok_or_else(|| ApiError::not_found("Artisan", email))
}

#[instrument(skip(client))]
pub async fn search(client: &Client, filter: &ArtisanFilter) -> Result<Vec<Artisan>> {
    let mut qb = QueryBuilder::new();

    if let Some(skill) = filter.skill.as_deref().filter(|s| !s.trim().is_empty()) {
        qb.add_condition(
            "EXISTS (SELECT 1 FROM unnest(skills) AS skill WHERE skill ILIKE ${})",
            like_pattern(skill),
        );
    }
    if let Some(location) = filter.location.as_deref().filter(|l| !l.trim().is_empty()) {
        qb.add_condition("location ILIKE ${}", like_pattern(location));
    }

    let query = format!(
        "SELECT {ARTISAN_COLUMNS} FROM artisans {} ORDER BY created_at DESC",
        qb.build_where_clause()
    );
    let statement = client.prepare(&query).await?;
    let rows = client.query(&statement, &qb.params()).await?;

    Ok(rows.iter().map(map_artisan_row).collect())
}

struct CustomerAccount {
    id: Uuid,
    username: String,
    email: String,
    phone: Option<String>,
}

async fn insert_default_profile(client: &Client, customer: CustomerAccount) -> Result<Artisan> {
    let user_id = customer.id.to_string();
    let skills = vec![DEFAULT_SKILL.to_owned()];

    let query = format!(
        "INSERT INTO artisans (user_id, name, email, phone, bio, skills, location, contact_email)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $3)
         RETURNING {ARTISAN_COLUMNS}"
    );
    let row = client
        .query_one(
            &query,
            &[
                &user_id,
                &customer.username,
                &customer.email,
                &customer.phone,
                &DEFAULT_BIO,
                &skills,
                &DEFAULT_LOCATION,
            ],
        )
        .await?;

    info!(user_id = %user_id, "Created default artisan profile");
    Ok(map_artisan_row(&row))
}

fn customer_from_row(row: &tokio_postgres::Row) -> CustomerAccount {
    CustomerAccount {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        phone: row.get("phone"),
    }
}

/// Returns the artisan profile for a customer account, creating a default one
/// on first use.
#[instrument(skip(client))]
pub async fn create_for_user(client: &Client, user_id: &str) -> Result<Artisan> {
    let query = format!("SELECT {ARTISAN_COLUMNS} FROM artisans WHERE user_id = $1");
    if let Some(row) = client.query_opt(&query, &[&user_id.trim()]).await? {
        return Ok(map_artisan_row(&row));
    }

    let id = Uuid::parse_str(user_id.trim())
        .map_err(|_| ApiError::validation("user_id", "Invalid user ID"))?;
    let customer = client
        .query_opt(
            "SELECT id, username, email, phone FROM users WHERE id = $1",
            &[&id],
        )
        .await?
        .map(|row| customer_from_row(&row))
        .ok_or_else(|| ApiError::not_found("User", user_id))?;

    insert_default_profile(client, customer).await
}

#[instrument(skip(client))]
pub async fn create_for_email(client: &Client, email: &str) -> Result<Artisan> {
    if let Some(existing) = find_by_email(client, email).await? {
        return Ok(existing);
    }

    let customer = client
        .query_opt(
            "SELECT id, username, email, phone FROM users WHERE email = $1",
            &[&email.trim()],
        )
        .await?
        .map(|row| customer_from_row(&row))
        .ok_or_else(|| ApiError::not_found("User", email))?;

    insert_default_profile(client, customer).await
}

#[instrument(skip(client, update))]
pub async fn update_profile(
    client: &Client,
    id: &str,
    update: ArtisanProfileUpdate,
) -> Result<StatusResponse> {
    if update.is_empty() {
        return Err(ApiError::validation("body", "No update fields provided"));
    }

    let artisan = resolve(client, id).await?;

    let password_hash = match update.password.as_deref() {
        Some(password) if password.is_empty() => {
            return Err(ApiError::validation("password", "Password must not be empty"));
        }
        Some(password) => Some(hash_password(password).await?),
        None => None,
    };

    let mut qb = QueryBuilder::new();
    qb.set_if("name", update.name);
    qb.set_if("phone", update.phone);
    qb.set_if("location", update.location);
    qb.set_if("bio", update.bio);
    qb.set_if("shop_name", update.shop_name);
    qb.set_if("story", update.story);
    qb.set_if("skills", update.skills);
    qb.set_if("profile_photo", update.profile_photo);
    qb.set_if("password_hash", password_hash);
    qb.add_condition("id = ${}", artisan.id);

    let query = format!(
        "UPDATE artisans {} {}",
        qb.build_set_clause(),
        qb.build_where_clause()
    );
    let updated = client.execute(&query, &qb.params()).await?;
    if updated == 0 {
        return Err(ApiError::not_found("Artisan", id));
    }

    info!(artisan_id = %artisan.id, "Artisan profile updated");
    Ok(StatusResponse::success("Profile updated successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artisan_ids_must_be_uuids() {
        assert!(parse_artisan_id("2f6d1c8e-7f57-4a8e-9a7e-5f0c2b1d9e10").is_ok());
        assert!(parse_artisan_id(" 2f6d1c8e-7f57-4a8e-9a7e-5f0c2b1d9e10 ").is_ok());

        let err = parse_artisan_id("64f1b2c3d4e5f6a7b8c9d0e1").unwrap_err();
        assert!(matches!(err, ApiError::Validation { message, .. } if message == "Invalid artisan ID"));
    }
}
