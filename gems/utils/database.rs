use chrono::{DateTime, NaiveDate};
use tokio_postgres::{types::ToSql, Row};

use super::error::{ApiError, Result};
use crate::models::{
    artisan::Artisan,
    auth::UserType,
    event::Event,
    product::Product,
    user::User,
};

pub const ARTISAN_COLUMNS: &str = "id, user_id, name, email, phone, location, bio, shop_name, story, \
     skills, profile_photo, contact_email, user_type, created_at, updated_at";
pub const USER_COLUMNS: &str = "id, username, email, user_type, phone, created_at, updated_at";
pub const PRODUCT_COLUMNS: &str = "id, artisan_user_id, name, description, price, category, images, \
     availability, product_link, created_at, updated_at";
pub const EVENT_COLUMNS: &str = "id, event_url, title, venue, start_date, end_date, details, scraped_at";

/// Accepts `YYYY-MM-DD` or a full ISO 8601 timestamp and keeps only the date.
pub fn parse_query_date(date_str: &str) -> Result<NaiveDate> {
    let trimmed = date_str.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.date_naive());
    }
    chrono::NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
        .map(|dt| dt.date())
        .map_err(|_| ApiError::validation("date", "Invalid date format. Use YYYY-MM-DD."))
}

/// Wraps user input for a case-insensitive substring `ILIKE`, escaping the
/// pattern metacharacters so they match literally.
pub fn like_pattern(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len() + 2);
    escaped.push('%');
    for c in input.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Collects positional parameters for dynamically assembled statements:
/// `WHERE` conditions and `SET` assignments share one numbering.
pub struct QueryBuilder {
    conditions: Vec<String>,
    assignments: Vec<String>,
    params: Vec<Box<dyn ToSql + Send + Sync>>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self {
            conditions: Vec::new(),
            assignments: Vec::new(),
            params: Vec::new(),
        }
    }

    fn bind<T: ToSql + Send + Sync + 'static>(&mut self, template: &str, value: T) -> String {
        self.params.push(Box::new(value));
        template.replace("{}", &self.params.len().to_string())
    }

    pub fn add_condition<T: ToSql + Send + Sync + 'static>(&mut self, condition: &str, value: T) {
        let bound = self.bind(condition, value);
        self.conditions.push(bound);
    }

    pub fn set<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, value: T) {
        let bound = self.bind(&format!("{column} = ${{}}"), value);
        self.assignments.push(bound);
    }

    pub fn set_if<T: ToSql + Send + Sync + 'static>(&mut self, column: &str, value: Option<T>) {
        if let Some(value) = value {
            self.set(column, value);
        }
    }

    pub fn has_assignments(&self) -> bool {
        !self.assignments.is_empty()
    }

    pub fn build_where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn build_set_clause(&self) -> String {
        let mut assignments = self.assignments.clone();
        assignments.push("updated_at = NOW()".to_owned());
        format!("SET {}", assignments.join(", "))
    }

    pub fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(|p| p.as_ref() as &(dyn ToSql + Sync)).collect()
    }
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn map_artisan_row(row: &Row) -> Artisan {
    Artisan {
        id: row.get("id"),
        user_id: row.get("user_id"),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        location: row.get("location"),
        bio: row.get("bio"),
        shop_name: row.get("shop_name"),
        story: row.get("story"),
        skills: row.get("skills"),
        profile_photo: row.get("profile_photo"),
        contact_email: row.get("contact_email"),
        user_type: row.get("user_type"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub fn map_user_row(row: &Row) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        user_type: UserType::from_db(row.get("user_type")),
        phone: row.get("phone"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub fn map_product_row(row: &Row) -> Product {
    Product {
        id: row.get("id"),
        artisan_user_id: row.get("artisan_user_id"),
        name: row.get("name"),
        description: row.get("description"),
        price: row.get("price"),
        category: row.get("category"),
        images: row.get("images"),
        availability: row.get("availability"),
        product_link: row.get("product_link"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

pub fn map_event_row(row: &Row) -> Event {
    Event {
        id: row.get("id"),
        event_url: row.get("event_url"),
        title: row.get("title"),
        venue: row.get("venue"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        details: row.get("details"),
        scraped_at: row.get("scraped_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_date_accepts_plain_and_iso_forms() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(parse_query_date("2024-03-09").unwrap(), expected);
        assert_eq!(parse_query_date("2024-03-09T10:30:00").unwrap(), expected);
        assert_eq!(parse_query_date("2024-03-09T10:30:00+05:30").unwrap(), expected);
    }

    #[test]
    fn query_date_rejects_other_formats() {
        let err = parse_query_date("09/03/2024").unwrap_err();
        assert!(matches!(err, ApiError::Validation { message, .. } if message == "Invalid date format. Use YYYY-MM-DD."));
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern(" pottery "), "%pottery%");
        assert_eq!(like_pattern("100%_cotton"), "%100\\%\\_cotton%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn conditions_and_assignments_share_numbering() {
        let mut qb = QueryBuilder::new();
        qb.set("name", "Meera".to_string());
        qb.set_if::<String>("bio", None);
        qb.set_if("location", Some("Jaipur".to_string()));
        qb.add_condition("id = ${}", 7_i64);

        assert!(qb.has_assignments());
        assert_eq!(qb.build_set_clause(), "SET name = $1, location = $2, updated_at = NOW()");
        assert_eq!(qb.build_where_clause(), "WHERE id = $3");
        assert_eq!(qb.params().len(), 3);
    }

    #[test]
    fn empty_builder_has_no_where_clause() {
        let qb = QueryBuilder::default();
        assert!(qb.build_where_clause().is_empty());
        assert!(!qb.has_assignments());
    }
}
