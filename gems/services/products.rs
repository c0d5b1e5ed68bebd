use deadpool_postgres::Client;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    models::{
        artisan::Artisan,
        auth::StatusResponse,
        product::{Product, ProductCreate, ProductCreated, ProductUpdate},
    },
    utils::{
        database::{PRODUCT_COLUMNS, QueryBuilder, map_product_row},
        error::{ApiError, Result},
    },
};

fn check_price(price: Option<f64>) -> Result<()> {
    match price {
        Some(p) if !p.is_finite() || p < 0.0 => {
            Err(ApiError::validation("price", "Price must be a non-negative number"))
        }
        _ => Ok(()),
    }
}

fn check_name(name: Option<&str>) -> Result<()> {
    match name {
        Some(n) if n.trim().is_empty() => Err(ApiError::validation("name", "Product name is required")),
        _ => Ok(()),
    }
}

/// Checked by the handlers before the artisan lookup so bad input never
/// reaches the database.
pub fn validate_create(product: &ProductCreate) -> Result<()> {
    check_name(Some(&product.name))?;
    check_price(product.price)
}

pub fn validate_update(update: &ProductUpdate) -> Result<()> {
    if update.is_empty() {
        return Err(ApiError::validation("body", "No update fields provided"));
    }
    check_name(update.name.as_deref())?;
    check_price(update.price)
}

fn parse_product_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id.trim()).map_err(|_| ApiError::validation("product_id", "Invalid product ID"))
}

pub async fn list_for(client: &Client, artisan: &Artisan) -> Result<Vec<Product>> {
    let query = format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE artisan_user_id = $1 ORDER BY created_at DESC"
    );
    let rows = client.query(&query, &[&artisan.user_id]).await?;
    Ok(rows.iter().map(map_product_row).collect())
}

#[instrument(skip(client, artisan, product), fields(artisan_user_id = %artisan.user_id))]
pub async fn add_for(client: &Client, artisan: &Artisan, product: ProductCreate) -> Result<ProductCreated> {
    let images = product.images.unwrap_or_default();
    let availability = product.availability.unwrap_or(true);
    let row = client
        .query_one(
            "INSERT INTO products
                (artisan_user_id, name, description, price, category, images, availability, product_link)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING id",
            &[
                &artisan.user_id,
                &product.name.trim(),
                &product.description,
                &product.price,
                &product.category,
                &images,
                &availability,
                &product.product_link,
            ],
        )
        .await?;

    let product_id: Uuid = row.get("id");
    info!(product_id = %product_id, "Product added");

    Ok(ProductCreated {
        status: "success".to_owned(),
        message: "Product added successfully".to_owned(),
        product_id,
    })
}

#[instrument(skip(client, artisan, update), fields(artisan_user_id = %artisan.user_id))]
pub async fn update_for(
    client: &Client,
    artisan: &Artisan,
    product_id: &str,
    update: ProductUpdate,
) -> Result<StatusResponse> {
    let product_id = parse_product_id(product_id)?;

    let mut qb = QueryBuilder::new();
    qb.set_if("name", update.name.map(|n| n.trim().to_owned()));
    qb.set_if("description", update.description);
    qb.set_if("price", update.price);
    qb.set_if("category", update.category);
    qb.set_if("images", update.images);
    qb.set_if("availability", update.availability);
    qb.set_if("product_link", update.product_link);
    qb.add_condition("id = ${}", product_id);
    qb.add_condition("artisan_user_id = ${}", artisan.user_id.clone());

    let query = format!(
        "UPDATE products {} {}",
        qb.build_set_clause(),
        qb.build_where_clause()
    );
    if client.execute(&query, &qb.params()).await? == 0 {
        return Err(ApiError::not_found("Product", product_id.to_string()));
    }

    Ok(StatusResponse::success("Product updated successfully"))
}

#[instrument(skip(client, artisan), fields(artisan_user_id = %artisan.user_id))]
pub async fn delete_for(client: &Client, artisan: &Artisan, product_id: &str) -> Result<StatusResponse> {
    let product_id = parse_product_id(product_id)?;

    let deleted = client
        .execute(
            "DELETE FROM products WHERE id = $1 AND artisan_user_id = $2",
            &[&product_id, &artisan.user_id],
        )
        .await?;
    if deleted == 0 {
        return Err(ApiError::not_found("Product", product_id.to_string()));
    }

    info!(product_id = %product_id, "Product deleted");
    Ok(StatusResponse::success("Product deleted successfully"))
}
