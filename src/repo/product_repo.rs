use crate::db::DbPool;
use crate::models::Product;
use crate::schema::products;
use anyhow::Result;
use chrono::Utc;
use diesel::prelude::*;
use tracing::{debug, info, instrument};

/// Fields an admin may change on an existing product
#[derive(AsChangeset, Debug, Default, Clone)]
#[diesel(table_name = products)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub category: Option<String>,
    pub images: Option<crate::models::JsonValue>,
    pub printful_variant_id: Option<Option<i64>>,
    pub stock: Option<Option<i32>>,
    pub active: Option<bool>,
}

/// Inserts a new product
///
/// ### Arguments
///
/// * `pool` - A reference to the database connection pool
/// * `product` - The product to store
///
/// ### Returns
///
/// A Result containing the stored Product
///
/// ### Errors
///
/// Returns an error if the insert fails, including when the slug is taken
#[instrument(skip(pool, product), fields(slug = %product.get_slug()))]
pub fn create_product(pool: &DbPool, product: Product) -> Result<Product> {
    let conn = &mut pool.get()?;
    diesel::insert_into(products::table)
        .values(&product)
        .execute(conn)?;
    info!("Created product {}", product.get_id());
    Ok(product)
}

/// Retrieves a product by id, active or not
pub fn get_product(pool: &DbPool, product_id: &str) -> Result<Option<Product>> {
    let conn = &mut pool.get()?;
    let product = products::table
        .find(product_id)
        .first::<Product>(conn)
        .optional()?;
    Ok(product)
}

/// Retrieves an active product by its storefront slug
pub fn get_active_product_by_slug(pool: &DbPool, slug: &str) -> Result<Option<Product>> {
    let conn = &mut pool.get()?;
    let product = products::table
        .filter(products::slug.eq(slug))
        .filter(products::active.eq(true))
        .first::<Product>(conn)
        .optional()?;
    Ok(product)
}

/// Whether a product other than `except_id` already uses `slug`
pub fn slug_taken(pool: &DbPool, slug: &str, except_id: Option<&str>) -> Result<bool> {
    let conn = &mut pool.get()?;
    let mut query = products::table
        .filter(products::slug.eq(slug))
        .into_boxed();
    if let Some(id) = except_id {
        query = query.filter(products::id.ne(id));
    }
    let count: i64 = query.count().get_result(conn)?;
    Ok(count > 0)
}

/// Lists products
///
/// ### Arguments
///
/// * `pool` - A reference to the database connection pool
/// * `active_only` - Whether to hide soft-deleted products
/// * `category` - Optional category filter
#[instrument(skip(pool))]
pub fn list_products(pool: &DbPool, active_only: bool, category: Option<&str>) -> Result<Vec<Product>> {
    let conn = &mut pool.get()?;
    let mut query = products::table.into_boxed();
    if active_only {
        query = query.filter(products::active.eq(true));
    }
    if let Some(category) = category {
        query = query.filter(products::category.eq(category));
    }
    let result = query
        .order(products::name.asc())
        .load::<Product>(conn)?;
    debug!("Listed {} products", result.len());
    Ok(result)
}

/// Loads every product with an id in `ids`
pub fn get_products_by_ids(pool: &DbPool, ids: &[String]) -> Result<Vec<Product>> {
    let conn = &mut pool.get()?;
    let result = products::table
        .filter(products::id.eq_any(ids))
        .load::<Product>(conn)?;
    Ok(result)
}

/// Applies `changes` to a product and returns the updated row
pub fn update_product(pool: &DbPool, product_id: &str, changes: ProductChanges) -> Result<Option<Product>> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        let updated = diesel::update(products::table.find(product_id))
            .set((&changes, products::updated_at.eq(Utc::now().naive_utc())))
            .execute(conn)?;
        if updated == 0 {
            return Ok(None);
        }
        let product = products::table.find(product_id).first::<Product>(conn)?;
        info!("Updated product {}", product_id);
        Ok(Some(product))
    })
}

/// Soft-deletes a product by clearing its active flag
///
/// ### Returns
///
/// Whether a product with that id existed
pub fn deactivate_product(pool: &DbPool, product_id: &str) -> Result<bool> {
    let conn = &mut pool.get()?;
    let updated = diesel::update(products::table.find(product_id))
        .set((
            products::active.eq(false),
            products::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;
    if updated > 0 {
        info!("Deactivated product {}", product_id);
    }
    Ok(updated > 0)
}
