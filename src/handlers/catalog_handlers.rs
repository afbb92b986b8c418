use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::dto::{CreateProductDto, ProductQuery, UpdateProductDto};
use crate::errors::ApiError;
use crate::models::{slugify, Fulfillment, JsonValue, Product};
use crate::repo::{self, ProductChanges};
use crate::state::AppState;

/// Picks the slug for a product and makes sure no other product holds it
fn claim_slug(state: &AppState, requested: Option<&str>, name: &str, except_id: Option<&str>) -> Result<String, ApiError> {
    let slug = slugify(requested.filter(|s| !s.trim().is_empty()).unwrap_or(name));
    if slug.is_empty() {
        return Err(ApiError::BadRequest("slug must contain letters or digits".to_string()));
    }
    if repo::slug_taken(&state.pool, &slug, except_id).map_err(ApiError::Database)? {
        return Err(ApiError::Conflict(format!("Slug {} is already taken", slug)));
    }
    Ok(slug)
}

/// Handler for the public product listing
///
/// This function handles GET requests to `/api/products`.
///
/// ### Arguments
///
/// * `state` - The shared application state
/// * `query` - Optional `category` filter
///
/// ### Returns
///
/// Every active product, newest first
#[instrument(skip(state))]
pub async fn list_products_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let products = repo::list_products(&state.pool, true, query.category.as_deref())
        .map_err(ApiError::Database)?;
    debug!("Listing {} products", products.len());
    Ok(Json(products))
}

/// Handler for a single storefront product
///
/// This function handles GET requests to `/api/products/{slug}`. Inactive
/// products are not found.
#[instrument(skip(state))]
pub async fn get_product_handler(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let product = repo::get_active_product_by_slug(&state.pool, &slug)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Product"))?;
    Ok(Json(product))
}

/// Handler for the admin product listing, inactive products included
///
/// This function handles GET requests to `/api/admin/products`.
#[instrument(skip(state))]
pub async fn admin_list_products_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let products = repo::list_products(&state.pool, false, query.category.as_deref())
        .map_err(ApiError::Database)?;
    Ok(Json(products))
}

/// Handler for creating a product
///
/// This function handles POST requests to `/api/admin/products`.
///
/// ### Arguments
///
/// * `state` - The shared application state
/// * `payload` - The product details; the slug is derived from the name when omitted
///
/// ### Returns
///
/// The created product with status 201
#[instrument(skip(state, payload), fields(name = %payload.name))]
pub async fn create_product_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateProductDto>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    payload.validate().map_err(ApiError::BadRequest)?;
    let slug = claim_slug(&state, payload.slug.as_deref(), &payload.name, None)?;

    let mut product = Product::new(
        payload.name.trim().to_string(),
        slug,
        payload.price_cents,
        payload.fulfillment.unwrap_or(Fulfillment::InHouse),
    )
    .with_description(payload.description)
    .with_images(payload.images)
    .with_printful_variant_id(payload.printful_variant_id)
    .with_stock(payload.stock);
    if let Some(category) = payload.category {
        product = product.with_category(category);
    }

    let product = repo::create_product(&state.pool, product).map_err(ApiError::Database)?;
    info!("Created product {}", product.get_slug());
    Ok((StatusCode::CREATED, Json(product)))
}

/// Handler for editing a product
///
/// This function handles PUT requests to `/api/admin/products/{id}`. Absent
/// fields are left unchanged.
#[instrument(skip(state, payload))]
pub async fn update_product_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateProductDto>,
) -> Result<Json<Product>, ApiError> {
    payload.validate().map_err(ApiError::BadRequest)?;
    let existing = repo::get_product(&state.pool, &id)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Product"))?;

    let slug = match payload.slug.as_deref() {
        Some(requested) => Some(claim_slug(&state, Some(requested), &existing.get_name(), Some(&id))?),
        None => None,
    };
    let changes = ProductChanges {
        name: payload.name.map(|n| n.trim().to_string()),
        slug,
        description: payload.description,
        price_cents: payload.price_cents,
        category: payload.category,
        images: payload.images.map(|images| JsonValue(serde_json::json!(images))),
        printful_variant_id: payload.printful_variant_id.map(Some),
        stock: payload.stock.map(Some),
        active: payload.active,
    };

    let product = repo::update_product(&state.pool, &id, changes)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Product"))?;
    Ok(Json(product))
}

/// Handler for removing a product from the storefront
///
/// This function handles DELETE requests to `/api/admin/products/{id}`. The
/// product is deactivated, not deleted, so past orders keep their lines.
#[instrument(skip(state))]
pub async fn delete_product_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !repo::deactivate_product(&state.pool, &id).map_err(ApiError::Database)? {
        return Err(ApiError::NotFound("Product"));
    }
    Ok(StatusCode::NO_CONTENT)
}
