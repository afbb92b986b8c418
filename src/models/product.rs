use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Fulfillment, JsonValue};

/// Represents a product in the storefront catalog
///
/// This struct maps directly to the `products` table in the database.
/// Print-on-demand products carry the fulfillment provider's variant id;
/// in-house products may track stock.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::products)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Product {
    /// Unique identifier for the product (UUID v4 as string)
    id: String,

    /// Display name
    name: String,

    /// URL-safe unique name used by the storefront
    slug: String,

    /// Long-form description
    description: String,

    /// Unit price in cents
    price_cents: i64,

    /// Storefront category
    category: String,

    /// Image URLs as a JSON array
    images: JsonValue,

    /// How the product is fulfilled
    fulfillment: Fulfillment,

    /// Variant id at the print-on-demand provider
    printful_variant_id: Option<i64>,

    /// Units on hand for in-house products (None means untracked)
    stock: Option<i32>,

    /// Whether the product is listed
    active: bool,

    /// When this product was created
    created_at: NaiveDateTime,

    /// When this product was last updated
    updated_at: NaiveDateTime,
}

impl Product {
    /// Creates a new active product
    ///
    /// ### Arguments
    ///
    /// * `name` - The display name
    /// * `slug` - The unique storefront slug
    /// * `price_cents` - The unit price in cents
    /// * `fulfillment` - How the product is fulfilled
    ///
    /// ### Returns
    ///
    /// A new `Product` with an empty description, no images, and the
    /// `general` category
    pub fn new(name: String, slug: String, price_cents: i64, fulfillment: Fulfillment) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            slug,
            description: String::new(),
            price_cents,
            category: "general".to_string(),
            images: JsonValue::empty_array(),
            fulfillment,
            printful_variant_id: None,
            stock: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: String) -> Self {
        self.description = description;
        self
    }

    pub fn with_category(mut self, category: String) -> Self {
        self.category = category;
        self
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = JsonValue(serde_json::Value::from(images));
        self
    }

    pub fn with_printful_variant_id(mut self, variant_id: Option<i64>) -> Self {
        self.printful_variant_id = variant_id;
        self
    }

    pub fn with_stock(mut self, stock: Option<i32>) -> Self {
        self.stock = stock;
        self
    }

    pub fn get_id(&self) -> String {
        self.id.clone()
    }

    pub fn get_name(&self) -> String {
        self.name.clone()
    }

    pub fn get_slug(&self) -> String {
        self.slug.clone()
    }

    pub fn get_description(&self) -> String {
        self.description.clone()
    }

    pub fn get_price_cents(&self) -> i64 {
        self.price_cents
    }

    pub fn get_category(&self) -> String {
        self.category.clone()
    }

    /// Gets the image URLs, ignoring malformed entries
    pub fn get_images(&self) -> Vec<String> {
        self.images.to_typed().unwrap_or_default()
    }

    pub fn get_fulfillment(&self) -> Fulfillment {
        self.fulfillment
    }

    pub fn get_printful_variant_id(&self) -> Option<i64> {
        self.printful_variant_id
    }

    pub fn get_stock(&self) -> Option<i32> {
        self.stock
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_print_on_demand(&self) -> bool {
        self.fulfillment == Fulfillment::PrintOnDemand
    }

    /// Whether `quantity` units can be sold right now
    ///
    /// Print-on-demand and untracked products are always available.
    pub fn has_stock_for(&self, quantity: i32) -> bool {
        if self.is_print_on_demand() {
            return true;
        }
        self.stock.is_none_or(|stock| stock >= quantity)
    }

    pub fn get_created_at(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.created_at, Utc)
    }

    pub fn get_updated_at(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.updated_at, Utc)
    }
}

/// Derives a storefront slug from a product name
///
/// Lowercases the name and collapses every run of non-alphanumeric
/// characters into a single `-`, trimming dashes from both ends.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
