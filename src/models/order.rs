use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Address, JsonValue, OrderStatus};

/// Represents a storefront order
///
/// This struct maps directly to the `orders` table in the database. Totals
/// are fixed at checkout; shipping and payment details are filled in as the
/// order moves through its lifecycle.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Order {
    /// Unique identifier for the order (UUID v4 as string)
    id: String,

    /// Customer-facing order number, e.g. `47-20261019-K3J9QX`
    order_number: String,

    customer_email: String,

    customer_name: String,

    /// Destination address as JSON
    shipping_address: JsonValue,

    status: OrderStatus,

    subtotal_cents: i64,

    shipping_cents: i64,

    tax_cents: i64,

    total_cents: i64,

    /// Rate-shopping provider the customer picked at checkout
    shipping_provider: Option<String>,

    shipping_service: Option<String>,

    tracking_number: Option<String>,

    carrier: Option<String>,

    label_url: Option<String>,

    /// Payment checkout session that pays this order
    stripe_session_id: Option<String>,

    /// Partner code captured at checkout
    referral_code: Option<String>,

    paid_at: Option<NaiveDateTime>,

    created_at: NaiveDateTime,

    updated_at: NaiveDateTime,
}

/// Checkout totals for a new order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderTotals {
    pub subtotal_cents: i64,
    pub shipping_cents: i64,
    pub tax_cents: i64,
}

impl OrderTotals {
    pub fn total_cents(&self) -> i64 {
        self.subtotal_cents + self.shipping_cents + self.tax_cents
    }
}

impl Order {
    /// Creates a new PENDING order
    ///
    /// ### Arguments
    ///
    /// * `customer_email` - Where receipts and tracking go
    /// * `customer_name` - The purchaser's name
    /// * `shipping_address` - The destination
    /// * `totals` - Subtotal, shipping, and tax computed at checkout
    ///
    /// ### Returns
    ///
    /// A new `Order` with a freshly generated order number
    pub fn new(customer_email: String, customer_name: String, shipping_address: &Address, totals: OrderTotals) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            order_number: generate_order_number(now),
            customer_email,
            customer_name,
            shipping_address: JsonValue::from_typed(shipping_address)
                .unwrap_or_else(|_| JsonValue(serde_json::Value::Null)),
            status: OrderStatus::Pending,
            subtotal_cents: totals.subtotal_cents,
            shipping_cents: totals.shipping_cents,
            tax_cents: totals.tax_cents,
            total_cents: totals.total_cents(),
            shipping_provider: None,
            shipping_service: None,
            tracking_number: None,
            carrier: None,
            label_url: None,
            stripe_session_id: None,
            referral_code: None,
            paid_at: None,
            created_at: now.naive_utc(),
            updated_at: now.naive_utc(),
        }
    }

    pub fn with_shipping_choice(mut self, provider: Option<String>, service: Option<String>) -> Self {
        self.shipping_provider = provider;
        self.shipping_service = service;
        self
    }

    pub fn with_referral_code(mut self, code: Option<String>) -> Self {
        self.referral_code = code.map(|c| c.trim().to_ascii_uppercase()).filter(|c| !c.is_empty());
        self
    }

    pub fn get_id(&self) -> String {
        self.id.clone()
    }

    pub fn get_order_number(&self) -> String {
        self.order_number.clone()
    }

    pub fn get_customer_email(&self) -> String {
        self.customer_email.clone()
    }

    pub fn get_customer_name(&self) -> String {
        self.customer_name.clone()
    }

    /// Gets the destination address, if the stored JSON is well formed
    pub fn get_shipping_address(&self) -> Option<Address> {
        self.shipping_address.to_typed().ok()
    }

    pub fn get_status(&self) -> OrderStatus {
        self.status
    }

    pub fn get_subtotal_cents(&self) -> i64 {
        self.subtotal_cents
    }

    pub fn get_shipping_cents(&self) -> i64 {
        self.shipping_cents
    }

    pub fn get_tax_cents(&self) -> i64 {
        self.tax_cents
    }

    pub fn get_total_cents(&self) -> i64 {
        self.total_cents
    }

    pub fn get_shipping_provider(&self) -> Option<String> {
        self.shipping_provider.clone()
    }

    pub fn get_shipping_service(&self) -> Option<String> {
        self.shipping_service.clone()
    }

    pub fn get_tracking_number(&self) -> Option<String> {
        self.tracking_number.clone()
    }

    pub fn get_carrier(&self) -> Option<String> {
        self.carrier.clone()
    }

    pub fn get_label_url(&self) -> Option<String> {
        self.label_url.clone()
    }

    pub fn get_stripe_session_id(&self) -> Option<String> {
        self.stripe_session_id.clone()
    }

    pub fn get_referral_code(&self) -> Option<String> {
        self.referral_code.clone()
    }

    pub fn get_paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at.map(|t| DateTime::from_naive_utc_and_offset(t, Utc))
    }

    pub fn get_created_at(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.created_at, Utc)
    }

    pub fn get_updated_at(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.updated_at, Utc)
    }
}

const ORDER_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generates an order number of the form `47-YYYYMMDD-XXXXXX`
///
/// The suffix avoids look-alike characters (0/O, 1/I).
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..6)
        .map(|_| ORDER_CODE_ALPHABET[rng.random_range(0..ORDER_CODE_ALPHABET.len())] as char)
        .collect();
    format!("47-{}-{}", now.format("%Y%m%d"), suffix)
}

/// One line of an order
///
/// Name and price are copied from the product at checkout so later catalog
/// edits don't rewrite history.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::order_items)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub product_name: String,
    pub unit_price_cents: i64,
    pub quantity: i32,
}

impl OrderItem {
    pub fn new(order_id: &str, product_id: &str, product_name: String, unit_price_cents: i64, quantity: i32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            product_id: product_id.to_string(),
            product_name,
            unit_price_cents,
            quantity,
        }
    }

    pub fn line_total_cents(&self) -> i64 {
        self.unit_price_cents * self.quantity as i64
    }
}
