use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::dto::CheckoutDto;
use crate::errors::ApiError;
use crate::integrations::{CheckoutLine, CheckoutRequest, CheckoutSession};
use crate::models::{Order, OrderItem, OrderTotals, Product};
use crate::money::apply_bps_rounded;
use crate::repo::{create_order, get_invoice_by_token, get_products_by_ids, set_checkout_session};
use crate::state::AppState;

/// Metadata key naming what a checkout session pays for
pub const META_KIND: &str = "kind";
/// Metadata key holding the paid record's id
pub const META_ID: &str = "id";
pub const KIND_ORDER: &str = "order";
pub const KIND_INVOICE: &str = "invoice";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutCreated {
    pub order_id: String,
    pub order_number: String,
    pub checkout_url: String,
}

fn metadata(kind: &str, id: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (META_KIND.to_string(), kind.to_string()),
        (META_ID.to_string(), id.to_string()),
    ])
}

/// Resolves the cart against the catalog
///
/// Repeated lines for one product are checked against its stock together.
fn price_cart(payload: &CheckoutDto, products: Vec<Product>) -> Result<Vec<(Product, i32)>, ApiError> {
    let by_id: HashMap<String, Product> = products.into_iter().map(|p| (p.get_id(), p)).collect();
    let mut wanted: HashMap<&str, i32> = HashMap::new();
    let mut lines = Vec::with_capacity(payload.items.len());

    for item in &payload.items {
        let product = by_id
            .get(&item.product_id)
            .filter(|p| p.is_active())
            .ok_or_else(|| ApiError::BadRequest(format!("Product {} is not available", item.product_id)))?;
        let total = wanted.entry(item.product_id.as_str()).or_insert(0);
        *total = total
            .checked_add(item.quantity)
            .ok_or_else(|| ApiError::BadRequest(format!("Quantity too large for {}", product.get_name())))?;
        if !product.has_stock_for(*total) {
            return Err(ApiError::BadRequest(format!("Not enough stock for {}", product.get_name())));
        }
        lines.push((product.clone(), item.quantity));
    }
    Ok(lines)
}

/// Creates a PENDING order from a cart and opens a hosted checkout for it
///
/// Prices come from the catalog, never from the client. Sales tax is
/// charged on the subtotal at the configured rate.
#[instrument(skip(state, payload), fields(email = %payload.email, items = payload.items.len()))]
pub async fn start_checkout(state: &AppState, payload: CheckoutDto) -> Result<CheckoutCreated, ApiError> {
    payload.validate().map_err(ApiError::BadRequest)?;

    let ids: Vec<String> = payload.items.iter().map(|i| i.product_id.clone()).collect();
    let products = get_products_by_ids(&state.pool, &ids).map_err(ApiError::Database)?;
    let lines = price_cart(&payload, products)?;

    let too_large = || ApiError::BadRequest("Order total is too large".to_string());
    let subtotal_cents = lines
        .iter()
        .try_fold(0i64, |sum, (p, qty)| p.get_price_cents().checked_mul(*qty as i64).and_then(|line| sum.checked_add(line)))
        .ok_or_else(too_large)?;
    let shipping_cents = payload.shipping.as_ref().map(|s| s.amount_cents).unwrap_or(0);
    let totals = OrderTotals {
        subtotal_cents,
        shipping_cents,
        tax_cents: apply_bps_rounded(subtotal_cents, state.config.sales_tax_bps),
    };
    subtotal_cents
        .checked_add(totals.shipping_cents)
        .and_then(|sum| sum.checked_add(totals.tax_cents))
        .ok_or_else(too_large)?;

    let order = Order::new(payload.email.trim().to_string(), payload.name.trim().to_string(), &payload.shipping_address, totals)
        .with_shipping_choice(
            payload.shipping.as_ref().map(|s| s.provider.to_ascii_uppercase()),
            payload.shipping.as_ref().map(|s| s.service.clone()),
        )
        .with_referral_code(payload.referral_code.clone());
    let order_id = order.get_id();
    let items: Vec<OrderItem> = lines
        .iter()
        .map(|(product, qty)| OrderItem::new(&order_id, &product.get_id(), product.get_name(), product.get_price_cents(), *qty))
        .collect();

    let mut checkout_lines: Vec<CheckoutLine> = items
        .iter()
        .map(|item| CheckoutLine {
            name: item.product_name.clone(),
            unit_amount_cents: item.unit_price_cents,
            quantity: item.quantity,
        })
        .collect();
    if totals.shipping_cents > 0 {
        checkout_lines.push(CheckoutLine { name: "Shipping".to_string(), unit_amount_cents: totals.shipping_cents, quantity: 1 });
    }
    if totals.tax_cents > 0 {
        checkout_lines.push(CheckoutLine { name: "Sales tax".to_string(), unit_amount_cents: totals.tax_cents, quantity: 1 });
    }

    let order = create_order(&state.pool, order, items).map_err(ApiError::Database)?;
    info!("Order {} created for {} cents", order.get_order_number(), order.get_total_cents());

    let site = state.config.site_base();
    let request = CheckoutRequest {
        customer_email: order.get_customer_email(),
        lines: checkout_lines,
        success_url: format!("{}/shop/order/success?order={}", site, order.get_order_number()),
        cancel_url: format!("{}/shop/cart", site),
        metadata: metadata(KIND_ORDER, &order_id),
    };
    let session = state
        .integrations
        .payments()?
        .create_checkout_session(&request)
        .await
        .inspect_err(|e| warn!("Checkout session for order {} failed: {}", order.get_order_number(), e))?;
    set_checkout_session(&state.pool, &order_id, &session.id).map_err(ApiError::Database)?;

    Ok(CheckoutCreated {
        order_id,
        order_number: order.get_order_number(),
        checkout_url: session.url,
    })
}

/// Opens a hosted checkout for the balance of an invoice
///
/// Only SENT and OVERDUE invoices can be paid.
#[instrument(skip(state, token))]
pub async fn start_invoice_checkout(state: &AppState, token: &str) -> Result<CheckoutSession, ApiError> {
    let invoice = get_invoice_by_token(&state.pool, token)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Invoice"))?;
    if !invoice.get_status().is_payable() {
        return Err(ApiError::Conflict(format!(
            "Invoice {} is {} and cannot be paid",
            invoice.get_invoice_number(),
            invoice.get_status()
        )));
    }

    let site = state.config.site_base();
    let request = CheckoutRequest {
        customer_email: invoice.get_customer_email(),
        lines: vec![CheckoutLine {
            name: format!("Invoice {}", invoice.get_invoice_number()),
            unit_amount_cents: invoice.get_total_cents(),
            quantity: 1,
        }],
        success_url: format!("{}/invoices/{}?paid=1", site, token),
        cancel_url: format!("{}/invoices/{}", site, token),
        metadata: metadata(KIND_INVOICE, &invoice.get_id()),
    };
    let session = state.integrations.payments()?.create_checkout_session(&request).await?;
    info!("Checkout opened for invoice {}", invoice.get_invoice_number());
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::{CheckoutItemDto, ShippingChoiceDto};
    use crate::models::Fulfillment;
    use crate::repo::{create_product, get_order, get_order_items};
    use crate::test_utils::{setup_test_db, test_address, test_harness};

    fn cart(items: Vec<(&str, i32)>) -> CheckoutDto {
        CheckoutDto {
            email: "rider@example.com".to_string(),
            name: "Jordan Vega".to_string(),
            shipping_address: test_address(),
            items: items
                .into_iter()
                .map(|(id, quantity)| CheckoutItemDto { product_id: id.to_string(), quantity })
                .collect(),
            shipping: Some(ShippingChoiceDto { provider: "shippo".to_string(), service: "Priority".to_string(), amount_cents: 799 }),
            referral_code: Some(" ride47 ".to_string()),
        }
    }

    #[tokio::test]
    async fn test_checkout_creates_order_and_session() {
        let harness = test_harness(setup_test_db());
        let pool = &harness.state.pool;
        let hoodie = create_product(pool, Product::new("Hoodie".to_string(), "hoodie".to_string(), 4_500, Fulfillment::InHouse).with_stock(Some(3))).unwrap();
        let tee = create_product(
            pool,
            Product::new("Tee".to_string(), "tee".to_string(), 2_000, Fulfillment::PrintOnDemand).with_printful_variant_id(Some(11)),
        )
        .unwrap();

        let created = start_checkout(&harness.state, cart(vec![(&hoodie.get_id(), 2), (&tee.get_id(), 1)])).await.unwrap();

        assert!(created.order_number.starts_with("47-"));
        assert_eq!(created.checkout_url, "https://checkout.test/cs_test_1");
        let order = get_order(pool, &created.order_id).unwrap().unwrap();
        assert_eq!(order.get_subtotal_cents(), 11_000);
        // 7% of $110.00
        assert_eq!(order.get_tax_cents(), 770);
        assert_eq!(order.get_shipping_cents(), 799);
        assert_eq!(order.get_total_cents(), 12_569);
        assert_eq!(order.get_stripe_session_id().as_deref(), Some("cs_test_1"));
        assert_eq!(order.get_referral_code().as_deref(), Some("RIDE47"));
        assert_eq!(order.get_shipping_provider().as_deref(), Some("SHIPPO"));
        assert_eq!(get_order_items(pool, &created.order_id).unwrap().len(), 2);

        let sessions = harness.payments.sessions.lock().unwrap();
        let request = &sessions[0];
        assert_eq!(request.metadata.get(META_KIND).map(String::as_str), Some(KIND_ORDER));
        assert_eq!(request.metadata.get(META_ID), Some(&created.order_id));
        let charged: i64 = request.lines.iter().map(|l| l.unit_amount_cents * l.quantity as i64).sum();
        assert_eq!(charged, 12_569);
    }

    #[tokio::test]
    async fn test_checkout_rejects_insufficient_stock_across_lines() {
        let harness = test_harness(setup_test_db());
        let hoodie = create_product(
            &harness.state.pool,
            Product::new("Hoodie".to_string(), "hoodie".to_string(), 4_500, Fulfillment::InHouse).with_stock(Some(3)),
        )
        .unwrap();

        let result = start_checkout(&harness.state, cart(vec![(&hoodie.get_id(), 2), (&hoodie.get_id(), 2)])).await;

        assert!(matches!(result, Err(ApiError::BadRequest(msg)) if msg.contains("Hoodie")));
        assert!(harness.payments.sessions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_rejects_overflowing_quantities() {
        let harness = test_harness(setup_test_db());
        let pool = &harness.state.pool;
        let decal = create_product(pool, Product::new("Decal".to_string(), "decal".to_string(), 500, Fulfillment::InHouse)).unwrap();
        let frame = create_product(pool, Product::new("Frame".to_string(), "frame".to_string(), i64::MAX / 2, Fulfillment::InHouse)).unwrap();

        let repeated = start_checkout(&harness.state, cart(vec![(&decal.get_id(), i32::MAX), (&decal.get_id(), i32::MAX)])).await;
        assert!(matches!(repeated, Err(ApiError::BadRequest(msg)) if msg.contains("Decal")));

        let pricey = start_checkout(&harness.state, cart(vec![(&frame.get_id(), 3)])).await;
        assert!(matches!(pricey, Err(ApiError::BadRequest(msg)) if msg.contains("too large")));

        assert!(harness.payments.sessions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_rejects_unknown_product() {
        let harness = test_harness(setup_test_db());
        let result = start_checkout(&harness.state, cart(vec![("missing", 1)])).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }
}
