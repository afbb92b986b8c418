use std::collections::HashMap;

use tracing::{info, instrument, warn};

use crate::errors::ApiError;
use crate::integrations::FulfillmentItem;
use crate::models::{Order, OrderItem, PrintOrder, PrintOrderStatus, Product, MAX_PRINT_RETRIES};
use crate::repo::{
    get_or_create_print_order, get_order, get_order_items, get_print_order, get_products_by_ids, increment_retry,
    mark_failed, mark_submitted,
};
use crate::state::AppState;

/// The print-on-demand lines of an order, in provider terms
///
/// Lines for in-house products are left out.
pub fn fulfillment_items(products: &[Product], items: &[OrderItem]) -> Vec<FulfillmentItem> {
    let by_id: HashMap<String, &Product> = products.iter().map(|p| (p.get_id(), p)).collect();
    items
        .iter()
        .filter_map(|item| {
            let product = by_id.get(&item.product_id)?;
            let variant_id = product.get_printful_variant_id().filter(|_| product.is_print_on_demand())?;
            Some(FulfillmentItem {
                variant_id,
                quantity: item.quantity,
                name: item.product_name.clone(),
                retail_price_cents: item.unit_price_cents,
            })
        })
        .collect()
}

async fn send_to_provider(state: &AppState, print_order: &PrintOrder, order: &Order, lines: &[FulfillmentItem]) -> anyhow::Result<PrintOrder> {
    let Some(recipient) = order.get_shipping_address() else {
        return mark_failed(&state.pool, &print_order.get_id(), "Order has no shipping address");
    };
    let provider = match state.integrations.fulfillment() {
        Ok(provider) => provider,
        Err(e) => return mark_failed(&state.pool, &print_order.get_id(), &e.to_string()),
    };
    match provider.submit_order(&order.get_order_number(), &recipient, lines).await {
        Ok(external_id) => mark_submitted(&state.pool, &print_order.get_id(), &external_id),
        Err(e) => mark_failed(&state.pool, &print_order.get_id(), &e.to_string()),
    }
}

/// Sends the print-on-demand part of a paid order to the print provider
///
/// Orders without print-on-demand lines get no print order. A print order
/// that already went through is not sent again. Provider failures leave the
/// print order FAILED with the error recorded.
///
/// ### Returns
///
/// The print order after the attempt, or `None` when there is nothing to print
#[instrument(skip(state, order, items), fields(order = %order.get_order_number()))]
pub async fn submit_print_order(state: &AppState, order: &Order, items: &[OrderItem]) -> anyhow::Result<Option<PrintOrder>> {
    let ids: Vec<String> = items.iter().map(|i| i.product_id.clone()).collect();
    let products = get_products_by_ids(&state.pool, &ids)?;
    let lines = fulfillment_items(&products, items);
    if lines.is_empty() {
        return Ok(None);
    }

    let print_order = get_or_create_print_order(&state.pool, &order.get_id())?;
    if matches!(print_order.get_status(), PrintOrderStatus::Submitted | PrintOrderStatus::Fulfilled) {
        info!("Print order {} already {}", print_order.get_id(), print_order.get_status());
        return Ok(Some(print_order));
    }
    let print_order = send_to_provider(state, &print_order, order, &lines).await?;
    Ok(Some(print_order))
}

/// Retries a FAILED print order
///
/// Each attempt counts toward [`MAX_PRINT_RETRIES`] whether or not it succeeds.
#[instrument(skip(state))]
pub async fn retry_print_order(state: &AppState, print_order_id: &str) -> Result<PrintOrder, ApiError> {
    let print_order = get_print_order(&state.pool, print_order_id)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Print order"))?;
    if print_order.get_status() != PrintOrderStatus::Failed {
        return Err(ApiError::Conflict(format!("Print order is {}", print_order.get_status())));
    }
    if !print_order.can_retry() {
        return Err(ApiError::Conflict(format!("Print order already retried {} times", MAX_PRINT_RETRIES)));
    }

    let order = get_order(&state.pool, &print_order.get_order_id())
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Order"))?;
    let items = get_order_items(&state.pool, &order.get_id()).map_err(ApiError::Database)?;
    let ids: Vec<String> = items.iter().map(|i| i.product_id.clone()).collect();
    let products = get_products_by_ids(&state.pool, &ids).map_err(ApiError::Database)?;
    let lines = fulfillment_items(&products, &items);

    let print_order = increment_retry(&state.pool, print_order_id).map_err(ApiError::Database)?;
    let print_order = send_to_provider(state, &print_order, &order, &lines)
        .await
        .map_err(ApiError::Database)?;
    if print_order.get_status() == PrintOrderStatus::Failed {
        warn!("Retry {} of print order {} failed", print_order.get_retry_count(), print_order_id);
    }
    Ok(print_order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Fulfillment, OrderTotals};
    use crate::repo::{create_order, create_product};
    use crate::test_utils::{setup_test_db, test_address, test_harness, TestHarness};

    fn seed_paid_order(harness: &TestHarness) -> (Order, Vec<OrderItem>) {
        let pool = &harness.state.pool;
        let tee = create_product(
            pool,
            Product::new("Tee".to_string(), "tee".to_string(), 2_000, Fulfillment::PrintOnDemand).with_printful_variant_id(Some(4011)),
        )
        .unwrap();
        let sticker = create_product(pool, Product::new("Sticker".to_string(), "sticker".to_string(), 300, Fulfillment::InHouse)).unwrap();
        let order = Order::new(
            "rider@example.com".to_string(),
            "Jordan Vega".to_string(),
            &test_address(),
            OrderTotals { subtotal_cents: 4_300, shipping_cents: 0, tax_cents: 0 },
        );
        let items = vec![
            OrderItem::new(&order.get_id(), &tee.get_id(), "Tee".to_string(), 2_000, 2),
            OrderItem::new(&order.get_id(), &sticker.get_id(), "Sticker".to_string(), 300, 1),
        ];
        let order = create_order(pool, order, items.clone()).unwrap();
        (order, items)
    }

    #[tokio::test]
    async fn test_submit_sends_only_print_lines() {
        let harness = test_harness(setup_test_db());
        let (order, items) = seed_paid_order(&harness);

        let print_order = submit_print_order(&harness.state, &order, &items).await.unwrap().unwrap();

        assert_eq!(print_order.get_status(), PrintOrderStatus::Submitted);
        assert_eq!(print_order.get_external_id().as_deref(), Some("pf_1"));
        let submitted = harness.fulfillment.submitted.lock().unwrap();
        assert_eq!(submitted[0].0, order.get_order_number());
        assert_eq!(submitted[0].1.len(), 1);
        assert_eq!(submitted[0].1[0].variant_id, 4011);
        assert_eq!(submitted[0].1[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_submit_twice_sends_once() {
        let harness = test_harness(setup_test_db());
        let (order, items) = seed_paid_order(&harness);

        let first = submit_print_order(&harness.state, &order, &items).await.unwrap().unwrap();
        let second = submit_print_order(&harness.state, &order, &items).await.unwrap().unwrap();

        assert_eq!(first.get_id(), second.get_id());
        assert_eq!(harness.fulfillment.submitted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_without_print_lines() {
        let harness = test_harness(setup_test_db());
        let (order, items) = seed_paid_order(&harness);
        let in_house: Vec<OrderItem> = items.into_iter().filter(|i| i.product_name == "Sticker").collect();

        assert!(submit_print_order(&harness.state, &order, &in_house).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failure_then_retry() {
        let harness = test_harness(setup_test_db());
        let (order, items) = seed_paid_order(&harness);
        *harness.fulfillment.fail.lock().unwrap() = true;

        let failed = submit_print_order(&harness.state, &order, &items).await.unwrap().unwrap();
        assert_eq!(failed.get_status(), PrintOrderStatus::Failed);
        assert!(failed.get_last_error().unwrap().contains("Invalid variant"));

        *harness.fulfillment.fail.lock().unwrap() = false;
        let retried = retry_print_order(&harness.state, &failed.get_id()).await.unwrap();
        assert_eq!(retried.get_status(), PrintOrderStatus::Submitted);
        assert_eq!(retried.get_retry_count(), 1);
        assert_eq!(retried.get_last_error(), None);

        let again = retry_print_order(&harness.state, &failed.get_id()).await;
        assert!(matches!(again, Err(ApiError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_retry_cap() {
        let harness = test_harness(setup_test_db());
        let (order, items) = seed_paid_order(&harness);
        *harness.fulfillment.fail.lock().unwrap() = true;
        let failed = submit_print_order(&harness.state, &order, &items).await.unwrap().unwrap();

        for attempt in 1..=MAX_PRINT_RETRIES {
            let result = retry_print_order(&harness.state, &failed.get_id()).await.unwrap();
            assert_eq!(result.get_retry_count(), attempt);
        }
        let capped = retry_print_order(&harness.state, &failed.get_id()).await;
        assert!(matches!(capped, Err(ApiError::Conflict(msg)) if msg.contains("5 times")));
    }

    #[tokio::test]
    async fn test_retry_unknown() {
        let harness = test_harness(setup_test_db());
        let result = retry_print_order(&harness.state, "missing").await;
        assert!(matches!(result, Err(ApiError::NotFound("Print order"))));
    }
}
