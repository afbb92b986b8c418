use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::Query as MultiQuery;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::dto::{BuyLabelDto, CheckoutDto, OrderListQuery, OrderLookupQuery, PrintOrderQuery, ShippingRatesDto, UpdateOrderStatusDto};
use crate::errors::ApiError;
use crate::integrations::ShippingRate;
use crate::models::{Order, OrderItem, PrintOrder};
use crate::repo;
use crate::services::checkout::{start_checkout, CheckoutCreated};
use crate::services::{fulfillment, shipping};
use crate::state::AppState;

/// An order together with its lines
#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

fn order_detail(state: &AppState, order: Order) -> Result<OrderDetail, ApiError> {
    let items = repo::get_order_items(&state.pool, &order.get_id()).map_err(ApiError::Database)?;
    Ok(OrderDetail { order, items })
}

/// Handler for starting a storefront checkout
///
/// This function handles POST requests to `/api/checkout`.
///
/// ### Arguments
///
/// * `state` - The shared application state
/// * `payload` - Customer, address, cart lines and the chosen shipping rate
///
/// ### Returns
///
/// The new order's id and number and the hosted checkout URL, with status 201
#[instrument(skip(state, payload))]
pub async fn checkout_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CheckoutDto>,
) -> Result<(StatusCode, Json<CheckoutCreated>), ApiError> {
    let created = start_checkout(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Handler for customers looking up their own order
///
/// This function handles GET requests to `/api/orders/lookup`. Both the
/// email and the order number have to match.
#[instrument(skip(state, query), fields(order_number = %query.order_number))]
pub async fn lookup_order_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OrderLookupQuery>,
) -> Result<Json<OrderDetail>, ApiError> {
    let order = repo::find_customer_order(&state.pool, query.email.trim(), query.order_number.trim())
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Order"))?;
    Ok(Json(order_detail(&state, order)?))
}

/// Handler for the admin order list
///
/// This function handles GET requests to `/api/admin/orders`. `status` may be
/// repeated to match several statuses.
#[instrument(skip(state))]
pub async fn list_orders_handler(
    State(state): State<Arc<AppState>>,
    MultiQuery(query): MultiQuery<OrderListQuery>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let orders = repo::list_orders(&state.pool, &query.status).map_err(ApiError::Database)?;
    debug!("Listing {} orders", orders.len());
    Ok(Json(orders))
}

/// Handler for one order with its lines
///
/// This function handles GET requests to `/api/admin/orders/{id}`.
#[instrument(skip(state))]
pub async fn get_order_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderDetail>, ApiError> {
    let order = repo::get_order(&state.pool, &id)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Order"))?;
    Ok(Json(order_detail(&state, order)?))
}

/// Handler for moving an order to another status
///
/// This function handles PATCH requests to `/api/admin/orders/{id}/status`.
/// Transitions out of CANCELLED or REFUNDED, and to SHIPPED before payment,
/// are refused with 409.
#[instrument(skip(state, payload), fields(status = %payload.status))]
pub async fn update_order_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateOrderStatusDto>,
) -> Result<Json<Order>, ApiError> {
    let order = repo::get_order(&state.pool, &id)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Order"))?;
    if !order.get_status().can_transition_to(payload.status) {
        return Err(ApiError::Conflict(format!(
            "Order {} cannot move from {} to {}",
            order.get_order_number(),
            order.get_status(),
            payload.status
        )));
    }
    let order = repo::update_order_status(&state.pool, &id, payload.status)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Order"))?;
    info!("Order {} moved to {}", order.get_order_number(), order.get_status());
    Ok(Json(order))
}

/// Handler for shipping quotes
///
/// This function handles POST requests to `/api/shipping/rates`.
///
/// ### Returns
///
/// Quotes from every configured provider, cheapest first
#[instrument(skip(state, payload))]
pub async fn shipping_rates_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ShippingRatesDto>,
) -> Result<Json<Vec<ShippingRate>>, ApiError> {
    let missing = payload.to.missing_fields();
    if !missing.is_empty() {
        return Err(ApiError::BadRequest(format!("to is missing: {}", missing.join(", "))));
    }
    let rates = shipping::quote_rates(&state, &payload.to, payload.parcel).await?;
    Ok(Json(rates))
}

/// Handler for buying a shipping label
///
/// This function handles POST requests to `/api/admin/orders/{id}/label`.
#[instrument(skip(state, payload))]
pub async fn buy_label_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<BuyLabelDto>,
) -> Result<Json<Order>, ApiError> {
    let order = shipping::buy_label(&state, &id, payload).await?;
    Ok(Json(order))
}

/// Handler for listing print-on-demand submissions
///
/// This function handles GET requests to `/api/admin/print-orders`.
#[instrument(skip(state))]
pub async fn list_print_orders_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PrintOrderQuery>,
) -> Result<Json<Vec<PrintOrder>>, ApiError> {
    let print_orders = repo::list_print_orders(&state.pool, query.status).map_err(ApiError::Database)?;
    Ok(Json(print_orders))
}

/// Handler for resubmitting a failed print order
///
/// This function handles POST requests to `/api/admin/print-orders/{id}/retry`.
#[instrument(skip(state))]
pub async fn retry_print_order_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PrintOrder>, ApiError> {
    let print_order = fulfillment::retry_print_order(&state, &id).await?;
    Ok(Json(print_order))
}

#[cfg(test)]
mod tests {
    use crate::create_app;
    use crate::models::{Fulfillment, Product};
    use crate::repo::create_product;
    use crate::test_utils::{admin_request, body_json, json_request, setup_test_db, test_harness};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    fn checkout_body(product_id: &str, quantity: i32) -> serde_json::Value {
        json!({
            "email": "rider@example.com",
            "name": "Jordan Vega",
            "shipping_address": {
                "name": "Jordan Vega",
                "street1": "500 Harbor Blvd",
                "city": "Tampa",
                "state": "FL",
                "zip": "33602"
            },
            "items": [{"product_id": product_id, "quantity": quantity}],
            "shipping": {"provider": "shippo", "service": "Ground", "amount_cents": 799}
        })
    }

    #[tokio::test]
    async fn test_checkout_then_lookup_and_admin_views() {
        let harness = test_harness(setup_test_db());
        let product = create_product(
            &harness.state.pool,
            Product::new("Mount".to_string(), "mount".to_string(), 2_500, Fulfillment::InHouse).with_stock(Some(4)),
        )
        .unwrap();
        let app = create_app(harness.state.clone());

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/checkout", checkout_body(&product.get_id(), 2)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        assert_eq!(created["checkout_url"], "https://checkout.test/cs_test_1");
        let order_number = created["order_number"].as_str().unwrap().to_string();
        let order_id = created["order_id"].as_str().unwrap().to_string();

        let lookup = app
            .clone()
            .oneshot(
                Request::get(format!("/api/orders/lookup?email=rider@example.com&order_number={}", order_number))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(lookup.status(), StatusCode::OK);
        let detail = body_json(lookup).await;
        assert_eq!(detail["total_cents"], 5_000 + 350 + 799);
        assert_eq!(detail["items"][0]["quantity"], 2);

        let wrong_email = app
            .clone()
            .oneshot(
                Request::get(format!("/api/orders/lookup?email=other@example.com&order_number={}", order_number))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(wrong_email.status(), StatusCode::NOT_FOUND);

        let pending = app
            .clone()
            .oneshot(admin_request("GET", "/api/admin/orders?status=PENDING&status=PAID", None))
            .await
            .unwrap();
        assert_eq!(body_json(pending).await.as_array().unwrap().len(), 1);
        let shipped = app
            .clone()
            .oneshot(admin_request("GET", "/api/admin/orders?status=SHIPPED", None))
            .await
            .unwrap();
        assert_eq!(body_json(shipped).await.as_array().unwrap().len(), 0);

        let bad_move = app
            .clone()
            .oneshot(admin_request("PATCH", &format!("/api/admin/orders/{}/status", order_id), Some(json!({"status": "SHIPPED"}))))
            .await
            .unwrap();
        assert_eq!(bad_move.status(), StatusCode::CONFLICT);

        let cancelled = app
            .oneshot(admin_request("PATCH", &format!("/api/admin/orders/{}/status", order_id), Some(json!({"status": "CANCELLED"}))))
            .await
            .unwrap();
        assert_eq!(body_json(cancelled).await["status"], "CANCELLED");
    }

    #[tokio::test]
    async fn test_checkout_rejects_short_stock() {
        let harness = test_harness(setup_test_db());
        let product = create_product(
            &harness.state.pool,
            Product::new("Mount".to_string(), "mount".to_string(), 2_500, Fulfillment::InHouse).with_stock(Some(1)),
        )
        .unwrap();
        let app = create_app(harness.state.clone());

        let response = app
            .oneshot(json_request("POST", "/api/checkout", checkout_body(&product.get_id(), 3)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(harness.payments.sessions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shipping_rates_sorted() {
        let harness = test_harness(setup_test_db());
        let app = create_app(harness.state);

        let response = app
            .oneshot(json_request("POST", "/api/shipping/rates", json!({
                "to": {"name": "A", "street1": "1 Main", "city": "Tampa", "state": "FL", "zip": "33602"}
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let amounts: Vec<i64> = body_json(response)
            .await
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["amount_cents"].as_i64().unwrap())
            .collect();
        assert_eq!(amounts, vec![650, 799, 799, 1250]);
    }

    #[tokio::test]
    async fn test_retry_unknown_print_order() {
        let harness = test_harness(setup_test_db());
        let app = create_app(harness.state);

        let response = app
            .oneshot(admin_request("POST", "/api/admin/print-orders/nope/retry", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
