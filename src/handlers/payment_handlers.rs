use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use std::sync::Arc;
use tracing::{instrument, warn};

use crate::errors::ApiError;
use crate::integrations::stripe::{verify_signature, WebhookEvent};
use crate::integrations::CheckoutSession;
use crate::services::checkout::start_invoice_checkout;
use crate::services::payments::handle_event;
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "stripe-signature";

/// Handler for payment provider webhooks
///
/// This function handles POST requests to `/api/webhooks/stripe`. The raw
/// body is checked against the `Stripe-Signature` header before it is parsed;
/// an unset webhook secret fails every check.
///
/// ### Arguments
///
/// * `state` - The shared application state
/// * `headers` - Request headers carrying the signature
/// * `body` - The exact bytes that were signed
///
/// ### Returns
///
/// `{"received": true}` once the event is applied or ignored
#[instrument(skip_all)]
pub async fn stripe_webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let secret = state
        .config
        .stripe_webhook_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Webhook secret is not configured".to_string()))?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing Stripe-Signature header".to_string()))?;

    verify_signature(&body, signature, secret, chrono::Utc::now().timestamp()).map_err(|e| {
        warn!("Rejected webhook: {}", e);
        ApiError::BadRequest(format!("Invalid signature: {}", e))
    })?;

    let event: WebhookEvent =
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(format!("Invalid event: {}", e)))?;
    handle_event(&state, event).await?;
    Ok(Json(serde_json::json!({ "received": true })))
}

/// Handler for paying an invoice online
///
/// This function handles POST requests to `/api/invoices/{token}/checkout`.
///
/// ### Returns
///
/// The hosted checkout session for the invoice total
#[instrument(skip_all)]
pub async fn invoice_checkout_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<CheckoutSession>, ApiError> {
    let session = start_invoice_checkout(&state, &token).await?;
    Ok(Json(session))
}

#[cfg(test)]
mod tests {
    use crate::create_app;
    use crate::integrations::stripe::sign_payload;
    use crate::models::{Fulfillment, Order, OrderItem, OrderStatus, OrderTotals, Product};
    use crate::repo::{create_order, create_product, get_order};
    use crate::test_utils::{setup_test_db, test_address, test_harness, STRIPE_WEBHOOK_SECRET};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    fn webhook(body: &str, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::post("/api/webhooks/stripe").header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header("stripe-signature", signature);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn signed(body: &str, secret: &str) -> String {
        let now = chrono::Utc::now().timestamp();
        format!("t={},v1={}", now, sign_payload(body.as_bytes(), secret, now).unwrap())
    }

    #[tokio::test]
    async fn test_signed_completion_marks_order_paid() {
        let harness = test_harness(setup_test_db());
        let pool = &harness.state.pool;
        let product = create_product(pool, Product::new("Mount".to_string(), "mount".to_string(), 1_000, Fulfillment::InHouse)).unwrap();
        let order = Order::new(
            "rider@example.com".to_string(),
            "Jordan Vega".to_string(),
            &test_address(),
            OrderTotals { subtotal_cents: 1_000, shipping_cents: 0, tax_cents: 0 },
        );
        let order_id = order.get_id();
        let item = OrderItem::new(&order_id, &product.get_id(), "Mount".to_string(), 1_000, 1);
        create_order(pool, order, vec![item]).unwrap();
        let app = create_app(harness.state.clone());

        let body = json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {
                "id": "cs_1",
                "payment_status": "paid",
                "metadata": {"kind": "order", "id": order_id}
            }}
        })
        .to_string();

        let forged = app.clone().oneshot(webhook(&body, Some(signed(&body, "whsec_wrong")))).await.unwrap();
        assert_eq!(forged.status(), StatusCode::BAD_REQUEST);
        let unsigned = app.clone().oneshot(webhook(&body, None)).await.unwrap();
        assert_eq!(unsigned.status(), StatusCode::BAD_REQUEST);
        assert_eq!(get_order(pool, &order_id).unwrap().unwrap().get_status(), OrderStatus::Pending);

        let accepted = app.clone().oneshot(webhook(&body, Some(signed(&body, STRIPE_WEBHOOK_SECRET)))).await.unwrap();
        assert_eq!(accepted.status(), StatusCode::OK);
        assert_eq!(get_order(pool, &order_id).unwrap().unwrap().get_status(), OrderStatus::Paid);

        let replay = app.oneshot(webhook(&body, Some(signed(&body, STRIPE_WEBHOOK_SECRET)))).await.unwrap();
        assert_eq!(replay.status(), StatusCode::OK);
        assert_eq!(harness.mailer.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_other_events_acknowledged() {
        let harness = test_harness(setup_test_db());
        let app = create_app(harness.state);
        let body = json!({"id": "evt_2", "type": "charge.refunded", "data": {"object": {}}}).to_string();

        let response = app.oneshot(webhook(&body, Some(signed(&body, STRIPE_WEBHOOK_SECRET)))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invoice_checkout_unknown_token() {
        let harness = test_harness(setup_test_db());
        let app = create_app(harness.state);

        let response = app
            .oneshot(Request::post("/api/invoices/nope/checkout").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
