use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::email;
use crate::errors::ApiError;
use crate::integrations::stripe::WebhookEvent;
use crate::repo::{get_order_items, mark_invoice_paid, record_order_payment, record_referral_for_order, PaymentRecorded};
use crate::services::checkout::{KIND_INVOICE, KIND_ORDER};
use crate::services::fulfillment::submit_print_order;
use crate::state::AppState;

const SESSION_COMPLETED: &str = "checkout.session.completed";
const ASYNC_PAYMENT_SUCCEEDED: &str = "checkout.session.async_payment_succeeded";

#[derive(Debug, Default, Deserialize)]
struct SessionMetadata {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletedSession {
    id: String,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    metadata: SessionMetadata,
}

/// Applies a verified payment webhook
///
/// Only completed checkout sessions change anything; every other event type
/// is acknowledged and ignored. Sessions that reference an unknown order or
/// invoice are logged and acknowledged so the sender stops retrying.
#[instrument(skip(state, event), fields(event_id = %event.id, kind = %event.kind))]
pub async fn handle_event(state: &AppState, event: WebhookEvent) -> Result<(), ApiError> {
    if event.kind != SESSION_COMPLETED && event.kind != ASYNC_PAYMENT_SUCCEEDED {
        debug!("Ignoring event");
        return Ok(());
    }
    let session: CompletedSession = serde_json::from_value(event.data.object)
        .map_err(|e| ApiError::BadRequest(format!("Invalid checkout session: {}", e)))?;
    if session.payment_status.as_deref() == Some("unpaid") {
        info!("Session {} completed without payment yet", session.id);
        return Ok(());
    }

    match (session.metadata.kind.as_deref(), session.metadata.id.as_deref()) {
        (Some(KIND_ORDER), Some(order_id)) => complete_order_payment(state, order_id).await,
        (Some(KIND_INVOICE), Some(invoice_id)) => {
            complete_invoice_payment(state, invoice_id, session.payment_intent.as_deref()).await
        }
        _ => {
            warn!("Session {} has no usable metadata", session.id);
            Ok(())
        }
    }
}

/// Marks an order paid and runs everything that follows a first payment
///
/// Partner commission, print submission and the confirmation email happen
/// only on the call that moved the order to PAID. Their failures are logged.
pub async fn complete_order_payment(state: &AppState, order_id: &str) -> Result<(), ApiError> {
    let order = match record_order_payment(&state.pool, order_id).map_err(ApiError::Database)? {
        Some(PaymentRecorded::Marked(order)) => order,
        Some(PaymentRecorded::Unchanged(order)) => {
            info!("Order {} was already {}", order.get_order_number(), order.get_status());
            return Ok(());
        }
        None => {
            warn!("Payment for unknown order {}", order_id);
            return Ok(());
        }
    };
    let items = get_order_items(&state.pool, order_id).map_err(ApiError::Database)?;

    if let Some(code) = order.get_referral_code() {
        match record_referral_for_order(&state.pool, &code, order_id, order.get_subtotal_cents()) {
            Ok(Some(referral)) => info!("Credited {} cents to partner {}", referral.commission_cents, referral.partner_id),
            Ok(None) => debug!("Referral code {} earned nothing", code),
            Err(e) => warn!("Could not record referral for order {}: {:#}", order.get_order_number(), e),
        }
    }

    if let Err(e) = submit_print_order(state, &order, &items).await {
        warn!("Print submission for order {} failed: {:#}", order.get_order_number(), e);
    }

    email::deliver(&state.integrations, email::order_confirmation(&order, &items)).await;
    Ok(())
}

/// Marks an invoice paid and sends the receipt on the first payment
pub async fn complete_invoice_payment(state: &AppState, invoice_id: &str, payment_intent_id: Option<&str>) -> Result<(), ApiError> {
    match mark_invoice_paid(&state.pool, invoice_id, payment_intent_id).map_err(ApiError::Database)? {
        Some(PaymentRecorded::Marked(invoice)) => {
            email::deliver(&state.integrations, email::payment_receipt(&invoice)).await;
        }
        Some(PaymentRecorded::Unchanged(invoice)) => {
            info!("Invoice {} was already paid", invoice.get_invoice_number());
        }
        None => warn!("Payment for unknown invoice {}", invoice_id),
    }
    Ok(())
}
