use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::Query as MultiQuery;
use chrono::{Days, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::dto::{CreateInvoiceDto, InvoiceListQuery};
use crate::errors::ApiError;
use crate::models::{Invoice, InvoiceItem, InvoiceStatus, DEFAULT_PAYMENT_TERMS_DAYS};
use crate::repo::{self, NewInvoice, NewInvoiceLine};
use crate::services::recurring_invoices::send_invoice;
use crate::state::AppState;

/// An invoice together with its lines
#[derive(Debug, Serialize)]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
}

fn invoice_detail(state: &AppState, invoice: Invoice) -> Result<InvoiceDetail, ApiError> {
    let items = repo::get_invoice_items(&state.pool, &invoice.get_id()).map_err(ApiError::Database)?;
    Ok(InvoiceDetail { invoice, items })
}

fn find_invoice(state: &AppState, id: &str) -> Result<Invoice, ApiError> {
    repo::get_invoice(&state.pool, id)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Invoice"))
}

/// Handler for creating an invoice by hand
///
/// This function handles POST requests to `/api/admin/invoices`. Totals are
/// computed from the lines; the customer defaults to the client's name and
/// email, and the due date to the client's payment terms.
///
/// ### Arguments
///
/// * `state` - The shared application state
/// * `payload` - The lines and optional client, dates, tax rate and notes
///
/// ### Returns
///
/// The DRAFT invoice with its lines, with status 201
#[instrument(skip(state, payload), fields(items = payload.items.len()))]
pub async fn create_invoice_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateInvoiceDto>,
) -> Result<(StatusCode, Json<InvoiceDetail>), ApiError> {
    payload.validate().map_err(ApiError::BadRequest)?;

    let client = match payload.client_id.as_deref() {
        Some(client_id) => Some(
            repo::get_client(&state.pool, client_id)
                .map_err(ApiError::Database)?
                .ok_or(ApiError::NotFound("Client"))?,
        ),
        None => None,
    };
    let customer_name = payload
        .customer_name
        .filter(|n| !n.trim().is_empty())
        .or_else(|| client.as_ref().map(|c| c.get_name()))
        .ok_or_else(|| ApiError::BadRequest("customer_name is required without a client".to_string()))?;
    let customer_email = payload
        .customer_email
        .filter(|e| crate::dto::valid_email(e))
        .or_else(|| client.as_ref().map(|c| c.get_email()))
        .ok_or_else(|| ApiError::BadRequest("a valid customer_email is required without a client".to_string()))?;

    let issue_date = payload.issue_date.unwrap_or_else(|| Utc::now().date_naive());
    let terms = client.as_ref().map(|c| c.get_payment_terms_days()).unwrap_or(DEFAULT_PAYMENT_TERMS_DAYS);
    let due_date = payload
        .due_date
        .unwrap_or_else(|| issue_date.checked_add_days(Days::new(terms.max(0) as u64)).unwrap_or(issue_date));

    let (invoice, items) = repo::create_invoice(
        &state.pool,
        NewInvoice {
            client_id: client.map(|c| c.get_id()),
            customer_name: customer_name.trim().to_string(),
            customer_email: customer_email.trim().to_string(),
            issue_date,
            due_date,
            tax_bps: payload.tax_bps,
            notes: payload.notes,
            billing_period: None,
            lines: payload
                .items
                .into_iter()
                .map(|line| NewInvoiceLine {
                    description: line.description.trim().to_string(),
                    quantity: line.quantity,
                    unit_price_cents: line.unit_price_cents,
                })
                .collect(),
        },
    )
    .map_err(ApiError::Database)?;
    info!("Created invoice {}", invoice.get_invoice_number());
    Ok((StatusCode::CREATED, Json(InvoiceDetail { invoice, items })))
}

/// Handler for the admin invoice list
///
/// This function handles GET requests to `/api/admin/invoices`, filtered by
/// repeated `status` and by `client_id`.
#[instrument(skip(state))]
pub async fn list_invoices_handler(
    State(state): State<Arc<AppState>>,
    MultiQuery(query): MultiQuery<InvoiceListQuery>,
) -> Result<Json<Vec<Invoice>>, ApiError> {
    let invoices = repo::list_invoices(&state.pool, &query.status, query.client_id.as_deref())
        .map_err(ApiError::Database)?;
    Ok(Json(invoices))
}

#[instrument(skip(state))]
pub async fn get_invoice_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<InvoiceDetail>, ApiError> {
    let invoice = find_invoice(&state, &id)?;
    Ok(Json(invoice_detail(&state, invoice)?))
}

/// Handler for emailing an invoice with its pay link
///
/// This function handles POST requests to `/api/admin/invoices/{id}/send`.
/// A DRAFT invoice becomes SENT; paid or cancelled invoices are refused.
#[instrument(skip(state))]
pub async fn send_invoice_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Invoice>, ApiError> {
    let invoice = find_invoice(&state, &id)?;
    if matches!(invoice.get_status(), InvoiceStatus::Paid | InvoiceStatus::Cancelled) {
        return Err(ApiError::Conflict(format!("Invoice {} is {}", invoice.get_invoice_number(), invoice.get_status())));
    }
    let sent = send_invoice(&state, &invoice).await.map_err(ApiError::Database)?;
    Ok(Json(sent))
}

/// Handler for recording a payment received outside the checkout
///
/// This function handles POST requests to `/api/admin/invoices/{id}/mark-paid`.
#[instrument(skip(state))]
pub async fn mark_invoice_paid_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Invoice>, ApiError> {
    let invoice = find_invoice(&state, &id)?;
    if invoice.get_status() == InvoiceStatus::Cancelled {
        return Err(ApiError::Conflict(format!("Invoice {} is cancelled", invoice.get_invoice_number())));
    }
    let recorded = repo::mark_invoice_paid(&state.pool, &id, None)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Invoice"))?;
    Ok(Json(recorded.into_inner()))
}

/// Handler for cancelling an unpaid invoice
///
/// This function handles POST requests to `/api/admin/invoices/{id}/cancel`.
#[instrument(skip(state))]
pub async fn cancel_invoice_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Invoice>, ApiError> {
    let invoice = find_invoice(&state, &id)?;
    if invoice.get_status() == InvoiceStatus::Paid {
        return Err(ApiError::Conflict(format!("Invoice {} is already paid", invoice.get_invoice_number())));
    }
    let cancelled = repo::cancel_invoice(&state.pool, &id)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Invoice"))?;
    Ok(Json(cancelled))
}

/// Handler for the customer's view of an invoice
///
/// This function handles GET requests to `/api/invoices/{token}`.
#[instrument(skip_all)]
pub async fn public_invoice_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<InvoiceDetail>, ApiError> {
    let invoice = repo::get_invoice_by_token(&state.pool, &token)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Invoice"))?;
    Ok(Json(invoice_detail(&state, invoice)?))
}

#[cfg(test)]
mod tests {
    use crate::create_app;
    use crate::repo::get_invoice;
    use crate::test_utils::{admin_request, body_json, setup_test_db, test_harness};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_invoice_lifecycle() {
        let harness = test_harness(setup_test_db());
        let app = create_app(harness.state.clone());

        let created = app
            .clone()
            .oneshot(admin_request("POST", "/api/admin/invoices", Some(json!({
                "customer_name": "Dana Reyes",
                "customer_email": "dana@example.com",
                "issue_date": "2026-03-01",
                "tax_bps": 700,
                "items": [
                    {"description": "Logo design", "unit_price_cents": 40_000},
                    {"description": "Revisions", "quantity": 2, "unit_price_cents": 5_000}
                ]
            }))))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let invoice = body_json(created).await;
        assert_eq!(invoice["status"], "DRAFT");
        assert_eq!(invoice["subtotal_cents"], 50_000);
        assert_eq!(invoice["tax_cents"], 3_500);
        assert_eq!(invoice["total_cents"], 53_500);
        assert_eq!(invoice["due_date"], "2026-03-16");
        assert_eq!(invoice["items"].as_array().unwrap().len(), 2);
        assert!(invoice["invoice_number"].as_str().unwrap().starts_with("INV-2026-"));
        assert!(invoice.get("access_token").is_none());
        let id = invoice["id"].as_str().unwrap().to_string();

        let sent = app
            .clone()
            .oneshot(admin_request("POST", &format!("/api/admin/invoices/{}/send", id), None))
            .await
            .unwrap();
        assert_eq!(body_json(sent).await["status"], "SENT");
        assert_eq!(harness.mailer.sent.lock().unwrap().len(), 1);

        let token = get_invoice(&harness.state.pool, &id).unwrap().unwrap().get_access_token();
        let public = app
            .clone()
            .oneshot(Request::get(format!("/api/invoices/{}", token)).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(public).await["invoice_number"], invoice["invoice_number"]);

        let checkout = app
            .clone()
            .oneshot(Request::post(format!("/api/invoices/{}/checkout", token)).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(checkout.status(), StatusCode::OK);

        let paid = app
            .clone()
            .oneshot(admin_request("POST", &format!("/api/admin/invoices/{}/mark-paid", id), None))
            .await
            .unwrap();
        assert_eq!(body_json(paid).await["status"], "PAID");

        let cancel = app
            .clone()
            .oneshot(admin_request("POST", &format!("/api/admin/invoices/{}/cancel", id), None))
            .await
            .unwrap();
        assert_eq!(cancel.status(), StatusCode::CONFLICT);

        let not_payable = app
            .oneshot(Request::post(format!("/api/invoices/{}/checkout", token)).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(not_payable.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_invoice_requires_items_and_customer() {
        let harness = test_harness(setup_test_db());
        let app = create_app(harness.state);

        let no_items = app
            .clone()
            .oneshot(admin_request("POST", "/api/admin/invoices", Some(json!({
                "customer_name": "Dana", "customer_email": "dana@example.com", "items": []
            }))))
            .await
            .unwrap();
        assert_eq!(no_items.status(), StatusCode::BAD_REQUEST);

        let no_customer = app
            .oneshot(admin_request("POST", "/api/admin/invoices", Some(json!({
                "items": [{"description": "Work", "unit_price_cents": 100}]
            }))))
            .await
            .unwrap();
        assert_eq!(no_customer.status(), StatusCode::BAD_REQUEST);
    }
}
