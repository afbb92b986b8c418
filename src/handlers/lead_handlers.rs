use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::auth::{header_secret, secrets_match};
use crate::dto::{InquiryQuery, LeadDto, UpdateInquiryStatusDto};
use crate::email;
use crate::errors::ApiError;
use crate::models::ServiceInquiry;
use crate::repo;
use crate::state::AppState;

const LEAD_SECRET_HEADER: &str = "x-webhook-secret";
const DEFAULT_SOURCE: &str = "webhook";

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Handler for inbound leads
///
/// This function handles POST requests to `/api/webhooks/leads`. The caller
/// proves itself with the `x-webhook-secret` header; each accepted lead is
/// stored once and announced to the admin by email.
///
/// ### Arguments
///
/// * `state` - The shared application state
/// * `headers` - Request headers carrying the shared secret
/// * `payload` - The contact form submission
///
/// ### Returns
///
/// The stored inquiry with status 201
#[instrument(skip_all)]
pub async fn lead_webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<LeadDto>,
) -> Result<(StatusCode, Json<ServiceInquiry>), ApiError> {
    if !secrets_match(
        header_secret(&headers, LEAD_SECRET_HEADER),
        state.config.lead_webhook_secret.as_deref(),
    ) {
        warn!("Rejected lead webhook without a valid secret");
        return Err(ApiError::Unauthorized);
    }
    payload.validate().map_err(ApiError::BadRequest)?;

    let source = non_blank(payload.source).unwrap_or_else(|| DEFAULT_SOURCE.to_string());
    let mut inquiry = ServiceInquiry::new(
        payload.name.trim().to_string(),
        payload.email.trim().to_string(),
        payload.message.trim().to_string(),
        source,
    );
    inquiry.phone = non_blank(payload.phone);
    inquiry.company = non_blank(payload.company);
    inquiry.service_type = non_blank(payload.service_type);
    inquiry.budget = non_blank(payload.budget);

    let inquiry = repo::create_inquiry(&state.pool, inquiry).map_err(ApiError::Database)?;
    info!("Stored inquiry {} from {}", inquiry.id, inquiry.source);

    match state.config.admin_email.as_deref() {
        Some(admin) => {
            email::deliver(&state.integrations, email::new_lead(&inquiry, admin)).await;
        }
        None => warn!("No admin email configured; inquiry {} not announced", inquiry.id),
    }
    Ok((StatusCode::CREATED, Json(inquiry)))
}

/// Handler for the admin inquiry list
///
/// This function handles GET requests to `/api/admin/inquiries`.
#[instrument(skip(state))]
pub async fn list_inquiries_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InquiryQuery>,
) -> Result<Json<Vec<ServiceInquiry>>, ApiError> {
    let inquiries = repo::list_inquiries(&state.pool, query.status).map_err(ApiError::Database)?;
    Ok(Json(inquiries))
}

#[instrument(skip(state, payload), fields(status = %payload.status))]
pub async fn update_inquiry_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateInquiryStatusDto>,
) -> Result<Json<ServiceInquiry>, ApiError> {
    let inquiry = repo::update_inquiry_status(&state.pool, &id, payload.status)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Inquiry"))?;
    Ok(Json(inquiry))
}
