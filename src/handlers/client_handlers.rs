use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::dto::{ClientListQuery, CreateClientDto, CreateRecurringChargeDto, UpdateClientDto};
use crate::errors::ApiError;
use crate::models::{Client, RecurringCharge, DEFAULT_PAYMENT_TERMS_DAYS};
use crate::repo::{self, ClientChanges};
use crate::state::AppState;

/// Handler for adding a service client
///
/// This function handles POST requests to `/api/admin/clients`.
///
/// ### Arguments
///
/// * `state` - The shared application state
/// * `payload` - Contact details, payment terms and autopay settings
///
/// ### Returns
///
/// The created client with status 201
#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn create_client_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateClientDto>,
) -> Result<(StatusCode, Json<Client>), ApiError> {
    payload.validate().map_err(ApiError::BadRequest)?;
    let client = Client::new(payload.name.trim().to_string(), payload.email.trim().to_string())
        .with_contact(payload.company, payload.phone, payload.address)
        .with_payment_terms_days(payload.payment_terms_days.unwrap_or(DEFAULT_PAYMENT_TERMS_DAYS))
        .with_autopay(payload.autopay_enabled, payload.stripe_customer_id, payload.stripe_payment_method_id);
    let client = repo::create_client(&state.pool, client).map_err(ApiError::Database)?;
    Ok((StatusCode::CREATED, Json(client)))
}

/// Handler for listing clients
///
/// This function handles GET requests to `/api/admin/clients`. Inactive
/// clients are listed only with `include_inactive=true`.
#[instrument(skip(state))]
pub async fn list_clients_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ClientListQuery>,
) -> Result<Json<Vec<Client>>, ApiError> {
    let clients = repo::list_clients(&state.pool, query.include_inactive).map_err(ApiError::Database)?;
    Ok(Json(clients))
}

#[instrument(skip(state))]
pub async fn get_client_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Client>, ApiError> {
    let client = repo::get_client(&state.pool, &id)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Client"))?;
    Ok(Json(client))
}

/// Handler for editing a client
///
/// This function handles PUT requests to `/api/admin/clients/{id}`.
#[instrument(skip(state, payload))]
pub async fn update_client_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateClientDto>,
) -> Result<Json<Client>, ApiError> {
    payload.validate().map_err(ApiError::BadRequest)?;
    let changes = ClientChanges {
        name: payload.name.map(|n| n.trim().to_string()),
        email: payload.email.map(|e| e.trim().to_string()),
        company: payload.company.map(Some),
        phone: payload.phone.map(Some),
        address: payload.address.map(Some),
        payment_terms_days: payload.payment_terms_days,
        autopay_enabled: payload.autopay_enabled,
        stripe_customer_id: payload.stripe_customer_id.map(Some),
        stripe_payment_method_id: payload.stripe_payment_method_id.map(Some),
        active: payload.active,
    };
    let client = repo::update_client(&state.pool, &id, changes)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Client"))?;
    info!("Updated client {}", client.get_id());
    Ok(Json(client))
}

/// Handler for adding a monthly charge to a client
///
/// This function handles POST requests to
/// `/api/admin/clients/{id}/recurring-charges`.
#[instrument(skip(state, payload))]
pub async fn create_recurring_charge_handler(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    Json(payload): Json<CreateRecurringChargeDto>,
) -> Result<(StatusCode, Json<RecurringCharge>), ApiError> {
    payload.validate().map_err(ApiError::BadRequest)?;
    repo::get_client(&state.pool, &client_id)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Client"))?;
    let charge = RecurringCharge::new(&client_id, payload.description.trim().to_string(), payload.amount_cents);
    let charge = repo::add_recurring_charge(&state.pool, charge).map_err(ApiError::Database)?;
    Ok((StatusCode::CREATED, Json(charge)))
}

/// Handler for a client's active recurring charges
///
/// This function handles GET requests to
/// `/api/admin/clients/{id}/recurring-charges`.
#[instrument(skip(state))]
pub async fn list_recurring_charges_handler(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
) -> Result<Json<Vec<RecurringCharge>>, ApiError> {
    let charges = repo::list_recurring_charges(&state.pool, &client_id, true).map_err(ApiError::Database)?;
    Ok(Json(charges))
}

/// Handler for stopping a recurring charge
///
/// This function handles DELETE requests to `/api/admin/recurring-charges/{id}`.
/// The charge is deactivated; invoices already billed keep their lines.
#[instrument(skip(state))]
pub async fn delete_recurring_charge_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !repo::deactivate_recurring_charge(&state.pool, &id).map_err(ApiError::Database)? {
        return Err(ApiError::NotFound("Recurring charge"));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::create_app;
    use crate::test_utils::{admin_request, body_json, setup_test_db, test_harness};
    use axum::http::StatusCode;
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_client_and_charges() {
        let harness = test_harness(setup_test_db());
        let app = create_app(harness.state);

        let created = app
            .clone()
            .oneshot(admin_request("POST", "/api/admin/clients", Some(json!({
                "name": "Harbor Marine",
                "email": "ops@harbor.test",
                "company": "Harbor Marine LLC"
            }))))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let client = body_json(created).await;
        assert_eq!(client["payment_terms_days"], 15);
        let id = client["id"].as_str().unwrap().to_string();

        let bad = app
            .clone()
            .oneshot(admin_request("POST", "/api/admin/clients", Some(json!({"name": "X", "email": "nope"}))))
            .await
            .unwrap();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let charge = app
            .clone()
            .oneshot(admin_request(
                "POST",
                &format!("/api/admin/clients/{}/recurring-charges", id),
                Some(json!({"description": "Hosting", "amount_cents": 5_000})),
            ))
            .await
            .unwrap();
        assert_eq!(charge.status(), StatusCode::CREATED);
        let charge_id = body_json(charge).await["id"].as_str().unwrap().to_string();

        let removed = app
            .clone()
            .oneshot(admin_request("DELETE", &format!("/api/admin/recurring-charges/{}", charge_id), None))
            .await
            .unwrap();
        assert_eq!(removed.status(), StatusCode::NO_CONTENT);

        let charges = app
            .clone()
            .oneshot(admin_request("GET", &format!("/api/admin/clients/{}/recurring-charges", id), None))
            .await
            .unwrap();
        assert!(body_json(charges).await.as_array().unwrap().is_empty());

        let updated = app
            .oneshot(admin_request("PUT", &format!("/api/admin/clients/{}", id), Some(json!({"payment_terms_days": 30}))))
            .await
            .unwrap();
        assert_eq!(body_json(updated).await["payment_terms_days"], 30);
    }

    #[tokio::test]
    async fn test_charge_for_unknown_client() {
        let harness = test_harness(setup_test_db());
        let app = create_app(harness.state);

        let response = app
            .oneshot(admin_request(
                "POST",
                "/api/admin/clients/missing/recurring-charges",
                Some(json!({"description": "Hosting", "amount_cents": 5_000})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
