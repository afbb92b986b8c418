use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::dto::{CreateBankConnectionDto, MonthQuery};
use crate::errors::ApiError;
use crate::models::{BankConnection, BankTransaction};
use crate::repo;
use crate::services::bank_sync::{sync_all_connections, BankSyncSummary};
use crate::state::AppState;

/// Handler for linking a bank account
///
/// This function handles POST requests to `/api/admin/bank/connections`. The
/// access token is stored but never returned.
///
/// ### Arguments
///
/// * `state` - The shared application state
/// * `payload` - Institution name and the exchanged access token
///
/// ### Returns
///
/// The connection with status 201
#[instrument(skip(state, payload), fields(institution = %payload.institution_name))]
pub async fn create_bank_connection_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateBankConnectionDto>,
) -> Result<(StatusCode, Json<BankConnection>), ApiError> {
    payload.validate().map_err(ApiError::BadRequest)?;
    let connection = BankConnection::new(payload.institution_name.trim().to_string(), payload.access_token.trim().to_string());
    let connection = repo::create_bank_connection(&state.pool, connection).map_err(ApiError::Database)?;
    info!("Linked bank connection {}", connection.id);
    Ok((StatusCode::CREATED, Json(connection)))
}

#[instrument(skip(state))]
pub async fn list_bank_connections_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BankConnection>>, ApiError> {
    let connections = repo::list_bank_connections(&state.pool).map_err(ApiError::Database)?;
    Ok(Json(connections))
}

/// Handler for pulling new transactions from every connection
///
/// This function handles POST requests to `/api/admin/bank/sync`. Posted
/// outflows are then matched against pending bills.
#[instrument(skip(state))]
pub async fn bank_sync_handler(State(state): State<Arc<AppState>>) -> Result<Json<BankSyncSummary>, ApiError> {
    let summary = sync_all_connections(&state).await?;
    Ok(Json(summary))
}

#[instrument(skip(state))]
pub async fn list_bank_transactions_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MonthQuery>,
) -> Result<Json<Vec<BankTransaction>>, ApiError> {
    let range = query.range().map_err(ApiError::BadRequest)?;
    let transactions = repo::list_bank_transactions(&state.pool, range).map_err(ApiError::Database)?;
    Ok(Json(transactions))
}
