use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::dto::{ContractListQuery, CountersignDto, CreateContractDto, ReplaceFieldsDto, SignContractDto};
use crate::errors::ApiError;
use crate::models::{Contract, SignatureField};
use crate::repo;
use crate::services::contracts;
use crate::state::AppState;

/// A contract with its signature layout
#[derive(Debug, Serialize)]
pub struct ContractDetail {
    #[serde(flatten)]
    pub contract: Contract,
    pub fields: Vec<SignatureField>,
}

fn contract_detail(state: &AppState, contract: Contract) -> Result<ContractDetail, ApiError> {
    let fields = repo::get_signature_fields(&state.pool, &contract.get_id()).map_err(ApiError::Database)?;
    Ok(ContractDetail { contract, fields })
}

fn find_contract(state: &AppState, id: &str) -> Result<Contract, ApiError> {
    repo::get_contract(&state.pool, id)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Contract"))
}

fn find_by_token(state: &AppState, token: &str) -> Result<Contract, ApiError> {
    repo::get_contract_by_token(&state.pool, token)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Contract"))
}

fn pdf_response(bytes: Vec<u8>, filename: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, format!("inline; filename=\"{}\"", filename)),
        ],
        bytes,
    )
        .into_response()
}

fn file_stem(contract: &Contract) -> String {
    let stem: String = contract
        .get_title()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let stem = stem.trim_matches('-');
    if stem.is_empty() { "contract".to_string() } else { stem.to_string() }
}

/// The client address as reported by the proxy in front of the service
fn client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok());
    let real = headers.get("x-real-ip").and_then(|v| v.to_str().ok());
    forwarded
        .and_then(|v| v.split(',').next())
        .or(real)
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

// Admin

/// Handler for uploading a contract
///
/// This function handles POST requests to `/api/admin/contracts`.
///
/// ### Arguments
///
/// * `state` - The shared application state
/// * `payload` - Title, signer and the base64 encoded PDF
///
/// ### Returns
///
/// The DRAFT contract with status 201
#[instrument(skip(state, payload))]
pub async fn create_contract_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateContractDto>,
) -> Result<(StatusCode, Json<Contract>), ApiError> {
    let contract = contracts::create_contract_with_document(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(contract)))
}

#[instrument(skip(state))]
pub async fn list_contracts_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContractListQuery>,
) -> Result<Json<Vec<Contract>>, ApiError> {
    let contracts = repo::list_contracts(&state.pool, query.status).map_err(ApiError::Database)?;
    debug!("Listing {} contracts", contracts.len());
    Ok(Json(contracts))
}

#[instrument(skip(state))]
pub async fn get_contract_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ContractDetail>, ApiError> {
    let contract = find_contract(&state, &id)?;
    Ok(Json(contract_detail(&state, contract)?))
}

/// Handler for laying out signature boxes
///
/// This function handles PUT requests to `/api/admin/contracts/{id}/fields`.
/// The submitted fields replace every existing one.
#[instrument(skip(state, payload), fields(count = payload.fields.len()))]
pub async fn replace_fields_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<ReplaceFieldsDto>,
) -> Result<Json<Vec<SignatureField>>, ApiError> {
    let fields = contracts::replace_fields(&state, &id, payload)?;
    Ok(Json(fields))
}

/// Handler for sending the signing link
///
/// This function handles POST requests to `/api/admin/contracts/{id}/send`.
#[instrument(skip(state))]
pub async fn send_contract_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Contract>, ApiError> {
    let contract = contracts::send_contract(&state, &id).await?;
    Ok(Json(contract))
}

/// Handler for the admin countersignature
///
/// This function handles POST requests to
/// `/api/admin/contracts/{id}/countersign`.
#[instrument(skip(state, payload))]
pub async fn countersign_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<CountersignDto>,
) -> Result<Json<Contract>, ApiError> {
    let contract = contracts::countersign(&state, &id, payload).await?;
    Ok(Json(contract))
}

#[instrument(skip(state))]
pub async fn cancel_contract_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Contract>, ApiError> {
    let contract = contracts::cancel_contract(&state, &id)?;
    Ok(Json(contract))
}

/// Handler for the signed document, as seen by the admin
///
/// This function handles GET requests to
/// `/api/admin/contracts/{id}/signed-pdf`.
#[instrument(skip(state))]
pub async fn admin_signed_pdf_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let contract = find_contract(&state, &id)?;
    let bytes = contracts::render_signed_pdf(&state, &contract).await?;
    Ok(pdf_response(bytes, &format!("{}-signed.pdf", file_stem(&contract))))
}

// Public, addressed by access token

/// Handler for the signer's view of a contract
///
/// This function handles GET requests to `/api/contracts/{token}`.
#[instrument(skip_all)]
pub async fn public_contract_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<ContractDetail>, ApiError> {
    let contract = find_by_token(&state, &token)?;
    Ok(Json(contract_detail(&state, contract)?))
}

#[instrument(skip_all)]
pub async fn public_pdf_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Response, ApiError> {
    let contract = find_by_token(&state, &token)?;
    let bytes = contracts::load_document(&state, &contract).await?;
    Ok(pdf_response(bytes, &format!("{}.pdf", file_stem(&contract))))
}

#[instrument(skip_all)]
pub async fn public_signed_pdf_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Response, ApiError> {
    let contract = find_by_token(&state, &token)?;
    let bytes = contracts::render_signed_pdf(&state, &contract).await?;
    Ok(pdf_response(bytes, &format!("{}-signed.pdf", file_stem(&contract))))
}

/// Handler for the signer submitting a signature
///
/// This function handles POST requests to `/api/contracts/{token}/sign`.
///
/// ### Arguments
///
/// * `state` - The shared application state
/// * `token` - The contract's access token from the signing link
/// * `headers` - Used to record the signer's address
/// * `payload` - The drawn signature, legal name and optional field id
///
/// ### Returns
///
/// The contract, SIGNED once no client field is left unsigned
#[instrument(skip_all)]
pub async fn sign_contract_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<SignContractDto>,
) -> Result<Json<Contract>, ApiError> {
    let contract = contracts::sign(&state, &token, payload, client_ip(&headers)).await?;
    Ok(Json(contract))
}
