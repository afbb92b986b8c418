use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{info, instrument, warn};

use crate::dto::{CountersignDto, CreateContractDto, ReplaceFieldsDto, SignContractDto};
use crate::email;
use crate::errors::ApiError;
use crate::models::{Contract, ContractStatus, SignatureField};
use crate::pdf::composite_signatures;
use crate::repo::{
    countersign_contract, create_contract, get_contract, get_signature_fields, replace_signature_fields,
    cancel_unsigned_contract, set_contract_status, sign_contract, SignOutcome, SignatureInput,
};
use crate::state::AppState;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Where a contract's document lives, relative to the storage directory
pub fn document_path(contract_id: &str) -> String {
    format!("contracts/{}.pdf", contract_id)
}

fn absolute_path(state: &AppState, contract: &Contract) -> PathBuf {
    state.config.storage_dir.join(contract.get_document_path())
}

/// Decodes and checks an uploaded contract document
pub fn decode_pdf(pdf_base64: &str) -> Result<Vec<u8>, String> {
    let encoded = pdf_base64
        .trim()
        .strip_prefix("data:application/pdf;base64,")
        .unwrap_or(pdf_base64.trim());
    let bytes = STANDARD.decode(encoded).map_err(|e| format!("pdf_base64 is not valid base64: {}", e))?;
    if !bytes.starts_with(PDF_MAGIC) {
        return Err("pdf_base64 is not a PDF document".to_string());
    }
    Ok(bytes)
}

/// Stores the uploaded document and creates a DRAFT contract for it
#[instrument(skip(state, payload), fields(title = %payload.title))]
pub async fn create_contract_with_document(state: &AppState, payload: CreateContractDto) -> Result<Contract, ApiError> {
    payload.validate().map_err(ApiError::BadRequest)?;
    let bytes = decode_pdf(&payload.pdf_base64).map_err(ApiError::BadRequest)?;

    let id = uuid::Uuid::new_v4().to_string();
    let contract = Contract::new(id.clone(), payload.title.trim().to_string(), payload.signer_email.trim().to_string(), document_path(&id))
        .with_signer(payload.client_id, payload.signer_name);
    let path = absolute_path(state, &contract);
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await.map_err(|e| ApiError::Database(e.into()))?;
    }
    tokio::fs::write(&path, &bytes).await.map_err(|e| ApiError::Database(e.into()))?;
    info!("Stored contract document at {}", path.display());

    create_contract(&state.pool, contract).map_err(ApiError::Database)
}

/// Reads a contract's original document
pub async fn load_document(state: &AppState, contract: &Contract) -> Result<Vec<u8>, ApiError> {
    let path = absolute_path(state, contract);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Contract document missing at {}", path.display());
            Err(ApiError::NotFound("Contract document"))
        }
        Err(e) => Err(ApiError::Database(e.into())),
    }
}

/// Renders the document with every signature collected so far
pub async fn render_signed_pdf(state: &AppState, contract: &Contract) -> Result<Vec<u8>, ApiError> {
    let original = load_document(state, contract).await?;
    let fields = get_signature_fields(&state.pool, &contract.get_id()).map_err(ApiError::Database)?;
    composite_signatures(&original, contract, &fields).map_err(|e| ApiError::Database(e.into()))
}

pub fn sign_url(state: &AppState, contract: &Contract) -> String {
    format!("{}/contracts/{}", state.config.site_base(), contract.get_access_token())
}

/// Emails the signing link and moves a DRAFT contract to SENT
///
/// Sending a SENT contract again repeats the email.
#[instrument(skip(state))]
pub async fn send_contract(state: &AppState, contract_id: &str) -> Result<Contract, ApiError> {
    let contract = get_contract(&state.pool, contract_id)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Contract"))?;
    let contract = match contract.get_status() {
        ContractStatus::Draft => set_contract_status(&state.pool, contract_id, ContractStatus::Sent)
            .map_err(ApiError::Database)?
            .ok_or(ApiError::NotFound("Contract"))?,
        ContractStatus::Sent => contract,
        other => return Err(ApiError::Conflict(format!("Contract is {}", other))),
    };
    email::deliver(&state.integrations, email::contract_signing_request(&contract, &sign_url(state, &contract))).await;
    Ok(contract)
}

/// Records the signer's signature on a SENT contract
///
/// When the last client field is signed the contract becomes SIGNED and the
/// admin is told.
#[instrument(skip(state, token, payload))]
pub async fn sign(state: &AppState, token: &str, payload: SignContractDto, signer_ip: Option<String>) -> Result<Contract, ApiError> {
    payload.validate().map_err(ApiError::BadRequest)?;
    let contract = crate::repo::get_contract_by_token(&state.pool, token)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Contract"))?;

    let input = SignatureInput {
        signature_data: payload.signature_data,
        signed_name: payload.legal_name.trim().to_string(),
    };
    let outcome = sign_contract(&state.pool, &contract.get_id(), &input, payload.field_id.as_deref(), signer_ip.as_deref())
        .map_err(ApiError::Database)?;
    match outcome {
        SignOutcome::Completed(signed) => {
            match state.config.admin_email.as_deref() {
                Some(admin) => {
                    email::deliver(&state.integrations, email::contract_signed(&signed, admin)).await;
                }
                None => warn!("No admin email configured; contract {} signed", signed.get_id()),
            }
            Ok(signed)
        }
        SignOutcome::Partial(contract) => Ok(contract),
        SignOutcome::UnknownField => Err(ApiError::BadRequest("field_id is not a client signature field".to_string())),
        SignOutcome::NotOpen(status) => Err(ApiError::Conflict(format!("Contract is {}", status))),
    }
}

/// Adds the admin countersignature
pub async fn countersign(state: &AppState, contract_id: &str, payload: CountersignDto) -> Result<Contract, ApiError> {
    payload.validate().map_err(ApiError::BadRequest)?;
    let contract = get_contract(&state.pool, contract_id)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Contract"))?;
    if contract.get_status() == ContractStatus::Cancelled {
        return Err(ApiError::Conflict("Contract is CANCELLED".to_string()));
    }
    let input = SignatureInput {
        signature_data: payload.signature_data,
        signed_name: payload.legal_name.trim().to_string(),
    };
    countersign_contract(&state.pool, contract_id, &input)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Contract"))
}

/// Replaces a contract's signature fields while it is still open for signing
pub fn replace_fields(state: &AppState, contract_id: &str, payload: ReplaceFieldsDto) -> Result<Vec<SignatureField>, ApiError> {
    let contract = get_contract(&state.pool, contract_id)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Contract"))?;
    if matches!(contract.get_status(), ContractStatus::Signed | ContractStatus::Cancelled) {
        return Err(ApiError::Conflict(format!("Contract is {}", contract.get_status())));
    }
    let fields = payload
        .fields
        .iter()
        .map(|f| {
            let field = SignatureField::new(contract_id, f.party, f.page_index, f.x_pct, f.y_pct, f.width_pct, f.height_pct);
            field.validate().map(|_| field)
        })
        .collect::<Result<Vec<_>, String>>()
        .map_err(ApiError::BadRequest)?;
    replace_signature_fields(&state.pool, contract_id, fields).map_err(ApiError::Database)
}

/// Cancels any contract that is not yet signed
pub fn cancel_contract(state: &AppState, contract_id: &str) -> Result<Contract, ApiError> {
    let contract = cancel_unsigned_contract(&state.pool, contract_id)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Contract"))?;
    match contract.get_status() {
        ContractStatus::Signed => Err(ApiError::Conflict("Signed contracts cannot be cancelled".to_string())),
        _ => Ok(contract),
    }
}
