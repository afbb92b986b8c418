use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ContractStatus, SignatureParty};
use crate::auth::generate_token;

/// Represents a contract sent out for e-signature
///
/// The PDF itself lives on disk at `document_path`. Contracts created
/// before signature fields existed carry a single client signature in the
/// `legacy_*` columns.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::contracts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Contract {
    id: String,
    title: String,
    client_id: Option<String>,
    signer_name: Option<String>,
    signer_email: String,
    status: ContractStatus,
    #[serde(skip_serializing, default)]
    document_path: String,
    #[serde(skip_serializing, default)]
    access_token: String,
    #[serde(skip_serializing, default)]
    legacy_signature_data: Option<String>,
    legacy_signed_name: Option<String>,
    #[serde(skip_serializing, default)]
    admin_signature_data: Option<String>,
    admin_signed_name: Option<String>,
    signed_at: Option<NaiveDateTime>,
    countersigned_at: Option<NaiveDateTime>,
    signer_ip: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl Contract {
    /// Creates a new DRAFT contract
    ///
    /// ### Arguments
    ///
    /// * `id` - The contract id, chosen before the PDF is written to disk
    /// * `title` - A human-readable title
    /// * `signer_email` - Who receives the signing link
    /// * `document_path` - Where the original PDF is stored
    pub fn new(id: String, title: String, signer_email: String, document_path: String) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id,
            title,
            client_id: None,
            signer_name: None,
            signer_email,
            status: ContractStatus::Draft,
            document_path,
            access_token: generate_token(),
            legacy_signature_data: None,
            legacy_signed_name: None,
            admin_signature_data: None,
            admin_signed_name: None,
            signed_at: None,
            countersigned_at: None,
            signer_ip: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_signer(mut self, client_id: Option<String>, signer_name: Option<String>) -> Self {
        self.client_id = client_id;
        self.signer_name = signer_name;
        self
    }

    pub fn get_id(&self) -> String {
        self.id.clone()
    }

    pub fn get_title(&self) -> String {
        self.title.clone()
    }

    pub fn get_client_id(&self) -> Option<String> {
        self.client_id.clone()
    }

    pub fn get_signer_name(&self) -> Option<String> {
        self.signer_name.clone()
    }

    pub fn get_signer_email(&self) -> String {
        self.signer_email.clone()
    }

    pub fn get_status(&self) -> ContractStatus {
        self.status
    }

    pub fn get_document_path(&self) -> String {
        self.document_path.clone()
    }

    pub fn get_access_token(&self) -> String {
        self.access_token.clone()
    }

    pub fn get_legacy_signature_data(&self) -> Option<String> {
        self.legacy_signature_data.clone()
    }

    pub fn get_legacy_signed_name(&self) -> Option<String> {
        self.legacy_signed_name.clone()
    }

    pub fn get_admin_signature_data(&self) -> Option<String> {
        self.admin_signature_data.clone()
    }

    pub fn get_admin_signed_name(&self) -> Option<String> {
        self.admin_signed_name.clone()
    }

    pub fn get_signed_at(&self) -> Option<DateTime<Utc>> {
        self.signed_at.map(|t| DateTime::from_naive_utc_and_offset(t, Utc))
    }

    pub fn get_countersigned_at(&self) -> Option<DateTime<Utc>> {
        self.countersigned_at.map(|t| DateTime::from_naive_utc_and_offset(t, Utc))
    }

    pub fn get_signer_ip(&self) -> Option<String> {
        self.signer_ip.clone()
    }

    pub fn get_created_at(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.created_at, Utc)
    }

    pub fn get_updated_at(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.updated_at, Utc)
    }
}

/// A region on a contract page where one party signs
///
/// Coordinates are percentages of the page size measured from the top-left
/// corner, as placed in the browser editor.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::signature_fields)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SignatureField {
    pub id: String,
    pub contract_id: String,
    pub party: SignatureParty,
    pub page_index: i32,
    pub x_pct: f64,
    pub y_pct: f64,
    pub width_pct: f64,
    pub height_pct: f64,
    #[serde(skip_serializing, default)]
    pub signature_data: Option<String>,
    pub signed_name: Option<String>,
    pub signed_at: Option<NaiveDateTime>,
}

impl SignatureField {
    pub fn new(contract_id: &str, party: SignatureParty, page_index: i32, x_pct: f64, y_pct: f64, width_pct: f64, height_pct: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            contract_id: contract_id.to_string(),
            party,
            page_index,
            x_pct,
            y_pct,
            width_pct,
            height_pct,
            signature_data: None,
            signed_name: None,
            signed_at: None,
        }
    }

    pub fn is_signed(&self) -> bool {
        self.signature_data.as_deref().is_some_and(|data| !data.is_empty())
    }

    /// Checks that the field lies on a page and inside its bounds
    pub fn validate(&self) -> Result<(), String> {
        if self.page_index < 0 {
            return Err("page_index must not be negative".to_string());
        }
        let values = [self.x_pct, self.y_pct, self.width_pct, self.height_pct];
        if values.iter().any(|v| !v.is_finite() || *v < 0.0 || *v > 100.0) {
            return Err("field coordinates must be percentages between 0 and 100".to_string());
        }
        if self.width_pct == 0.0 || self.height_pct == 0.0 {
            return Err("field width and height must be positive".to_string());
        }
        if self.x_pct + self.width_pct > 100.0 || self.y_pct + self.height_pct > 100.0 {
            return Err("field extends past the page edge".to_string());
        }
        Ok(())
    }
}
