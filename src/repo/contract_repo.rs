use crate::db::DbPool;
use crate::models::{Contract, ContractStatus, SignatureField, SignatureParty};
use crate::schema::{contracts, signature_fields};
use anyhow::Result;
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use tracing::{debug, info, instrument};

/// A captured signature and the name typed beside it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInput {
    pub signature_data: String,
    pub signed_name: String,
}

/// Result of a signer submitting a signature
#[derive(Debug, Clone, PartialEq)]
pub enum SignOutcome {
    /// Every client field is signed and the contract is SIGNED
    Completed(Contract),
    /// The signature was stored but client fields remain unsigned
    Partial(Contract),
    /// The requested field is not a client field of this contract
    UnknownField,
    /// Only SENT contracts take signatures
    NotOpen(ContractStatus),
}

#[instrument(skip(pool, contract), fields(contract_id = %contract.get_id()))]
pub fn create_contract(pool: &DbPool, contract: Contract) -> Result<Contract> {
    let conn = &mut pool.get()?;
    diesel::insert_into(contracts::table)
        .values(&contract)
        .execute(conn)?;
    info!("Created contract {}", contract.get_title());
    Ok(contract)
}

pub fn get_contract(pool: &DbPool, contract_id: &str) -> Result<Option<Contract>> {
    let conn = &mut pool.get()?;
    let contract = contracts::table
        .find(contract_id)
        .first::<Contract>(conn)
        .optional()?;
    Ok(contract)
}

pub fn get_contract_by_token(pool: &DbPool, token: &str) -> Result<Option<Contract>> {
    let conn = &mut pool.get()?;
    let contract = contracts::table
        .filter(contracts::access_token.eq(token))
        .first::<Contract>(conn)
        .optional()?;
    Ok(contract)
}

pub fn list_contracts(pool: &DbPool, status: Option<ContractStatus>) -> Result<Vec<Contract>> {
    let conn = &mut pool.get()?;
    let mut query = contracts::table.into_boxed();
    if let Some(status) = status {
        query = query.filter(contracts::status.eq(status));
    }
    let result = query
        .order(contracts::created_at.desc())
        .load::<Contract>(conn)?;
    debug!("Listed {} contracts", result.len());
    Ok(result)
}

/// Signature fields of a contract in page order
pub fn get_signature_fields(pool: &DbPool, contract_id: &str) -> Result<Vec<SignatureField>> {
    let conn = &mut pool.get()?;
    let fields = signature_fields::table
        .filter(signature_fields::contract_id.eq(contract_id))
        .order((signature_fields::page_index.asc(), signature_fields::y_pct.asc()))
        .load::<SignatureField>(conn)?;
    Ok(fields)
}

/// Replaces every signature field of a contract
///
/// ### Arguments
///
/// * `pool` - A reference to the database connection pool
/// * `contract_id` - The contract being laid out
/// * `fields` - The new fields, already validated
#[instrument(skip(pool, fields), fields(count = fields.len()))]
pub fn replace_signature_fields(pool: &DbPool, contract_id: &str, fields: Vec<SignatureField>) -> Result<Vec<SignatureField>> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        diesel::delete(signature_fields::table.filter(signature_fields::contract_id.eq(contract_id))).execute(conn)?;
        if !fields.is_empty() {
            diesel::insert_into(signature_fields::table)
                .values(&fields)
                .execute(conn)?;
        }
        diesel::update(contracts::table.find(contract_id))
            .set(contracts::updated_at.eq(Utc::now().naive_utc()))
            .execute(conn)?;
        Ok::<_, diesel::result::Error>(())
    })?;
    info!("Contract {} now has {} signature field(s)", contract_id, fields.len());
    Ok(fields)
}

/// Sets a contract's status
pub fn set_contract_status(pool: &DbPool, contract_id: &str, status: ContractStatus) -> Result<Option<Contract>> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        let updated = diesel::update(contracts::table.find(contract_id))
            .set((
                contracts::status.eq(status),
                contracts::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        if updated == 0 {
            return Ok(None);
        }
        info!("Contract {} is now {}", contract_id, status);
        contracts::table.find(contract_id).first::<Contract>(conn).optional()
    })
    .map_err(Into::into)
}

/// Cancels a contract unless it has been signed
///
/// Returns the contract as stored afterwards; a SIGNED contract comes back
/// unchanged.
#[instrument(skip(pool))]
pub fn cancel_unsigned_contract(pool: &DbPool, contract_id: &str) -> Result<Option<Contract>> {
    let conn = &mut pool.get()?;
    conn.immediate_transaction(|conn| {
        let Some(contract) = contracts::table.find(contract_id).first::<Contract>(conn).optional()? else {
            return Ok(None);
        };
        if matches!(contract.get_status(), ContractStatus::Signed | ContractStatus::Cancelled) {
            return Ok(Some(contract));
        }
        diesel::update(contracts::table.find(contract_id))
            .set((
                contracts::status.eq(ContractStatus::Cancelled),
                contracts::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        info!("Contract {} cancelled", contract_id);
        contracts::table.find(contract_id).first::<Contract>(conn).optional()
    })
    .map_err(Into::into)
}

fn sign_fields(
    conn: &mut SqliteConnection,
    field_ids: &[String],
    signature: &SignatureInput,
    now: NaiveDateTime,
) -> QueryResult<usize> {
    diesel::update(signature_fields::table.filter(signature_fields::id.eq_any(field_ids)))
        .set((
            signature_fields::signature_data.eq(Some(signature.signature_data.as_str())),
            signature_fields::signed_name.eq(Some(signature.signed_name.as_str())),
            signature_fields::signed_at.eq(Some(now)),
        ))
        .execute(conn)
}

/// Stores the signer's signature and completes the contract when no client
/// field is left unsigned
///
/// With `field_id` only that client field is signed; otherwise every unsigned
/// client field is. A contract without client fields keeps the signature in
/// its legacy columns.
///
/// The status is checked under the write lock, so a contract cancelled or
/// completed by another request is reported as [`SignOutcome::NotOpen`].
#[instrument(skip(pool, signature))]
pub fn sign_contract(
    pool: &DbPool,
    contract_id: &str,
    signature: &SignatureInput,
    field_id: Option<&str>,
    signer_ip: Option<&str>,
) -> Result<SignOutcome> {
    let conn = &mut pool.get()?;
    conn.immediate_transaction(|conn| {
        let status = contracts::table
            .find(contract_id)
            .select(contracts::status)
            .first::<ContractStatus>(conn)?;
        if status != ContractStatus::Sent {
            return Ok(SignOutcome::NotOpen(status));
        }

        let now = Utc::now().naive_utc();
        let client_fields = signature_fields::table
            .filter(signature_fields::contract_id.eq(contract_id))
            .filter(signature_fields::party.eq(SignatureParty::Client))
            .load::<SignatureField>(conn)?;

        if client_fields.is_empty() {
            diesel::update(contracts::table.find(contract_id))
                .set((
                    contracts::legacy_signature_data.eq(Some(signature.signature_data.as_str())),
                    contracts::legacy_signed_name.eq(Some(signature.signed_name.as_str())),
                ))
                .execute(conn)?;
        } else {
            let targets: Vec<String> = match field_id {
                Some(id) => match client_fields.iter().find(|f| f.id == id) {
                    Some(field) => vec![field.id.clone()],
                    None => return Ok(SignOutcome::UnknownField),
                },
                None => client_fields.iter().filter(|f| !f.is_signed()).map(|f| f.id.clone()).collect(),
            };
            let signed = sign_fields(conn, &targets, signature, now)?;
            debug!("Signed {} field(s) on contract {}", signed, contract_id);
        }

        let unsigned: i64 = signature_fields::table
            .filter(signature_fields::contract_id.eq(contract_id))
            .filter(signature_fields::party.eq(SignatureParty::Client))
            .filter(signature_fields::signature_data.is_null())
            .count()
            .get_result(conn)?;

        if unsigned > 0 {
            diesel::update(contracts::table.find(contract_id))
                .set(contracts::updated_at.eq(now))
                .execute(conn)?;
            let contract = contracts::table.find(contract_id).first::<Contract>(conn)?;
            return Ok(SignOutcome::Partial(contract));
        }

        diesel::update(contracts::table.find(contract_id))
            .set((
                contracts::status.eq(ContractStatus::Signed),
                contracts::signer_name.eq(Some(signature.signed_name.as_str())),
                contracts::signed_at.eq(Some(now)),
                contracts::signer_ip.eq(signer_ip),
                contracts::updated_at.eq(now),
            ))
            .execute(conn)?;
        let contract = contracts::table.find(contract_id).first::<Contract>(conn)?;
        info!("Contract {} signed by {}", contract_id, signature.signed_name);
        Ok(SignOutcome::Completed(contract))
    })
}

/// Stores the admin's countersignature
///
/// The admin columns always record it and any unsigned ADMIN field receives
/// it as well.
#[instrument(skip(pool, signature))]
pub fn countersign_contract(pool: &DbPool, contract_id: &str, signature: &SignatureInput) -> Result<Option<Contract>> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        let now = Utc::now().naive_utc();
        let admin_fields: Vec<String> = signature_fields::table
            .filter(signature_fields::contract_id.eq(contract_id))
            .filter(signature_fields::party.eq(SignatureParty::Admin))
            .filter(signature_fields::signature_data.is_null())
            .select(signature_fields::id)
            .load(conn)?;
        if !admin_fields.is_empty() {
            sign_fields(conn, &admin_fields, signature, now)?;
        }

        let updated = diesel::update(contracts::table.find(contract_id))
            .set((
                contracts::admin_signature_data.eq(Some(signature.signature_data.as_str())),
                contracts::admin_signed_name.eq(Some(signature.signed_name.as_str())),
                contracts::countersigned_at.eq(Some(now)),
                contracts::updated_at.eq(now),
            ))
            .execute(conn)?;
        if updated == 0 {
            return Ok(None);
        }
        info!("Contract {} countersigned", contract_id);
        contracts::table.find(contract_id).first::<Contract>(conn).optional()
    })
    .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_db;

    const PNG: &str = "data:image/png;base64,iVBORw0KGgo=";

    fn seed_contract(pool: &DbPool) -> Contract {
        let id = uuid::Uuid::new_v4().to_string();
        let contract = Contract::new(id.clone(), "Website build".to_string(), "sam@client.test".to_string(), format!("contracts/{}.pdf", id));
        let contract = create_contract(pool, contract).unwrap();
        set_contract_status(pool, &contract.get_id(), ContractStatus::Sent).unwrap().unwrap()
    }

    fn signature() -> SignatureInput {
        SignatureInput { signature_data: PNG.to_string(), signed_name: "Sam Client".to_string() }
    }

    #[test]
    fn test_sign_without_fields_uses_legacy_columns() {
        let pool = setup_test_db();
        let contract = seed_contract(&pool);

        let outcome = sign_contract(&pool, &contract.get_id(), &signature(), None, Some("10.0.0.1")).unwrap();

        let SignOutcome::Completed(signed) = outcome else { panic!("expected completion") };
        assert_eq!(signed.get_status(), ContractStatus::Signed);
        assert_eq!(signed.get_legacy_signature_data().as_deref(), Some(PNG));
        assert_eq!(signed.get_legacy_signed_name().as_deref(), Some("Sam Client"));
        assert_eq!(signed.get_signer_ip().as_deref(), Some("10.0.0.1"));
        assert!(signed.get_signed_at().is_some());
    }

    #[test]
    fn test_sign_one_field_at_a_time() {
        let pool = setup_test_db();
        let contract = seed_contract(&pool);
        let first = SignatureField::new(&contract.get_id(), SignatureParty::Client, 0, 10.0, 70.0, 30.0, 8.0);
        let second = SignatureField::new(&contract.get_id(), SignatureParty::Client, 1, 10.0, 70.0, 30.0, 8.0);
        let admin = SignatureField::new(&contract.get_id(), SignatureParty::Admin, 1, 60.0, 70.0, 30.0, 8.0);
        replace_signature_fields(&pool, &contract.get_id(), vec![first.clone(), second.clone(), admin.clone()]).unwrap();

        let partial = sign_contract(&pool, &contract.get_id(), &signature(), Some(&first.id), None).unwrap();
        assert!(matches!(partial, SignOutcome::Partial(ref c) if c.get_status() == ContractStatus::Sent));

        let unknown = sign_contract(&pool, &contract.get_id(), &signature(), Some(&admin.id), None).unwrap();
        assert_eq!(unknown, SignOutcome::UnknownField);

        let done = sign_contract(&pool, &contract.get_id(), &signature(), Some(&second.id), None).unwrap();
        assert!(matches!(done, SignOutcome::Completed(ref c) if c.get_status() == ContractStatus::Signed));

        let fields = get_signature_fields(&pool, &contract.get_id()).unwrap();
        assert_eq!(fields.iter().filter(|f| f.is_signed()).count(), 2);
        assert!(fields.iter().all(|f| f.party == SignatureParty::Client || !f.is_signed()));
    }

    #[test]
    fn test_sign_all_unsigned_fields_at_once() {
        let pool = setup_test_db();
        let contract = seed_contract(&pool);
        let fields = vec![
            SignatureField::new(&contract.get_id(), SignatureParty::Client, 0, 10.0, 70.0, 30.0, 8.0),
            SignatureField::new(&contract.get_id(), SignatureParty::Client, 2, 10.0, 70.0, 30.0, 8.0),
        ];
        replace_signature_fields(&pool, &contract.get_id(), fields).unwrap();

        let outcome = sign_contract(&pool, &contract.get_id(), &signature(), None, None).unwrap();

        assert!(matches!(outcome, SignOutcome::Completed(_)));
        assert!(get_signature_fields(&pool, &contract.get_id()).unwrap().iter().all(|f| f.is_signed()));
    }

    #[test]
    fn test_sign_rechecks_status_before_writing() {
        let pool = setup_test_db();
        let cancelled = seed_contract(&pool);
        cancel_unsigned_contract(&pool, &cancelled.get_id()).unwrap();

        let outcome = sign_contract(&pool, &cancelled.get_id(), &signature(), None, None).unwrap();
        assert_eq!(outcome, SignOutcome::NotOpen(ContractStatus::Cancelled));
        let stored = get_contract(&pool, &cancelled.get_id()).unwrap().unwrap();
        assert_eq!(stored.get_status(), ContractStatus::Cancelled);
        assert!(stored.get_legacy_signature_data().is_none());

        let contract = seed_contract(&pool);
        let first = sign_contract(&pool, &contract.get_id(), &signature(), None, None).unwrap();
        assert!(matches!(first, SignOutcome::Completed(_)));
        let second = sign_contract(&pool, &contract.get_id(), &signature(), None, None).unwrap();
        assert_eq!(second, SignOutcome::NotOpen(ContractStatus::Signed));
    }

    #[test]
    fn test_cancel_leaves_signed_contracts_alone() {
        let pool = setup_test_db();
        let contract = seed_contract(&pool);
        sign_contract(&pool, &contract.get_id(), &signature(), None, None).unwrap();

        let after = cancel_unsigned_contract(&pool, &contract.get_id()).unwrap().unwrap();
        assert_eq!(after.get_status(), ContractStatus::Signed);
        assert!(cancel_unsigned_contract(&pool, "missing").unwrap().is_none());
    }

    #[test]
    fn test_replace_fields_discards_previous_layout() {
        let pool = setup_test_db();
        let contract = seed_contract(&pool);
        let field = SignatureField::new(&contract.get_id(), SignatureParty::Client, 0, 10.0, 70.0, 30.0, 8.0);
        let other = SignatureField::new(&contract.get_id(), SignatureParty::Client, 1, 10.0, 70.0, 30.0, 8.0);
        replace_signature_fields(&pool, &contract.get_id(), vec![field, other]).unwrap();
        let replacement = SignatureField::new(&contract.get_id(), SignatureParty::Client, 0, 20.0, 80.0, 30.0, 8.0);
        replace_signature_fields(&pool, &contract.get_id(), vec![replacement]).unwrap();

        assert_eq!(get_signature_fields(&pool, &contract.get_id()).unwrap().len(), 1);
    }

    #[test]
    fn test_countersign() {
        let pool = setup_test_db();
        let contract = seed_contract(&pool);
        let admin = SignatureField::new(&contract.get_id(), SignatureParty::Admin, 0, 60.0, 70.0, 30.0, 8.0);
        replace_signature_fields(&pool, &contract.get_id(), vec![admin]).unwrap();

        let countersigned = countersign_contract(
            &pool,
            &contract.get_id(),
            &SignatureInput { signature_data: PNG.to_string(), signed_name: "47 Industries".to_string() },
        )
        .unwrap()
        .unwrap();

        assert!(countersigned.get_countersigned_at().is_some());
        assert_eq!(countersigned.get_admin_signed_name().as_deref(), Some("47 Industries"));
        assert!(get_signature_fields(&pool, &contract.get_id()).unwrap()[0].is_signed());
        assert!(countersign_contract(&pool, "missing", &signature()).unwrap().is_none());
    }

    #[test]
    fn test_list_by_status() {
        let pool = setup_test_db();
        let contract = seed_contract(&pool);
        set_contract_status(&pool, &contract.get_id(), ContractStatus::Cancelled).unwrap();

        assert_eq!(list_contracts(&pool, None).unwrap().len(), 1);
        assert!(list_contracts(&pool, Some(ContractStatus::Sent)).unwrap().is_empty());
        assert!(get_contract_by_token(&pool, &contract.get_access_token()).unwrap().is_some());
    }
}
