use crate::db::DbPool;
use crate::models::{Client, RecurringCharge};
use crate::schema::{clients, recurring_charges};
use anyhow::Result;
use std::collections::HashMap;
use chrono::Utc;
use diesel::prelude::*;
use tracing::{debug, info, instrument};

/// Fields an admin may change on an existing client
#[derive(AsChangeset, Debug, Default, Clone)]
#[diesel(table_name = clients)]
pub struct ClientChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub company: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub address: Option<Option<String>>,
    pub payment_terms_days: Option<i32>,
    pub autopay_enabled: Option<bool>,
    pub stripe_customer_id: Option<Option<String>>,
    pub stripe_payment_method_id: Option<Option<String>>,
    pub active: Option<bool>,
}

#[instrument(skip(pool, client), fields(email = %client.get_email()))]
pub fn create_client(pool: &DbPool, client: Client) -> Result<Client> {
    let conn = &mut pool.get()?;
    diesel::insert_into(clients::table)
        .values(&client)
        .execute(conn)?;
    info!("Created client {}", client.get_id());
    Ok(client)
}

pub fn get_client(pool: &DbPool, client_id: &str) -> Result<Option<Client>> {
    let conn = &mut pool.get()?;
    let client = clients::table
        .find(client_id)
        .first::<Client>(conn)
        .optional()?;
    Ok(client)
}

/// Lists clients by name
///
/// ### Arguments
///
/// * `pool` - A reference to the database connection pool
/// * `include_inactive` - Whether to include deactivated clients
pub fn list_clients(pool: &DbPool, include_inactive: bool) -> Result<Vec<Client>> {
    let conn = &mut pool.get()?;
    let mut query = clients::table.into_boxed();
    if !include_inactive {
        query = query.filter(clients::active.eq(true));
    }
    let result = query.order(clients::name.asc()).load::<Client>(conn)?;
    debug!("Listed {} clients", result.len());
    Ok(result)
}

pub fn update_client(pool: &DbPool, client_id: &str, changes: ClientChanges) -> Result<Option<Client>> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        let updated = diesel::update(clients::table.find(client_id))
            .set((&changes, clients::updated_at.eq(Utc::now().naive_utc())))
            .execute(conn)?;
        if updated == 0 {
            return Ok(None);
        }
        info!("Updated client {}", client_id);
        clients::table.find(client_id).first::<Client>(conn).optional()
    })
    .map_err(Into::into)
}

/// Adds a recurring charge to a client
///
/// ### Errors
///
/// Fails when the client does not exist
pub fn add_recurring_charge(pool: &DbPool, charge: RecurringCharge) -> Result<RecurringCharge> {
    let conn = &mut pool.get()?;
    diesel::insert_into(recurring_charges::table)
        .values(&charge)
        .execute(conn)?;
    info!("Added recurring charge {} to client {}", charge.id, charge.client_id);
    Ok(charge)
}

/// Lists a client's recurring charges, oldest first
pub fn list_recurring_charges(pool: &DbPool, client_id: &str, active_only: bool) -> Result<Vec<RecurringCharge>> {
    let conn = &mut pool.get()?;
    let mut query = recurring_charges::table
        .filter(recurring_charges::client_id.eq(client_id))
        .into_boxed();
    if active_only {
        query = query.filter(recurring_charges::active.eq(true));
    }
    let result = query
        .order(recurring_charges::created_at.asc())
        .load::<RecurringCharge>(conn)?;
    Ok(result)
}

/// Stops billing a recurring charge
///
/// ### Returns
///
/// Whether the charge existed
pub fn deactivate_recurring_charge(pool: &DbPool, charge_id: &str) -> Result<bool> {
    let conn = &mut pool.get()?;
    let updated = diesel::update(recurring_charges::table.find(charge_id))
        .set(recurring_charges::active.eq(false))
        .execute(conn)?;
    if updated > 0 {
        info!("Deactivated recurring charge {}", charge_id);
    }
    Ok(updated > 0)
}

/// Active clients paired with their active recurring charges
///
/// Clients without any active charge are left out.
#[instrument(skip(pool))]
pub fn clients_with_recurring_charges(pool: &DbPool) -> Result<Vec<(Client, Vec<RecurringCharge>)>> {
    let conn = &mut pool.get()?;
    let active_clients = clients::table
        .filter(clients::active.eq(true))
        .order(clients::name.asc())
        .load::<Client>(conn)?;
    let client_ids: Vec<String> = active_clients.iter().map(Client::get_id).collect();
    let charges = recurring_charges::table
        .filter(recurring_charges::client_id.eq_any(&client_ids))
        .filter(recurring_charges::active.eq(true))
        .order(recurring_charges::created_at.asc())
        .load::<RecurringCharge>(conn)?;

    let mut by_client: HashMap<String, Vec<RecurringCharge>> = HashMap::new();
    for charge in charges {
        by_client.entry(charge.client_id.clone()).or_default().push(charge);
    }
    let result: Vec<(Client, Vec<RecurringCharge>)> = active_clients
        .into_iter()
        .filter_map(|client| by_client.remove(&client.get_id()).map(|charges| (client, charges)))
        .collect();
    debug!("{} clients have recurring charges", result.len());
    Ok(result)
}
