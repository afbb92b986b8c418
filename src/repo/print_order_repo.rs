use crate::db::DbPool;
use crate::models::{PrintOrder, PrintOrderStatus};
use crate::schema::print_orders;
use anyhow::Result;
use chrono::Utc;
use diesel::prelude::*;
use tracing::{debug, info, instrument, warn};

/// Returns the print order for `order_id`, creating a PENDING one if needed
///
/// An order has at most one print order, so a retried payment notification
/// reuses the existing row instead of inserting a second.
#[instrument(skip(pool))]
pub fn get_or_create_print_order(pool: &DbPool, order_id: &str) -> Result<PrintOrder> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        if let Some(existing) = print_orders::table
            .filter(print_orders::order_id.eq(order_id))
            .first::<PrintOrder>(conn)
            .optional()?
        {
            debug!("Reusing print order {}", existing.get_id());
            return Ok(existing);
        }
        let print_order = PrintOrder::new(order_id);
        diesel::insert_into(print_orders::table)
            .values(&print_order)
            .execute(conn)?;
        info!("Created print order {} for order {}", print_order.get_id(), order_id);
        Ok(print_order)
    })
}

pub fn get_print_order(pool: &DbPool, print_order_id: &str) -> Result<Option<PrintOrder>> {
    let conn = &mut pool.get()?;
    let print_order = print_orders::table
        .find(print_order_id)
        .first::<PrintOrder>(conn)
        .optional()?;
    Ok(print_order)
}

pub fn get_print_order_for_order(pool: &DbPool, order_id: &str) -> Result<Option<PrintOrder>> {
    let conn = &mut pool.get()?;
    let print_order = print_orders::table
        .filter(print_orders::order_id.eq(order_id))
        .first::<PrintOrder>(conn)
        .optional()?;
    Ok(print_order)
}

/// Lists print orders newest first, optionally only those in `status`
pub fn list_print_orders(pool: &DbPool, status: Option<PrintOrderStatus>) -> Result<Vec<PrintOrder>> {
    let conn = &mut pool.get()?;
    let mut query = print_orders::table.into_boxed();
    if let Some(status) = status {
        query = query.filter(print_orders::status.eq(status));
    }
    let result = query
        .order(print_orders::created_at.desc())
        .load::<PrintOrder>(conn)?;
    Ok(result)
}

fn load(conn: &mut SqliteConnection, print_order_id: &str) -> QueryResult<PrintOrder> {
    print_orders::table.find(print_order_id).first::<PrintOrder>(conn)
}

/// Records a successful submission with the provider's order id
pub fn mark_submitted(pool: &DbPool, print_order_id: &str, external_id: &str) -> Result<PrintOrder> {
    let conn = &mut pool.get()?;
    diesel::update(print_orders::table.find(print_order_id))
        .set((
            print_orders::status.eq(PrintOrderStatus::Submitted),
            print_orders::external_id.eq(Some(external_id)),
            print_orders::last_error.eq(None::<String>),
            print_orders::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;
    info!("Print order {} submitted as {}", print_order_id, external_id);
    Ok(load(conn, print_order_id)?)
}

/// Records a failed submission and keeps the provider's error
pub fn mark_failed(pool: &DbPool, print_order_id: &str, error: &str) -> Result<PrintOrder> {
    let conn = &mut pool.get()?;
    diesel::update(print_orders::table.find(print_order_id))
        .set((
            print_orders::status.eq(PrintOrderStatus::Failed),
            print_orders::last_error.eq(Some(error)),
            print_orders::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;
    warn!("Print order {} failed: {}", print_order_id, error);
    Ok(load(conn, print_order_id)?)
}

/// Bumps the retry counter before another submission attempt
pub fn increment_retry(pool: &DbPool, print_order_id: &str) -> Result<PrintOrder> {
    let conn = &mut pool.get()?;
    diesel::update(print_orders::table.find(print_order_id))
        .set((
            print_orders::retry_count.eq(print_orders::retry_count + 1),
            print_orders::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;
    Ok(load(conn, print_order_id)?)
}

/// Number of print orders currently in FAILED
pub fn count_failed_print_orders(pool: &DbPool) -> Result<i64> {
    let conn = &mut pool.get()?;
    let count = print_orders::table
        .filter(print_orders::status.eq(PrintOrderStatus::Failed))
        .count()
        .get_result(conn)?;
    Ok(count)
}
