use crate::db::DbPool;
use crate::integrations::ShippingLabel;
use crate::models::{Fulfillment, Order, OrderItem, OrderStatus};
use crate::schema::{order_items, orders, products};
use super::PaymentRecorded;
use anyhow::Result;
use chrono::Utc;
use diesel::prelude::*;
use tracing::{debug, info, instrument};

/// Inserts an order and its line items in one transaction
///
/// ### Arguments
///
/// * `pool` - A reference to the database connection pool
/// * `order` - The new order
/// * `items` - Its line items, each referencing `order`
///
/// ### Returns
///
/// A Result containing the stored order
#[instrument(skip_all, fields(order_number = %order.get_order_number()))]
pub fn create_order(pool: &DbPool, order: Order, items: Vec<OrderItem>) -> Result<Order> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        diesel::insert_into(orders::table)
            .values(&order)
            .execute(conn)?;
        if !items.is_empty() {
            diesel::insert_into(order_items::table)
                .values(&items)
                .execute(conn)?;
        }
        Ok::<_, diesel::result::Error>(())
    })?;
    info!("Created order {} with {} item(s)", order.get_id(), items.len());
    Ok(order)
}

/// Stores the checkout session that will pay this order
pub fn set_checkout_session(pool: &DbPool, order_id: &str, session_id: &str) -> Result<()> {
    let conn = &mut pool.get()?;
    diesel::update(orders::table.find(order_id))
        .set((
            orders::stripe_session_id.eq(session_id),
            orders::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)?;
    Ok(())
}

pub fn get_order(pool: &DbPool, order_id: &str) -> Result<Option<Order>> {
    let conn = &mut pool.get()?;
    let order = orders::table
        .find(order_id)
        .first::<Order>(conn)
        .optional()?;
    Ok(order)
}

pub fn get_order_items(pool: &DbPool, order_id: &str) -> Result<Vec<OrderItem>> {
    let conn = &mut pool.get()?;
    let items = order_items::table
        .filter(order_items::order_id.eq(order_id))
        .load::<OrderItem>(conn)?;
    Ok(items)
}

/// Lists orders newest first, optionally restricted to some statuses
#[instrument(skip(pool))]
pub fn list_orders(pool: &DbPool, statuses: &[OrderStatus]) -> Result<Vec<Order>> {
    let conn = &mut pool.get()?;
    let mut query = orders::table.into_boxed();
    if !statuses.is_empty() {
        query = query.filter(orders::status.eq_any(statuses.to_vec()));
    }
    let result = query
        .order(orders::created_at.desc())
        .load::<Order>(conn)?;
    debug!("Listed {} orders", result.len());
    Ok(result)
}

/// Finds an order by number for the customer who placed it
///
/// The email comparison ignores case so customers can type it however they
/// like; a mismatched email is indistinguishable from a missing order.
pub fn find_customer_order(pool: &DbPool, email: &str, order_number: &str) -> Result<Option<Order>> {
    let conn = &mut pool.get()?;
    let order = orders::table
        .filter(orders::order_number.eq(order_number.trim().to_uppercase()))
        .first::<Order>(conn)
        .optional()?;
    Ok(order.filter(|o| o.get_customer_email().eq_ignore_ascii_case(email.trim())))
}

/// Sets an order's status without checking the transition
pub fn update_order_status(pool: &DbPool, order_id: &str, status: OrderStatus) -> Result<Option<Order>> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        let updated = diesel::update(orders::table.find(order_id))
            .set((
                orders::status.eq(status),
                orders::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        if updated == 0 {
            return Ok(None);
        }
        info!("Order {} is now {}", order_id, status);
        orders::table.find(order_id).first::<Order>(conn).optional()
    })
    .map_err(Into::into)
}

/// Marks a PENDING order as PAID and takes in-house stock for its items
///
/// Replayed payment notifications leave a non-PENDING order untouched.
///
/// ### Returns
///
/// `None` when the order does not exist
#[instrument(skip(pool))]
pub fn record_order_payment(pool: &DbPool, order_id: &str) -> Result<Option<PaymentRecorded<Order>>> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        let Some(order) = orders::table.find(order_id).first::<Order>(conn).optional()? else {
            return Ok(None);
        };
        if order.get_status() != OrderStatus::Pending {
            debug!("Order {} already {}, ignoring payment", order_id, order.get_status());
            return Ok(Some(PaymentRecorded::Unchanged(order)));
        }

        let now = Utc::now().naive_utc();
        diesel::update(orders::table.find(order_id))
            .set((
                orders::status.eq(OrderStatus::Paid),
                orders::paid_at.eq(Some(now)),
                orders::updated_at.eq(now),
            ))
            .execute(conn)?;

        let items = order_items::table
            .filter(order_items::order_id.eq(order_id))
            .load::<OrderItem>(conn)?;
        for item in &items {
            diesel::update(
                products::table
                    .find(&item.product_id)
                    .filter(products::fulfillment.eq(Fulfillment::InHouse))
                    .filter(products::stock.is_not_null()),
            )
            .set(products::stock.eq(products::stock - item.quantity))
            .execute(conn)?;
        }

        let order = orders::table.find(order_id).first::<Order>(conn)?;
        info!("Order {} paid", order.get_order_number());
        Ok(Some(PaymentRecorded::Marked(order)))
    })
}

/// Stores a purchased label and marks the order SHIPPED
pub fn record_shipment(pool: &DbPool, order_id: &str, provider: &str, label: &ShippingLabel) -> Result<Option<Order>> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        let updated = diesel::update(orders::table.find(order_id))
            .set((
                orders::status.eq(OrderStatus::Shipped),
                orders::shipping_provider.eq(Some(provider)),
                orders::tracking_number.eq(Some(label.tracking_number.as_str())),
                orders::carrier.eq(Some(label.carrier.as_str())),
                orders::label_url.eq(Some(label.label_url.as_str())),
                orders::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        if updated == 0 {
            return Ok(None);
        }
        info!("Order {} shipped with {}", order_id, label.tracking_number);
        orders::table.find(order_id).first::<Order>(conn).optional()
    })
    .map_err(Into::into)
}
