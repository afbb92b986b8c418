use crate::db::DbPool;
use crate::models::{compute_invoice_totals, format_invoice_number, Invoice, InvoiceItem, InvoiceStatus};
use crate::schema::{invoice_items, invoices};
use super::PaymentRecorded;
use anyhow::Result;
use chrono::{Datelike, NaiveDate, Utc};
use diesel::prelude::*;
use tracing::{debug, info, instrument};

/// One line of an invoice being created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvoiceLine {
    pub description: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
}

/// Everything needed to create an invoice except its number
///
/// The number is allocated inside the creating transaction so concurrent
/// creations in the same year cannot share one.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub client_id: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub tax_bps: i32,
    pub notes: Option<String>,
    pub billing_period: Option<String>,
    pub lines: Vec<NewInvoiceLine>,
}

/// Finds the next free sequence number for `year`
fn next_invoice_sequence(conn: &mut SqliteConnection, year: i32) -> QueryResult<i64> {
    let prefix = format!("INV-{}-", year);
    let numbers: Vec<String> = invoices::table
        .filter(invoices::invoice_number.like(format!("{}%", prefix)))
        .select(invoices::invoice_number)
        .load(conn)?;
    let highest = numbers
        .iter()
        .filter_map(|n| n.strip_prefix(&prefix))
        .filter_map(|seq| seq.parse::<i64>().ok())
        .max()
        .unwrap_or(0);
    Ok(highest + 1)
}

/// Creates an invoice and its items, allocating the next number for the
/// issue year
///
/// ### Arguments
///
/// * `pool` - A reference to the database connection pool
/// * `new_invoice` - The invoice details and lines
///
/// ### Returns
///
/// A Result containing the stored invoice and its items
///
/// ### Errors
///
/// Fails when the insert violates a constraint, for example a second
/// recurring invoice for the same client and billing period
#[instrument(skip_all, fields(customer = %new_invoice.customer_email))]
pub fn create_invoice(pool: &DbPool, new_invoice: NewInvoice) -> Result<(Invoice, Vec<InvoiceItem>)> {
    let conn = &mut pool.get()?;
    let lines: Vec<(i32, i64)> = new_invoice
        .lines
        .iter()
        .map(|line| (line.quantity, line.unit_price_cents))
        .collect();
    let totals = compute_invoice_totals(&lines, new_invoice.tax_bps);

    let (invoice, items) = conn.transaction(|conn| {
        let sequence = next_invoice_sequence(conn, new_invoice.issue_date.year())?;
        let mut invoice = Invoice::new(
            format_invoice_number(new_invoice.issue_date.year(), sequence),
            new_invoice.customer_name.clone(),
            new_invoice.customer_email.clone(),
            new_invoice.issue_date,
            new_invoice.due_date,
            new_invoice.tax_bps,
            totals,
        )
        .with_client(new_invoice.client_id.clone())
        .with_notes(new_invoice.notes.clone());
        if let Some(period) = &new_invoice.billing_period {
            invoice = invoice.with_billing_period(period.clone());
        }

        let items: Vec<InvoiceItem> = new_invoice
            .lines
            .iter()
            .map(|line| InvoiceItem::new(&invoice.get_id(), line.description.clone(), line.quantity, line.unit_price_cents))
            .collect();

        diesel::insert_into(invoices::table)
            .values(&invoice)
            .execute(conn)?;
        if !items.is_empty() {
            diesel::insert_into(invoice_items::table)
                .values(&items)
                .execute(conn)?;
        }
        Ok::<_, diesel::result::Error>((invoice, items))
    })?;

    info!("Created invoice {} for {}", invoice.get_invoice_number(), invoice.get_total_cents());
    Ok((invoice, items))
}

pub fn get_invoice(pool: &DbPool, invoice_id: &str) -> Result<Option<Invoice>> {
    let conn = &mut pool.get()?;
    let invoice = invoices::table
        .find(invoice_id)
        .first::<Invoice>(conn)
        .optional()?;
    Ok(invoice)
}

/// Looks up an invoice by the token embedded in its public link
pub fn get_invoice_by_token(pool: &DbPool, token: &str) -> Result<Option<Invoice>> {
    let conn = &mut pool.get()?;
    let invoice = invoices::table
        .filter(invoices::access_token.eq(token))
        .first::<Invoice>(conn)
        .optional()?;
    Ok(invoice)
}

pub fn get_invoice_items(pool: &DbPool, invoice_id: &str) -> Result<Vec<InvoiceItem>> {
    let conn = &mut pool.get()?;
    let items = invoice_items::table
        .filter(invoice_items::invoice_id.eq(invoice_id))
        .load::<InvoiceItem>(conn)?;
    Ok(items)
}

/// Lists invoices newest first
///
/// ### Arguments
///
/// * `pool` - A reference to the database connection pool
/// * `statuses` - Only invoices in one of these statuses; empty for all
/// * `client_id` - Only invoices billed to this client
#[instrument(skip(pool))]
pub fn list_invoices(pool: &DbPool, statuses: &[InvoiceStatus], client_id: Option<&str>) -> Result<Vec<Invoice>> {
    let conn = &mut pool.get()?;
    let mut query = invoices::table.into_boxed();
    if !statuses.is_empty() {
        query = query.filter(invoices::status.eq_any(statuses.to_vec()));
    }
    if let Some(client_id) = client_id {
        query = query.filter(invoices::client_id.eq(client_id));
    }
    let result = query
        .order((invoices::issue_date.desc(), invoices::invoice_number.desc()))
        .load::<Invoice>(conn)?;
    debug!("Listed {} invoices", result.len());
    Ok(result)
}

/// Records that the invoice was emailed
///
/// A DRAFT invoice becomes SENT; resending a SENT or OVERDUE invoice only
/// refreshes `sent_at`.
pub fn mark_invoice_sent(pool: &DbPool, invoice_id: &str) -> Result<Option<Invoice>> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        let Some(invoice) = invoices::table.find(invoice_id).first::<Invoice>(conn).optional()? else {
            return Ok(None);
        };
        let status = match invoice.get_status() {
            InvoiceStatus::Draft => InvoiceStatus::Sent,
            other => other,
        };
        let now = Utc::now().naive_utc();
        diesel::update(invoices::table.find(invoice_id))
            .set((
                invoices::status.eq(status),
                invoices::sent_at.eq(Some(now)),
                invoices::updated_at.eq(now),
            ))
            .execute(conn)?;
        info!("Invoice {} sent", invoice.get_invoice_number());
        invoices::table.find(invoice_id).first::<Invoice>(conn).optional()
    })
    .map_err(Into::into)
}

/// Marks an invoice PAID
///
/// An invoice that is already PAID is left untouched so replayed payment
/// notifications do not move `paid_at`.
///
/// ### Returns
///
/// `None` when the invoice does not exist
#[instrument(skip(pool))]
pub fn mark_invoice_paid(pool: &DbPool, invoice_id: &str, payment_intent_id: Option<&str>) -> Result<Option<PaymentRecorded<Invoice>>> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        let Some(invoice) = invoices::table.find(invoice_id).first::<Invoice>(conn).optional()? else {
            return Ok(None);
        };
        if invoice.get_status() == InvoiceStatus::Paid {
            debug!("Invoice {} already paid", invoice.get_invoice_number());
            return Ok(Some(PaymentRecorded::Unchanged(invoice)));
        }
        let now = Utc::now().naive_utc();
        diesel::update(invoices::table.find(invoice_id))
            .set((
                invoices::status.eq(InvoiceStatus::Paid),
                invoices::paid_at.eq(Some(now)),
                invoices::stripe_payment_intent_id.eq(payment_intent_id),
                invoices::updated_at.eq(now),
            ))
            .execute(conn)?;
        let invoice = invoices::table.find(invoice_id).first::<Invoice>(conn)?;
        info!("Invoice {} paid", invoice.get_invoice_number());
        Ok(Some(PaymentRecorded::Marked(invoice)))
    })
}

/// Cancels an invoice
pub fn cancel_invoice(pool: &DbPool, invoice_id: &str) -> Result<Option<Invoice>> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        let updated = diesel::update(invoices::table.find(invoice_id))
            .set((
                invoices::status.eq(InvoiceStatus::Cancelled),
                invoices::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        if updated == 0 {
            return Ok(None);
        }
        info!("Invoice {} cancelled", invoice_id);
        invoices::table.find(invoice_id).first::<Invoice>(conn).optional()
    })
    .map_err(Into::into)
}

/// Moves SENT invoices due before `today` to OVERDUE
///
/// ### Returns
///
/// The number of invoices that became overdue
#[instrument(skip(pool))]
pub fn mark_overdue_invoices(pool: &DbPool, today: NaiveDate) -> Result<usize> {
    let conn = &mut pool.get()?;
    let updated = diesel::update(
        invoices::table
            .filter(invoices::status.eq(InvoiceStatus::Sent))
            .filter(invoices::due_date.lt(today)),
    )
    .set((
        invoices::status.eq(InvoiceStatus::Overdue),
        invoices::updated_at.eq(Utc::now().naive_utc()),
    ))
    .execute(conn)?;
    if updated > 0 {
        info!("{} invoice(s) became overdue", updated);
    }
    Ok(updated)
}

/// Whether the recurring run already billed `client_id` for `period`
pub fn invoice_exists_for_period(pool: &DbPool, client_id: &str, period: &str) -> Result<bool> {
    let conn = &mut pool.get()?;
    let count: i64 = invoices::table
        .filter(invoices::client_id.eq(client_id))
        .filter(invoices::billing_period.eq(period))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}
