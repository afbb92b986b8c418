use crate::db::DbPool;
use crate::models::{InquiryStatus, InvoiceStatus, OrderStatus, PrintOrderStatus, ProposalStatus};
use crate::schema::{expenses, invoices, orders, print_orders, proposed_bills, service_inquiries};
use anyhow::Result;
use chrono::NaiveDate;
use diesel::prelude::*;
use serde::Serialize;
use tracing::instrument;

/// Headline numbers for the admin dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub month: String,
    pub order_revenue_cents: i64,
    pub invoice_revenue_cents: i64,
    pub revenue_cents: i64,
    pub outstanding_invoice_cents: i64,
    pub expenses_cents: i64,
    pub failed_print_orders: i64,
    pub new_inquiries: i64,
    pub pending_proposed_bills: i64,
}

/// Gathers dashboard numbers for the month `[start, end)`
///
/// Revenue counts orders and invoices paid in the month; orders that were
/// later cancelled or refunded are left out.
#[instrument(skip(pool))]
pub fn dashboard_stats(pool: &DbPool, month: &str, start: NaiveDate, end: NaiveDate) -> Result<DashboardStats> {
    let conn = &mut pool.get()?;
    let start_ts = start.and_hms_opt(0, 0, 0).unwrap_or_default();
    let end_ts = end.and_hms_opt(0, 0, 0).unwrap_or_default();

    let order_totals: Vec<i64> = orders::table
        .filter(orders::paid_at.ge(start_ts))
        .filter(orders::paid_at.lt(end_ts))
        .filter(orders::status.ne_all(vec![OrderStatus::Cancelled, OrderStatus::Refunded]))
        .select(orders::total_cents)
        .load(conn)?;
    let invoice_totals: Vec<i64> = invoices::table
        .filter(invoices::status.eq(InvoiceStatus::Paid))
        .filter(invoices::paid_at.ge(start_ts))
        .filter(invoices::paid_at.lt(end_ts))
        .select(invoices::total_cents)
        .load(conn)?;
    let outstanding: Vec<i64> = invoices::table
        .filter(invoices::status.eq_any(vec![InvoiceStatus::Sent, InvoiceStatus::Overdue]))
        .select(invoices::total_cents)
        .load(conn)?;
    let spent: Vec<i64> = expenses::table
        .filter(expenses::expense_date.ge(start))
        .filter(expenses::expense_date.lt(end))
        .select(expenses::amount_cents)
        .load(conn)?;

    let failed_print_orders = print_orders::table
        .filter(print_orders::status.eq(PrintOrderStatus::Failed))
        .count()
        .get_result(conn)?;
    let new_inquiries = service_inquiries::table
        .filter(service_inquiries::status.eq(InquiryStatus::New))
        .count()
        .get_result(conn)?;
    let pending_proposed_bills = proposed_bills::table
        .filter(proposed_bills::status.eq(ProposalStatus::Pending))
        .count()
        .get_result(conn)?;

    let order_revenue_cents: i64 = order_totals.iter().sum();
    let invoice_revenue_cents: i64 = invoice_totals.iter().sum();
    Ok(DashboardStats {
        month: month.to_string(),
        order_revenue_cents,
        invoice_revenue_cents,
        revenue_cents: order_revenue_cents + invoice_revenue_cents,
        outstanding_invoice_cents: outstanding.iter().sum(),
        expenses_cents: spent.iter().sum(),
        failed_print_orders,
        new_inquiries,
        pending_proposed_bills,
    })
}
