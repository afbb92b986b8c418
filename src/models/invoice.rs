use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::InvoiceStatus;
use crate::auth::generate_token;
use crate::money::apply_bps_rounded;

/// Represents an invoice issued to a client or one-off customer
///
/// This struct maps directly to the `invoices` table. The `access_token`
/// is the secret in the public pay link; `billing_period` is set only on
/// invoices produced by the monthly recurring run.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::invoices)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Invoice {
    id: String,
    /// Sequential number, e.g. `INV-2026-0042`
    invoice_number: String,
    client_id: Option<String>,
    customer_name: String,
    customer_email: String,
    status: InvoiceStatus,
    issue_date: NaiveDate,
    due_date: NaiveDate,
    subtotal_cents: i64,
    tax_bps: i32,
    tax_cents: i64,
    total_cents: i64,
    notes: Option<String>,
    #[serde(skip_serializing, default)]
    access_token: String,
    /// `YYYY-MM` for recurring invoices
    billing_period: Option<String>,
    is_recurring: bool,
    stripe_payment_intent_id: Option<String>,
    paid_at: Option<NaiveDateTime>,
    sent_at: Option<NaiveDateTime>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

/// Computed invoice amounts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
}

/// Sums invoice lines and applies tax
///
/// ### Arguments
///
/// * `lines` - `(quantity, unit_price_cents)` pairs
/// * `tax_bps` - The tax rate in basis points
pub fn compute_invoice_totals(lines: &[(i32, i64)], tax_bps: i32) -> InvoiceTotals {
    let subtotal_cents: i64 = lines.iter().map(|(qty, unit)| *qty as i64 * unit).sum();
    let tax_cents = apply_bps_rounded(subtotal_cents, tax_bps);
    InvoiceTotals {
        subtotal_cents,
        tax_cents,
        total_cents: subtotal_cents + tax_cents,
    }
}

impl Invoice {
    /// Creates a new DRAFT invoice
    ///
    /// ### Arguments
    ///
    /// * `invoice_number` - The number allocated for this invoice
    /// * `customer_name` - Who is billed
    /// * `customer_email` - Where the invoice is sent
    /// * `issue_date` - The date on the invoice
    /// * `due_date` - When payment is due
    /// * `tax_bps` - The tax rate in basis points
    /// * `totals` - The computed amounts
    pub fn new(
        invoice_number: String,
        customer_name: String,
        customer_email: String,
        issue_date: NaiveDate,
        due_date: NaiveDate,
        tax_bps: i32,
        totals: InvoiceTotals,
    ) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4().to_string(),
            invoice_number,
            client_id: None,
            customer_name,
            customer_email,
            status: InvoiceStatus::Draft,
            issue_date,
            due_date,
            subtotal_cents: totals.subtotal_cents,
            tax_bps,
            tax_cents: totals.tax_cents,
            total_cents: totals.total_cents,
            notes: None,
            access_token: generate_token(),
            billing_period: None,
            is_recurring: false,
            stripe_payment_intent_id: None,
            paid_at: None,
            sent_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_client(mut self, client_id: Option<String>) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    /// Marks the invoice as produced by the recurring run for `period`
    pub fn with_billing_period(mut self, period: String) -> Self {
        self.billing_period = Some(period);
        self.is_recurring = true;
        self
    }

    pub fn get_id(&self) -> String {
        self.id.clone()
    }

    pub fn get_invoice_number(&self) -> String {
        self.invoice_number.clone()
    }

    pub fn get_client_id(&self) -> Option<String> {
        self.client_id.clone()
    }

    pub fn get_customer_name(&self) -> String {
        self.customer_name.clone()
    }

    pub fn get_customer_email(&self) -> String {
        self.customer_email.clone()
    }

    pub fn get_status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn get_issue_date(&self) -> NaiveDate {
        self.issue_date
    }

    pub fn get_due_date(&self) -> NaiveDate {
        self.due_date
    }

    pub fn get_subtotal_cents(&self) -> i64 {
        self.subtotal_cents
    }

    pub fn get_tax_bps(&self) -> i32 {
        self.tax_bps
    }

    pub fn get_tax_cents(&self) -> i64 {
        self.tax_cents
    }

    pub fn get_total_cents(&self) -> i64 {
        self.total_cents
    }

    pub fn get_notes(&self) -> Option<String> {
        self.notes.clone()
    }

    pub fn get_access_token(&self) -> String {
        self.access_token.clone()
    }

    pub fn get_billing_period(&self) -> Option<String> {
        self.billing_period.clone()
    }

    pub fn is_recurring(&self) -> bool {
        self.is_recurring
    }

    pub fn get_stripe_payment_intent_id(&self) -> Option<String> {
        self.stripe_payment_intent_id.clone()
    }

    pub fn get_paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at.map(|t| DateTime::from_naive_utc_and_offset(t, Utc))
    }

    pub fn get_sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at.map(|t| DateTime::from_naive_utc_and_offset(t, Utc))
    }

    pub fn get_created_at(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.created_at, Utc)
    }

    pub fn get_updated_at(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.updated_at, Utc)
    }
}

/// One line of an invoice
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::invoice_items)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct InvoiceItem {
    pub id: String,
    pub invoice_id: String,
    pub description: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub amount_cents: i64,
}

impl InvoiceItem {
    pub fn new(invoice_id: &str, description: String, quantity: i32, unit_price_cents: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            invoice_id: invoice_id.to_string(),
            description,
            quantity,
            unit_price_cents,
            amount_cents: quantity as i64 * unit_price_cents,
        }
    }
}

/// Formats an invoice number from its year and sequence
pub fn format_invoice_number(year: i32, sequence: i64) -> String {
    format!("INV-{}-{:04}", year, sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_totals() {
        let totals = compute_invoice_totals(&[(2, 15_000), (1, 4_999)], 825);
        assert_eq!(totals.subtotal_cents, 34_999);
        assert_eq!(totals.tax_cents, 2_887);
        assert_eq!(totals.total_cents, 37_886);
    }

    #[test]
    fn test_compute_totals_without_tax() {
        let totals = compute_invoice_totals(&[(1, 120_000)], 0);
        assert_eq!(totals.tax_cents, 0);
        assert_eq!(totals.total_cents, 120_000);
    }

    #[test]
    fn test_invoice_new_is_draft() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
        let totals = compute_invoice_totals(&[(1, 10_000)], 0);
        let invoice = Invoice::new(
            format_invoice_number(2026, 7),
            "Acme".to_string(),
            "billing@acme.test".to_string(),
            day,
            day,
            0,
            totals,
        );
        assert_eq!(invoice.get_status(), InvoiceStatus::Draft);
        assert_eq!(invoice.get_invoice_number(), "INV-2026-0007");
        assert_eq!(invoice.get_access_token().len(), 64);
        assert!(!invoice.is_recurring());
    }

    #[test]
    fn test_access_token_not_serialized() {
        let day = NaiveDate::from_ymd_opt(2026, 10, 1).unwrap();
        let invoice = Invoice::new(
            "INV-2026-0001".to_string(),
            "Acme".to_string(),
            "billing@acme.test".to_string(),
            day,
            day,
            0,
            compute_invoice_totals(&[], 0),
        );
        let json = serde_json::to_value(&invoice).unwrap();
        assert!(json.get("access_token").is_none());
    }

    #[test]
    fn test_invoice_item_amount() {
        let item = InvoiceItem::new("inv", "Hosting".to_string(), 3, 2_500);
        assert_eq!(item.amount_cents, 7_500);
    }
}
