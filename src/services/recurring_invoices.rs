use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::email;
use crate::integrations::{ChargeOutcome, SavedMethodCharge};
use crate::models::{Client, Invoice, RecurringCharge};
use crate::repo::{
    clients_with_recurring_charges, create_invoice, invoice_exists_for_period, mark_invoice_paid, mark_invoice_sent,
    mark_overdue_invoices, NewInvoice, NewInvoiceLine,
};
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutopayFailure {
    pub client_id: String,
    pub invoice_number: String,
    pub reason: String,
}

/// What one recurring invoice run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecurringRunSummary {
    pub period: String,
    pub created: usize,
    pub autopaid: usize,
    pub autopay_failed: Vec<AutopayFailure>,
    /// Clients already invoiced for the period
    pub skipped: usize,
    pub errors: Vec<String>,
    pub overdue_marked: usize,
}

/// Billing period label for a run on `today`, e.g. `2026-03`
pub fn billing_period(today: NaiveDate) -> String {
    today.format("%Y-%m").to_string()
}

pub fn pay_url(state: &AppState, invoice: &Invoice) -> String {
    format!("{}/invoices/{}", state.config.site_base(), invoice.get_access_token())
}

/// Emails an invoice and records it as sent
pub async fn send_invoice(state: &AppState, invoice: &Invoice) -> anyhow::Result<Invoice> {
    email::deliver(&state.integrations, email::invoice(invoice, &pay_url(state, invoice))).await;
    let sent = mark_invoice_sent(&state.pool, &invoice.get_id())?
        .ok_or_else(|| anyhow::anyhow!("invoice {} disappeared", invoice.get_id()))?;
    Ok(sent)
}

enum Autopay {
    Paid,
    Failed(String),
}

async fn try_autopay(state: &AppState, client: &Client, invoice: &Invoice) -> Option<Autopay> {
    let (customer_id, payment_method_id) = client.autopay_method()?;
    let payments = match state.integrations.payments() {
        Ok(payments) => payments,
        Err(e) => return Some(Autopay::Failed(e.to_string())),
    };
    let charge = SavedMethodCharge {
        customer_id,
        payment_method_id,
        amount_cents: invoice.get_total_cents(),
        description: format!("Invoice {}", invoice.get_invoice_number()),
        metadata: BTreeMap::from([
            ("kind".to_string(), "invoice".to_string()),
            ("id".to_string(), invoice.get_id()),
        ]),
    };
    let outcome = match payments.charge_saved_method(&charge).await {
        Ok(ChargeOutcome::Succeeded { payment_intent_id }) => payment_intent_id,
        Ok(ChargeOutcome::Declined { reason }) => return Some(Autopay::Failed(reason)),
        Err(e) => return Some(Autopay::Failed(e.to_string())),
    };
    match mark_invoice_paid(&state.pool, &invoice.get_id(), Some(&outcome)) {
        Ok(Some(recorded)) => {
            email::deliver(&state.integrations, email::payment_receipt(&recorded.into_inner())).await;
            Some(Autopay::Paid)
        }
        Ok(None) => Some(Autopay::Failed("invoice disappeared".to_string())),
        Err(e) => {
            error!("Charged {} but could not mark invoice paid: {:#}", outcome, e);
            Some(Autopay::Paid)
        }
    }
}

async fn bill_client(
    state: &AppState,
    client: &Client,
    charges: &[RecurringCharge],
    today: NaiveDate,
    summary: &mut RecurringRunSummary,
) -> anyhow::Result<()> {
    if invoice_exists_for_period(&state.pool, &client.get_id(), &summary.period)? {
        summary.skipped += 1;
        return Ok(());
    }
    let due_date = today
        .checked_add_days(Days::new(client.get_payment_terms_days().max(0) as u64))
        .unwrap_or(today);
    let (invoice, _) = create_invoice(
        &state.pool,
        NewInvoice {
            client_id: Some(client.get_id()),
            customer_name: client.get_name(),
            customer_email: client.get_email(),
            issue_date: today,
            due_date,
            tax_bps: 0,
            notes: None,
            billing_period: Some(summary.period.clone()),
            lines: charges
                .iter()
                .map(|charge| NewInvoiceLine {
                    description: charge.description.clone(),
                    quantity: 1,
                    unit_price_cents: charge.amount_cents,
                })
                .collect(),
        },
    )?;
    summary.created += 1;

    match try_autopay(state, client, &invoice).await {
        Some(Autopay::Paid) => summary.autopaid += 1,
        Some(Autopay::Failed(reason)) => {
            warn!("Autopay for invoice {} failed: {}", invoice.get_invoice_number(), reason);
            send_invoice(state, &invoice).await?;
            summary.autopay_failed.push(AutopayFailure {
                client_id: client.get_id(),
                invoice_number: invoice.get_invoice_number(),
                reason,
            });
        }
        None => {
            send_invoice(state, &invoice).await?;
        }
    }
    Ok(())
}

/// Bills every active client with active recurring charges for the month of `today`
///
/// Sent invoices past due are marked OVERDUE first. A client already billed
/// for the period is skipped, so the run can be repeated safely. Autopay
/// clients are charged right away; a declined charge falls back to emailing
/// the invoice. One client's failure does not stop the others.
#[instrument(skip(state))]
pub async fn run_recurring_invoices(state: &AppState, today: NaiveDate) -> anyhow::Result<RecurringRunSummary> {
    let mut summary = RecurringRunSummary {
        period: billing_period(today),
        overdue_marked: mark_overdue_invoices(&state.pool, today)?,
        ..Default::default()
    };

    for (client, charges) in clients_with_recurring_charges(&state.pool)? {
        if let Err(e) = bill_client(state, &client, &charges, today, &mut summary).await {
            error!("Recurring invoice for {} failed: {:#}", client.get_name(), e);
            summary.errors.push(format!("{}: {}", client.get_name(), e));
        }
    }

    info!(
        "Recurring run {}: {} created, {} autopaid, {} autopay failures, {} skipped",
        summary.period,
        summary.created,
        summary.autopaid,
        summary.autopay_failed.len(),
        summary.skipped
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InvoiceStatus;
    use crate::repo::{add_recurring_charge, create_client, get_invoice, list_invoices};
    use crate::test_utils::{setup_test_db, test_harness, TestHarness};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seed_client(harness: &TestHarness, name: &str, autopay_customer: Option<&str>) -> Client {
        let pool = &harness.state.pool;
        let mut client = Client::new(name.to_string(), format!("{}@example.com", name.to_lowercase()));
        if let Some(customer) = autopay_customer {
            client = client.with_autopay(true, Some(customer.to_string()), Some("pm_card".to_string()));
        }
        let client = create_client(pool, client).unwrap();
        add_recurring_charge(pool, RecurringCharge::new(&client.get_id(), "Hosting".to_string(), 5_000)).unwrap();
        add_recurring_charge(pool, RecurringCharge::new(&client.get_id(), "Maintenance".to_string(), 2_500)).unwrap();
        client
    }

    #[test]
    fn test_billing_period() {
        assert_eq!(billing_period(date(2026, 3, 1)), "2026-03");
        assert_eq!(billing_period(date(2026, 12, 31)), "2026-12");
    }

    #[tokio::test]
    async fn test_run_creates_and_sends() {
        let harness = test_harness(setup_test_db());
        let client = seed_client(&harness, "Harbor", None);

        let summary = run_recurring_invoices(&harness.state, date(2026, 3, 1)).await.unwrap();

        assert_eq!(summary.period, "2026-03");
        assert_eq!(summary.created, 1);
        assert_eq!(summary.autopaid, 0);
        let invoices = list_invoices(&harness.state.pool, &[], Some(&client.get_id())).unwrap();
        assert_eq!(invoices.len(), 1);
        let invoice = &invoices[0];
        assert_eq!(invoice.get_status(), InvoiceStatus::Sent);
        assert_eq!(invoice.get_total_cents(), 7_500);
        assert_eq!(invoice.get_due_date(), date(2026, 3, 16));
        assert_eq!(invoice.get_billing_period().as_deref(), Some("2026-03"));
        let sent = harness.mailer.sent.lock().unwrap();
        assert!(sent[0].html.contains(&format!("https://47industries.test/invoices/{}", invoice.get_access_token())));
    }

    #[tokio::test]
    async fn test_run_is_idempotent_per_period() {
        let harness = test_harness(setup_test_db());
        seed_client(&harness, "Harbor", None);

        run_recurring_invoices(&harness.state, date(2026, 3, 1)).await.unwrap();
        let again = run_recurring_invoices(&harness.state, date(2026, 3, 2)).await.unwrap();
        assert_eq!(again.created, 0);
        assert_eq!(again.skipped, 1);

        let next_month = run_recurring_invoices(&harness.state, date(2026, 4, 1)).await.unwrap();
        assert_eq!(next_month.created, 1);
    }

    #[tokio::test]
    async fn test_autopay_success_and_decline() {
        let harness = test_harness(setup_test_db());
        let paying = seed_client(&harness, "Paying", Some("cus_ok"));
        let declined = seed_client(&harness, "Declined", Some("cus_bad"));
        harness.payments.declined_customers.lock().unwrap().push("cus_bad".to_string());

        let summary = run_recurring_invoices(&harness.state, date(2026, 3, 1)).await.unwrap();

        assert_eq!(summary.created, 2);
        assert_eq!(summary.autopaid, 1);
        assert_eq!(summary.autopay_failed.len(), 1);
        assert_eq!(summary.autopay_failed[0].client_id, declined.get_id());
        assert!(summary.autopay_failed[0].reason.contains("declined"));

        let pool = &harness.state.pool;
        let paid = &list_invoices(pool, &[], Some(&paying.get_id())).unwrap()[0];
        let paid = get_invoice(pool, &paid.get_id()).unwrap().unwrap();
        assert_eq!(paid.get_status(), InvoiceStatus::Paid);
        assert!(paid.get_stripe_payment_intent_id().is_some());
        let unpaid = &list_invoices(pool, &[], Some(&declined.get_id())).unwrap()[0];
        assert_eq!(unpaid.get_status(), InvoiceStatus::Sent);

        let charges = harness.payments.charges.lock().unwrap();
        assert_eq!(charges.len(), 2);
        assert!(charges.iter().all(|c| c.amount_cents == 7_500));
    }

    #[tokio::test]
    async fn test_run_marks_overdue() {
        let harness = test_harness(setup_test_db());
        seed_client(&harness, "Harbor", None);
        run_recurring_invoices(&harness.state, date(2026, 3, 1)).await.unwrap();

        let later = run_recurring_invoices(&harness.state, date(2026, 4, 1)).await.unwrap();
        assert_eq!(later.overdue_marked, 1);
    }
}
