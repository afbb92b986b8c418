//! Bill generation and mailbox scanning

use chrono::{Days, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::errors::ApiError;
use crate::integrations::MailMessage;
use crate::models::{BillInstance, ProposedBill};
use crate::money::parse_dollars;
use crate::repo::{generate_due_bill_instances, insert_proposed_bill_if_new};
use crate::state::AppState;

/// How far ahead of its due date a bill instance is created
pub const BILL_LOOKAHEAD_DAYS: u64 = 7;
/// Messages read per mailbox scan
pub const SCAN_MESSAGE_LIMIT: usize = 50;

const BILL_KEYWORDS: [&str; 4] = ["bill", "invoice", "statement", "payment due"];

static AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\s?([0-9]{1,3}(?:,[0-9]{3})+(?:\.[0-9]{1,2})?|[0-9]+(?:\.[0-9]{1,2})?)").expect("amount pattern"));
static LONG_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?\s+([0-9]{1,2}),?\s+([0-9]{4})\b")
        .expect("long date pattern")
});
static SLASH_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([0-9]{1,2})/([0-9]{1,2})/([0-9]{4})\b").expect("slash date pattern"));

/// Creates bill instances due within the next [`BILL_LOOKAHEAD_DAYS`]
#[instrument(skip(state))]
pub fn generate_bills(state: &AppState, today: NaiveDate) -> anyhow::Result<Vec<BillInstance>> {
    let horizon = today.checked_add_days(Days::new(BILL_LOOKAHEAD_DAYS)).unwrap_or(today);
    generate_due_bill_instances(&state.pool, horizon)
}

pub fn looks_like_bill(subject: &str) -> bool {
    let subject = subject.to_lowercase();
    BILL_KEYWORDS.iter().any(|keyword| subject.contains(keyword))
}

/// The display name of a `From` header, or the sender's domain when there is none
pub fn sender_name(from: &str) -> String {
    if let Some((name, _)) = from.split_once('<') {
        let name = name.trim().trim_matches('"').trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    let address = from.trim().trim_start_matches('<').trim_end_matches('>');
    match address.split_once('@') {
        Some((_, domain)) => domain.split('.').next().unwrap_or(domain).to_string(),
        None => address.to_string(),
    }
}

/// The first dollar amount in `text`, in cents
pub fn first_amount(text: &str) -> Option<i64> {
    AMOUNT.captures_iter(text).find_map(|caps| parse_dollars(&caps[1]))
}

fn month_number(name: &str) -> Option<u32> {
    let month = match &name.to_lowercase()[..3] {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// The first due date in `text`, written `March 15, 2026` or `03/15/2026`
pub fn find_due_date(text: &str) -> Option<NaiveDate> {
    let long = LONG_DATE.captures_iter(text).find_map(|caps| {
        let month = month_number(&caps[1])?;
        NaiveDate::from_ymd_opt(caps[3].parse().ok()?, month, caps[2].parse().ok()?)
    });
    long.or_else(|| {
        SLASH_DATE.captures_iter(text).find_map(|caps| {
            NaiveDate::from_ymd_opt(caps[3].parse().ok()?, caps[1].parse().ok()?, caps[2].parse().ok()?)
        })
    })
}

/// Turns a bill-looking message into a proposal
///
/// The subject is searched before the body for the amount and due date.
pub fn parse_bill_message(message: &MailMessage) -> Option<ProposedBill> {
    if !looks_like_bill(&message.subject) {
        return None;
    }
    let amount = first_amount(&message.subject).or_else(|| first_amount(&message.body));
    let due = find_due_date(&message.subject).or_else(|| find_due_date(&message.body));
    Some(ProposedBill::new(
        message.id.clone(),
        sender_name(&message.from),
        message.subject.clone(),
        amount,
        due,
    ))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub scanned: usize,
    pub proposed: usize,
    /// Bill messages that were already proposed
    pub already_seen: usize,
}

/// Reads recent mail and proposes a bill for every new bill-looking message
#[instrument(skip(state))]
pub async fn scan_mailbox(state: &AppState) -> Result<ScanSummary, ApiError> {
    let messages = state.integrations.mailbox()?.recent_messages(SCAN_MESSAGE_LIMIT).await?;
    let mut summary = ScanSummary { scanned: messages.len(), ..Default::default() };
    for message in &messages {
        let Some(proposal) = parse_bill_message(message) else {
            debug!("Not a bill: {}", message.subject);
            continue;
        };
        if insert_proposed_bill_if_new(&state.pool, &proposal).map_err(ApiError::Database)? {
            summary.proposed += 1;
        } else {
            summary.already_seen += 1;
        }
    }
    info!("Mailbox scan: {:?}", summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::MailboxScanner;
    use crate::models::{BillFrequency, ProposalStatus, RecurringBill};
    use crate::repo::{create_recurring_bill, get_recurring_bill, list_proposed_bills};
    use crate::state::AppState;
    use crate::test_utils::{setup_test_db, test_harness, FakeMailbox};
    use std::sync::Arc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn message(id: &str, from: &str, subject: &str, body: &str) -> MailMessage {
        MailMessage {
            id: id.to_string(),
            from: from.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            received_at: None,
        }
    }

    #[test]
    fn test_looks_like_bill() {
        assert!(looks_like_bill("Your March Statement is ready"));
        assert!(looks_like_bill("PAYMENT DUE soon"));
        assert!(looks_like_bill("Invoice #4411"));
        assert!(!looks_like_bill("Weekend ride meetup"));
    }

    #[test]
    fn test_sender_name() {
        assert_eq!(sender_name("Tampa Electric <billing@tecoenergy.com>"), "Tampa Electric");
        assert_eq!(sender_name("\"Spectrum\" <noreply@spectrum.net>"), "Spectrum");
        assert_eq!(sender_name("<billing@tecoenergy.com>"), "tecoenergy");
        assert_eq!(sender_name("alerts@verizon.com"), "verizon");
    }

    #[test]
    fn test_first_amount() {
        assert_eq!(first_amount("Amount due $142.17 by Friday"), Some(14_217));
        assert_eq!(first_amount("Total $1,204.50, previous $99"), Some(120_450));
        assert_eq!(first_amount("Pay $ 80 now"), Some(8_000));
        assert_eq!(first_amount("No amount here"), None);
    }

    #[test]
    fn test_find_due_date() {
        assert_eq!(find_due_date("due by March 15, 2026."), Some(date(2026, 3, 15)));
        assert_eq!(find_due_date("due Sept. 3 2026"), Some(date(2026, 9, 3)));
        assert_eq!(find_due_date("pay by 04/01/2026"), Some(date(2026, 4, 1)));
        assert_eq!(find_due_date("due February 30, 2026"), None);
        assert_eq!(find_due_date("no date"), None);
    }

    #[test]
    fn test_parse_bill_message() {
        let bill = parse_bill_message(&message(
            "m1",
            "Tampa Electric <billing@tecoenergy.com>",
            "Your statement is ready",
            "Amount due $142.17 by March 15, 2026.",
        ))
        .unwrap();
        assert_eq!(bill.vendor, "Tampa Electric");
        assert_eq!(bill.amount_cents, Some(14_217));
        assert_eq!(bill.due_date, Some(date(2026, 3, 15)));
        assert_eq!(bill.status, ProposalStatus::Pending);

        assert!(parse_bill_message(&message("m2", "friend@example.com", "Lunch?", "$20 at noon")).is_none());
    }

    #[tokio::test]
    async fn test_scan_mailbox_dedupes_by_message() {
        let harness = test_harness(setup_test_db());
        let mut integrations = harness.state.integrations.clone();
        let mailbox = FakeMailbox {
            messages: vec![
                message("m1", "Spectrum <bills@spectrum.net>", "Your bill is ready", "Total $89.99"),
                message("m2", "Mom <mom@example.com>", "Dinner sunday", ""),
            ],
        };
        integrations.mailbox = Some(Arc::new(mailbox) as Arc<dyn MailboxScanner>);
        let state = AppState::new(harness.state.pool.clone(), harness.state.config.clone(), integrations);

        let first = scan_mailbox(&state).await.unwrap();
        assert_eq!(first, ScanSummary { scanned: 2, proposed: 1, already_seen: 0 });
        let second = scan_mailbox(&state).await.unwrap();
        assert_eq!(second, ScanSummary { scanned: 2, proposed: 0, already_seen: 1 });

        let proposals = list_proposed_bills(&state.pool, Some(ProposalStatus::Pending)).unwrap();
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].amount_cents, Some(8_999));
    }

    #[tokio::test]
    async fn test_scan_without_mailbox() {
        let harness = test_harness(setup_test_db());
        assert!(matches!(scan_mailbox(&harness.state).await, Err(ApiError::Integration(_))));
    }

    #[test]
    fn test_generate_bills_uses_lookahead() {
        let harness = test_harness(setup_test_db());
        let pool = &harness.state.pool;
        let soon = create_recurring_bill(
            pool,
            RecurringBill::new("Power".to_string(), "Tampa Electric".to_string(), 14_000, BillFrequency::Monthly, date(2026, 3, 7)),
        )
        .unwrap();
        let later = create_recurring_bill(
            pool,
            RecurringBill::new("Insurance".to_string(), "Progressive".to_string(), 30_000, BillFrequency::Yearly, date(2026, 3, 20)),
        )
        .unwrap();

        let created = generate_bills(&harness.state, date(2026, 3, 1)).unwrap();

        assert_eq!(created.len(), 1);
        assert_eq!(created[0].recurring_bill_id, soon.id);
        assert_eq!(get_recurring_bill(pool, &soon.id).unwrap().unwrap().next_due_date, date(2026, 4, 7));
        assert_eq!(get_recurring_bill(pool, &later.id).unwrap().unwrap().next_due_date, date(2026, 3, 20));
    }
}
