use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{BillFrequency, BillInstanceStatus, ProposalStatus};

/// A recorded business expense
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::expenses)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Expense {
    pub id: String,
    pub description: String,
    pub vendor: String,
    pub category: String,
    pub amount_cents: i64,
    pub expense_date: NaiveDate,
    /// Set when the expense settles a generated bill
    pub bill_instance_id: Option<String>,
    /// Set when the expense was matched from the bank feed
    pub bank_transaction_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Expense {
    pub fn new(description: String, vendor: String, category: String, amount_cents: i64, expense_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description,
            vendor,
            category,
            amount_cents,
            expense_date,
            bill_instance_id: None,
            bank_transaction_id: None,
            notes: None,
            created_at: Utc::now().naive_utc(),
        }
    }
}

/// A template for a periodic expense
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::recurring_bills)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RecurringBill {
    pub id: String,
    pub name: String,
    pub vendor: String,
    pub category: String,
    pub amount_cents: i64,
    pub frequency: BillFrequency,
    /// The next date an instance should be generated for
    pub next_due_date: NaiveDate,
    pub active: bool,
    pub created_at: NaiveDateTime,
    /// Day of month the bill is due on, kept when short months clamp it
    pub anchor_day: i32,
}

impl RecurringBill {
    pub fn new(name: String, vendor: String, amount_cents: i64, frequency: BillFrequency, next_due_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            vendor,
            category: "general".to_string(),
            amount_cents,
            frequency,
            next_due_date,
            active: true,
            created_at: Utc::now().naive_utc(),
            anchor_day: next_due_date.day() as i32,
        }
    }
}

/// One occurrence of a recurring bill
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::bill_instances)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BillInstance {
    pub id: String,
    pub recurring_bill_id: String,
    pub amount_cents: i64,
    pub due_date: NaiveDate,
    pub status: BillInstanceStatus,
    pub paid_at: Option<NaiveDateTime>,
    pub bank_transaction_id: Option<String>,
}

impl BillInstance {
    pub fn new(bill: &RecurringBill, due_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            recurring_bill_id: bill.id.clone(),
            amount_cents: bill.amount_cents,
            due_date,
            status: BillInstanceStatus::Pending,
            paid_at: None,
            bank_transaction_id: None,
        }
    }
}

/// A candidate recurring bill found by scanning the mailbox
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::proposed_bills)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ProposedBill {
    pub id: String,
    /// Mail provider message id; each message is proposed at most once
    pub source_message_id: String,
    pub vendor: String,
    pub amount_cents: Option<i64>,
    pub due_date: Option<NaiveDate>,
    pub subject: String,
    pub status: ProposalStatus,
    pub created_at: NaiveDateTime,
}

impl ProposedBill {
    pub fn new(source_message_id: String, vendor: String, subject: String, amount_cents: Option<i64>, due_date: Option<NaiveDate>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_message_id,
            vendor,
            amount_cents,
            due_date,
            subject,
            status: ProposalStatus::Pending,
            created_at: Utc::now().naive_utc(),
        }
    }
}
