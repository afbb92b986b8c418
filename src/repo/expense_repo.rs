use crate::db::DbPool;
use crate::models::{BillFrequency, BillInstance, BillInstanceStatus, Expense, ProposalStatus, ProposedBill, RecurringBill};
use crate::schema::{bill_instances, expenses, proposed_bills, recurring_bills};
use anyhow::Result;
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use tracing::{debug, info, instrument, warn};

/// Fields an admin may change on an expense
#[derive(AsChangeset, Debug, Default, Clone)]
#[diesel(table_name = expenses)]
pub struct ExpenseChanges {
    pub description: Option<String>,
    pub vendor: Option<String>,
    pub category: Option<String>,
    pub amount_cents: Option<i64>,
    pub expense_date: Option<NaiveDate>,
    pub notes: Option<Option<String>>,
}

/// Fields an admin may change on a recurring bill
#[derive(AsChangeset, Debug, Default, Clone)]
#[diesel(table_name = recurring_bills)]
pub struct RecurringBillChanges {
    pub name: Option<String>,
    pub vendor: Option<String>,
    pub category: Option<String>,
    pub amount_cents: Option<i64>,
    pub frequency: Option<BillFrequency>,
    pub next_due_date: Option<NaiveDate>,
    pub active: Option<bool>,
    pub anchor_day: Option<i32>,
}

/// Result of paying or skipping a bill instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillInstanceUpdate {
    Paid(BillInstance, Expense),
    Skipped(BillInstance),
    /// Only PENDING instances can be paid or skipped
    NotPending(BillInstanceStatus),
}

/// Result of approving a proposed bill
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposalApproval {
    Approved(ProposedBill, RecurringBill),
    /// A recurring bill needs an amount
    MissingAmount,
    NotPending(ProposalStatus),
}

// Expenses

#[instrument(skip_all, fields(vendor = %expense.vendor))]
pub fn create_expense(pool: &DbPool, expense: Expense) -> Result<Expense> {
    let conn = &mut pool.get()?;
    diesel::insert_into(expenses::table)
        .values(&expense)
        .execute(conn)?;
    info!("Recorded expense {} of {}", expense.id, expense.amount_cents);
    Ok(expense)
}

pub fn get_expense(pool: &DbPool, expense_id: &str) -> Result<Option<Expense>> {
    let conn = &mut pool.get()?;
    let expense = expenses::table
        .find(expense_id)
        .first::<Expense>(conn)
        .optional()?;
    Ok(expense)
}

/// Lists expenses newest first
///
/// ### Arguments
///
/// * `pool` - A reference to the database connection pool
/// * `range` - Optional `[start, end)` date range
pub fn list_expenses(pool: &DbPool, range: Option<(NaiveDate, NaiveDate)>) -> Result<Vec<Expense>> {
    let conn = &mut pool.get()?;
    let mut query = expenses::table.into_boxed();
    if let Some((start, end)) = range {
        query = query
            .filter(expenses::expense_date.ge(start))
            .filter(expenses::expense_date.lt(end));
    }
    let result = query
        .order((expenses::expense_date.desc(), expenses::created_at.desc()))
        .load::<Expense>(conn)?;
    debug!("Listed {} expenses", result.len());
    Ok(result)
}

pub fn update_expense(pool: &DbPool, expense_id: &str, changes: ExpenseChanges) -> Result<Option<Expense>> {
    let conn = &mut pool.get()?;
    let updated = diesel::update(expenses::table.find(expense_id))
        .set(&changes)
        .execute(conn)?;
    if updated == 0 {
        return Ok(None);
    }
    let expense = expenses::table.find(expense_id).first::<Expense>(conn).optional()?;
    Ok(expense)
}

pub fn delete_expense(pool: &DbPool, expense_id: &str) -> Result<bool> {
    let conn = &mut pool.get()?;
    let deleted = diesel::delete(expenses::table.find(expense_id)).execute(conn)?;
    if deleted > 0 {
        info!("Deleted expense {}", expense_id);
    }
    Ok(deleted > 0)
}

// Recurring bills

pub fn create_recurring_bill(pool: &DbPool, bill: RecurringBill) -> Result<RecurringBill> {
    let conn = &mut pool.get()?;
    diesel::insert_into(recurring_bills::table)
        .values(&bill)
        .execute(conn)?;
    info!("Created recurring bill {} ({})", bill.name, bill.frequency);
    Ok(bill)
}

pub fn get_recurring_bill(pool: &DbPool, bill_id: &str) -> Result<Option<RecurringBill>> {
    let conn = &mut pool.get()?;
    let bill = recurring_bills::table
        .find(bill_id)
        .first::<RecurringBill>(conn)
        .optional()?;
    Ok(bill)
}

pub fn list_recurring_bills(pool: &DbPool) -> Result<Vec<RecurringBill>> {
    let conn = &mut pool.get()?;
    let result = recurring_bills::table
        .order(recurring_bills::next_due_date.asc())
        .load::<RecurringBill>(conn)?;
    Ok(result)
}

pub fn update_recurring_bill(pool: &DbPool, bill_id: &str, changes: RecurringBillChanges) -> Result<Option<RecurringBill>> {
    let conn = &mut pool.get()?;
    let updated = diesel::update(recurring_bills::table.find(bill_id))
        .set(&changes)
        .execute(conn)?;
    if updated == 0 {
        return Ok(None);
    }
    let bill = recurring_bills::table.find(bill_id).first::<RecurringBill>(conn).optional()?;
    Ok(bill)
}

/// Creates an instance for every due date of every active bill up to
/// `horizon`, advancing each bill's `next_due_date` past it
///
/// An instance that already exists for a bill and date is not duplicated.
///
/// ### Returns
///
/// The instances created by this run
#[instrument(skip(pool))]
pub fn generate_due_bill_instances(pool: &DbPool, horizon: NaiveDate) -> Result<Vec<BillInstance>> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        let due_bills = recurring_bills::table
            .filter(recurring_bills::active.eq(true))
            .filter(recurring_bills::next_due_date.le(horizon))
            .load::<RecurringBill>(conn)?;

        let mut created = Vec::new();
        for bill in due_bills {
            let mut next_due = bill.next_due_date;
            while next_due <= horizon {
                let instance = BillInstance::new(&bill, next_due);
                let inserted = diesel::insert_or_ignore_into(bill_instances::table)
                    .values(&instance)
                    .execute(conn)?;
                if inserted > 0 {
                    created.push(instance);
                }
                match bill.frequency.advance(next_due, bill.anchor_day as u32) {
                    Some(date) => next_due = date,
                    None => {
                        warn!("Cannot advance bill {} past {}", bill.id, next_due);
                        break;
                    }
                }
            }
            diesel::update(recurring_bills::table.find(&bill.id))
                .set(recurring_bills::next_due_date.eq(next_due))
                .execute(conn)?;
            debug!("Bill {} next due {}", bill.name, next_due);
        }
        info!("Generated {} bill instance(s) through {}", created.len(), horizon);
        Ok(created)
    })
}

// Bill instances

pub fn list_bill_instances(pool: &DbPool, status: Option<BillInstanceStatus>) -> Result<Vec<BillInstance>> {
    let conn = &mut pool.get()?;
    let mut query = bill_instances::table.into_boxed();
    if let Some(status) = status {
        query = query.filter(bill_instances::status.eq(status));
    }
    let result = query
        .order(bill_instances::due_date.asc())
        .load::<BillInstance>(conn)?;
    Ok(result)
}

/// Marks a pending instance paid and records the matching expense
///
/// Runs on a connection already inside a transaction so bank matching can
/// share it.
pub(crate) fn settle_bill_instance(
    conn: &mut SqliteConnection,
    instance: &BillInstance,
    bill: &RecurringBill,
    paid_on: NaiveDate,
    bank_transaction_id: Option<&str>,
) -> QueryResult<(BillInstance, Expense)> {
    diesel::update(bill_instances::table.find(&instance.id))
        .set((
            bill_instances::status.eq(BillInstanceStatus::Paid),
            bill_instances::paid_at.eq(Some(Utc::now().naive_utc())),
            bill_instances::bank_transaction_id.eq(bank_transaction_id),
        ))
        .execute(conn)?;

    let mut expense = Expense::new(bill.name.clone(), bill.vendor.clone(), bill.category.clone(), instance.amount_cents, paid_on);
    expense.bill_instance_id = Some(instance.id.clone());
    expense.bank_transaction_id = bank_transaction_id.map(str::to_string);
    diesel::insert_into(expenses::table)
        .values(&expense)
        .execute(conn)?;

    let instance = bill_instances::table.find(&instance.id).first::<BillInstance>(conn)?;
    Ok((instance, expense))
}

fn load_instance_with_bill(conn: &mut SqliteConnection, instance_id: &str) -> QueryResult<Option<(BillInstance, RecurringBill)>> {
    bill_instances::table
        .inner_join(recurring_bills::table)
        .filter(bill_instances::id.eq(instance_id))
        .select((BillInstance::as_select(), RecurringBill::as_select()))
        .first::<(BillInstance, RecurringBill)>(conn)
        .optional()
}

/// Pays a PENDING bill instance by hand, dated `paid_on`
#[instrument(skip(pool))]
pub fn pay_bill_instance(pool: &DbPool, instance_id: &str, paid_on: NaiveDate) -> Result<Option<BillInstanceUpdate>> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        let Some((instance, bill)) = load_instance_with_bill(conn, instance_id)? else {
            return Ok(None);
        };
        if instance.status != BillInstanceStatus::Pending {
            return Ok(Some(BillInstanceUpdate::NotPending(instance.status)));
        }
        let (instance, expense) = settle_bill_instance(conn, &instance, &bill, paid_on, None)?;
        info!("Paid bill instance {} for {}", instance.id, bill.name);
        Ok(Some(BillInstanceUpdate::Paid(instance, expense)))
    })
}

pub fn skip_bill_instance(pool: &DbPool, instance_id: &str) -> Result<Option<BillInstanceUpdate>> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        let Some(instance) = bill_instances::table
            .find(instance_id)
            .first::<BillInstance>(conn)
            .optional()?
        else {
            return Ok(None);
        };
        if instance.status != BillInstanceStatus::Pending {
            return Ok(Some(BillInstanceUpdate::NotPending(instance.status)));
        }
        diesel::update(bill_instances::table.find(instance_id))
            .set(bill_instances::status.eq(BillInstanceStatus::Skipped))
            .execute(conn)?;
        let instance = bill_instances::table.find(instance_id).first::<BillInstance>(conn)?;
        info!("Skipped bill instance {}", instance_id);
        Ok(Some(BillInstanceUpdate::Skipped(instance)))
    })
}

// Proposed bills

/// Stores a proposal unless its source message was already proposed
///
/// ### Returns
///
/// Whether a new proposal was stored
pub fn insert_proposed_bill_if_new(pool: &DbPool, proposal: &ProposedBill) -> Result<bool> {
    let conn = &mut pool.get()?;
    let inserted = diesel::insert_or_ignore_into(proposed_bills::table)
        .values(proposal)
        .execute(conn)?;
    if inserted > 0 {
        info!("Proposed bill from {} ({})", proposal.vendor, proposal.source_message_id);
    }
    Ok(inserted > 0)
}

pub fn list_proposed_bills(pool: &DbPool, status: Option<ProposalStatus>) -> Result<Vec<ProposedBill>> {
    let conn = &mut pool.get()?;
    let mut query = proposed_bills::table.into_boxed();
    if let Some(status) = status {
        query = query.filter(proposed_bills::status.eq(status));
    }
    let result = query
        .order(proposed_bills::created_at.desc())
        .load::<ProposedBill>(conn)?;
    Ok(result)
}

/// Turns a PENDING proposal into a MONTHLY recurring bill
///
/// The first due date is the one found in the message, or `today` when the
/// message had none.
#[instrument(skip(pool))]
pub fn approve_proposed_bill(pool: &DbPool, proposal_id: &str, today: NaiveDate) -> Result<Option<ProposalApproval>> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        let Some(proposal) = proposed_bills::table
            .find(proposal_id)
            .first::<ProposedBill>(conn)
            .optional()?
        else {
            return Ok(None);
        };
        if proposal.status != ProposalStatus::Pending {
            return Ok(Some(ProposalApproval::NotPending(proposal.status)));
        }
        let Some(amount) = proposal.amount_cents else {
            return Ok(Some(ProposalApproval::MissingAmount));
        };

        let bill = RecurringBill::new(
            proposal.vendor.clone(),
            proposal.vendor.clone(),
            amount,
            BillFrequency::Monthly,
            proposal.due_date.unwrap_or(today),
        );
        diesel::insert_into(recurring_bills::table)
            .values(&bill)
            .execute(conn)?;
        diesel::update(proposed_bills::table.find(proposal_id))
            .set(proposed_bills::status.eq(ProposalStatus::Approved))
            .execute(conn)?;
        let proposal = proposed_bills::table.find(proposal_id).first::<ProposedBill>(conn)?;
        info!("Approved proposed bill {} as {}", proposal_id, bill.id);
        Ok(Some(ProposalApproval::Approved(proposal, bill)))
    })
}

/// Rejects a proposal
///
/// ### Returns
///
/// `None` when the proposal does not exist
pub fn reject_proposed_bill(pool: &DbPool, proposal_id: &str) -> Result<Option<ProposedBill>> {
    let conn = &mut pool.get()?;
    let updated = diesel::update(proposed_bills::table.find(proposal_id))
        .set(proposed_bills::status.eq(ProposalStatus::Rejected))
        .execute(conn)?;
    if updated == 0 {
        return Ok(None);
    }
    let proposal = proposed_bills::table.find(proposal_id).first::<ProposedBill>(conn).optional()?;
    Ok(proposal)
}
