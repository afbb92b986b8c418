use crate::db::DbPool;
use crate::integrations::{FeedSync, FeedTransaction};
use crate::models::{BankConnection, BankTransaction, BillInstance, BillInstanceStatus, Expense, RecurringBill};
use crate::schema::{bank_connections, bank_transactions, bill_instances, recurring_bills};
use super::expense_repo::settle_bill_instance;
use anyhow::Result;
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, instrument};

/// Days either side of a bill's due date in which a payment can match it
pub const MATCH_WINDOW_DAYS: i64 = 7;

/// What one sync changed for a connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounts {
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
}

/// A bill instance settled by a bank transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillMatch {
    pub bill_instance_id: String,
    pub bank_transaction_id: String,
    pub vendor: String,
    pub amount_cents: i64,
    pub expense_id: String,
}

pub fn create_bank_connection(pool: &DbPool, connection: BankConnection) -> Result<BankConnection> {
    let conn = &mut pool.get()?;
    diesel::insert_into(bank_connections::table)
        .values(&connection)
        .execute(conn)?;
    info!("Linked bank connection {} ({})", connection.id, connection.institution_name);
    Ok(connection)
}

pub fn list_bank_connections(pool: &DbPool) -> Result<Vec<BankConnection>> {
    let conn = &mut pool.get()?;
    let result = bank_connections::table
        .order(bank_connections::created_at.asc())
        .load::<BankConnection>(conn)?;
    Ok(result)
}

fn upsert_transaction(conn: &mut SqliteConnection, connection_id: &str, feed: &FeedTransaction) -> QueryResult<()> {
    let updated = diesel::update(bank_transactions::table.filter(bank_transactions::external_id.eq(&feed.external_id)))
        .set((
            bank_transactions::amount_cents.eq(feed.amount_cents),
            bank_transactions::description.eq(&feed.description),
            bank_transactions::merchant_name.eq(feed.merchant_name.as_deref()),
            bank_transactions::transaction_date.eq(feed.date),
            bank_transactions::pending.eq(feed.pending),
        ))
        .execute(conn)?;
    if updated == 0 {
        let transaction = BankTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            connection_id: connection_id.to_string(),
            external_id: feed.external_id.clone(),
            amount_cents: feed.amount_cents,
            description: feed.description.clone(),
            merchant_name: feed.merchant_name.clone(),
            transaction_date: feed.date,
            pending: feed.pending,
            created_at: Utc::now().naive_utc(),
        };
        diesel::insert_into(bank_transactions::table)
            .values(&transaction)
            .execute(conn)?;
    }
    Ok(())
}

/// Applies one feed sync to a connection and stores the new cursor
///
/// Added and modified transactions are upserted by external id, removed ones
/// deleted. Nothing is written if any step fails.
#[instrument(skip(pool, sync), fields(added = sync.added.len(), modified = sync.modified.len()))]
pub fn apply_bank_sync(pool: &DbPool, connection_id: &str, sync: &FeedSync) -> Result<SyncCounts> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        for feed in sync.added.iter().chain(sync.modified.iter()) {
            upsert_transaction(conn, connection_id, feed)?;
        }
        let removed = if sync.removed.is_empty() {
            0
        } else {
            diesel::delete(bank_transactions::table.filter(bank_transactions::external_id.eq_any(&sync.removed))).execute(conn)?
        };
        diesel::update(bank_connections::table.find(connection_id))
            .set((
                bank_connections::cursor.eq(sync.next_cursor.as_deref()),
                bank_connections::last_synced_at.eq(Some(Utc::now().naive_utc())),
            ))
            .execute(conn)?;

        let counts = SyncCounts { added: sync.added.len(), modified: sync.modified.len(), removed };
        info!("Synced connection {}: {:?}", connection_id, counts);
        Ok(counts)
    })
}

/// Lists transactions newest first, optionally within `[start, end)`
pub fn list_bank_transactions(pool: &DbPool, range: Option<(NaiveDate, NaiveDate)>) -> Result<Vec<BankTransaction>> {
    let conn = &mut pool.get()?;
    let mut query = bank_transactions::table.into_boxed();
    if let Some((start, end)) = range {
        query = query
            .filter(bank_transactions::transaction_date.ge(start))
            .filter(bank_transactions::transaction_date.lt(end));
    }
    let result = query
        .order(bank_transactions::transaction_date.desc())
        .load::<BankTransaction>(conn)?;
    Ok(result)
}

/// Settles PENDING bill instances with posted outflows that pay them
///
/// A transaction pays an instance when the amounts are equal, its merchant
/// or description mentions the bill's vendor, and it is dated within
/// [`MATCH_WINDOW_DAYS`] of the due date. Each transaction settles at most one
/// instance and each match records an expense dated on the transaction.
#[instrument(skip(pool))]
pub fn match_bill_payments(pool: &DbPool) -> Result<Vec<BillMatch>> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        let pending: Vec<(BillInstance, RecurringBill)> = bill_instances::table
            .inner_join(recurring_bills::table)
            .filter(bill_instances::status.eq(BillInstanceStatus::Pending))
            .order(bill_instances::due_date.asc())
            .select((BillInstance::as_select(), RecurringBill::as_select()))
            .load(conn)?;
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let mut used: HashSet<String> = bill_instances::table
            .filter(bill_instances::bank_transaction_id.is_not_null())
            .select(bill_instances::bank_transaction_id)
            .load::<Option<String>>(conn)?
            .into_iter()
            .flatten()
            .collect();
        let outflows = bank_transactions::table
            .filter(bank_transactions::pending.eq(false))
            .filter(bank_transactions::amount_cents.gt(0))
            .order(bank_transactions::transaction_date.asc())
            .load::<BankTransaction>(conn)?;

        let mut matches = Vec::new();
        for (instance, bill) in pending {
            let candidate = outflows.iter().find(|t| {
                !used.contains(&t.id)
                    && t.amount_cents == instance.amount_cents
                    && (t.transaction_date - instance.due_date).num_days().abs() <= MATCH_WINDOW_DAYS
                    && t.mentions_vendor(&bill.vendor)
            });
            let Some(transaction) = candidate else {
                debug!("No payment found for {} due {}", bill.vendor, instance.due_date);
                continue;
            };
            let (settled, expense): (BillInstance, Expense) =
                settle_bill_instance(conn, &instance, &bill, transaction.transaction_date, Some(&transaction.id))?;
            used.insert(transaction.id.clone());
            info!("Matched {} to bill instance {}", transaction.external_id, settled.id);
            matches.push(BillMatch {
                bill_instance_id: settled.id,
                bank_transaction_id: transaction.id.clone(),
                vendor: bill.vendor.clone(),
                amount_cents: settled.amount_cents,
                expense_id: expense.id,
            });
        }
        Ok(matches)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BillFrequency, RecurringBill};
    use crate::repo::{create_recurring_bill, generate_due_bill_instances, list_bill_instances, list_expenses};
    use crate::test_utils::setup_test_db;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn feed(id: &str, amount: i64, merchant: &str, on: NaiveDate) -> FeedTransaction {
        FeedTransaction {
            external_id: id.to_string(),
            amount_cents: amount,
            description: format!("POS {}", merchant.to_uppercase()),
            merchant_name: Some(merchant.to_string()),
            date: on,
            pending: false,
        }
    }

    fn seed_connection(pool: &DbPool) -> BankConnection {
        create_bank_connection(pool, BankConnection::new("Chase".to_string(), "access-sandbox-1".to_string())).unwrap()
    }

    #[test]
    fn test_apply_sync_upserts_and_removes() {
        let pool = setup_test_db();
        let connection = seed_connection(&pool);
        let first = FeedSync {
            added: vec![feed("tx-1", 8_999, "Spectrum", date(2026, 3, 2)), feed("tx-2", 1_250, "Chipotle", date(2026, 3, 3))],
            modified: vec![],
            removed: vec![],
            next_cursor: Some("cursor-1".to_string()),
        };
        apply_bank_sync(&pool, &connection.id, &first).unwrap();

        let second = FeedSync {
            added: vec![],
            modified: vec![feed("tx-1", 9_100, "Spectrum", date(2026, 3, 2))],
            removed: vec!["tx-2".to_string()],
            next_cursor: Some("cursor-2".to_string()),
        };
        let counts = apply_bank_sync(&pool, &connection.id, &second).unwrap();

        assert_eq!(counts, SyncCounts { added: 0, modified: 1, removed: 1 });
        let transactions = list_bank_transactions(&pool, None).unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].amount_cents, 9_100);
        let connection = &list_bank_connections(&pool).unwrap()[0];
        assert_eq!(connection.cursor.as_deref(), Some("cursor-2"));
        assert!(connection.last_synced_at.is_some());
    }

    #[test]
    fn test_matching_pays_bill_once() {
        let pool = setup_test_db();
        let connection = seed_connection(&pool);
        create_recurring_bill(
            &pool,
            RecurringBill::new("Internet".to_string(), "Spectrum".to_string(), 8_999, BillFrequency::Monthly, date(2026, 3, 1)),
        )
        .unwrap();
        generate_due_bill_instances(&pool, date(2026, 3, 8)).unwrap();
        let sync = FeedSync {
            added: vec![
                feed("tx-wrong-amount", 8_000, "Spectrum", date(2026, 3, 2)),
                feed("tx-too-late", 8_999, "Spectrum", date(2026, 3, 20)),
                feed("tx-right", 8_999, "Spectrum", date(2026, 3, 4)),
            ],
            modified: vec![],
            removed: vec![],
            next_cursor: None,
        };
        apply_bank_sync(&pool, &connection.id, &sync).unwrap();

        let matches = match_bill_payments(&pool).unwrap();

        assert_eq!(matches.len(), 1);
        let instances = list_bill_instances(&pool, None).unwrap();
        assert_eq!(instances[0].status, BillInstanceStatus::Paid);
        let expenses = list_expenses(&pool, None).unwrap();
        assert_eq!(expenses.len(), 1);
        assert_eq!(expenses[0].expense_date, date(2026, 3, 4));
        assert_eq!(expenses[0].bank_transaction_id.as_deref(), Some(matches[0].bank_transaction_id.as_str()));

        assert!(match_bill_payments(&pool).unwrap().is_empty());
    }

    #[test]
    fn test_transactions_by_month() {
        let pool = setup_test_db();
        let connection = seed_connection(&pool);
        let sync = FeedSync {
            added: vec![feed("a", 100, "A", date(2026, 2, 28)), feed("b", 200, "B", date(2026, 3, 1))],
            modified: vec![],
            removed: vec![],
            next_cursor: None,
        };
        apply_bank_sync(&pool, &connection.id, &sync).unwrap();

        let march = list_bank_transactions(&pool, Some((date(2026, 3, 1), date(2026, 4, 1)))).unwrap();
        assert_eq!(march.len(), 1);
        assert_eq!(march[0].external_id, "b");
    }
}
