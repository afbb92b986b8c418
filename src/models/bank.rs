use chrono::{NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A linked bank account at the transaction aggregator
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::bank_connections)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BankConnection {
    pub id: String,
    pub institution_name: String,
    #[serde(skip_serializing, default)]
    pub access_token: String,
    /// Sync cursor returned by the last successful sync
    pub cursor: Option<String>,
    pub last_synced_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

impl BankConnection {
    pub fn new(institution_name: String, access_token: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            institution_name,
            access_token,
            cursor: None,
            last_synced_at: None,
            created_at: Utc::now().naive_utc(),
        }
    }
}

/// A transaction imported from the bank feed
///
/// Positive amounts are money leaving the account.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::bank_transactions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BankTransaction {
    pub id: String,
    pub connection_id: String,
    pub external_id: String,
    pub amount_cents: i64,
    pub description: String,
    pub merchant_name: Option<String>,
    pub transaction_date: NaiveDate,
    pub pending: bool,
    pub created_at: NaiveDateTime,
}

impl BankTransaction {
    /// Whether the transaction's merchant or description mentions `vendor`
    pub fn mentions_vendor(&self, vendor: &str) -> bool {
        let vendor = vendor.trim().to_lowercase();
        if vendor.is_empty() {
            return false;
        }
        self.merchant_name
            .as_deref()
            .is_some_and(|m| m.to_lowercase().contains(&vendor))
            || self.description.to_lowercase().contains(&vendor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transaction(description: &str, merchant: Option<&str>) -> BankTransaction {
        BankTransaction {
            id: "t1".to_string(),
            connection_id: "c1".to_string(),
            external_id: "ext".to_string(),
            amount_cents: 2_000,
            description: description.to_string(),
            merchant_name: merchant.map(str::to_string),
            transaction_date: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            pending: false,
            created_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn test_mentions_vendor() {
        assert!(transaction("VERCEL INC 8472", None).mentions_vendor("Vercel"));
        assert!(transaction("POS 1234", Some("Adobe Systems")).mentions_vendor("adobe"));
        assert!(!transaction("POS 1234", Some("Adobe Systems")).mentions_vendor("Figma"));
        assert!(!transaction("anything", None).mentions_vendor("  "));
    }
}
