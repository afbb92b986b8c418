use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PrintOrderStatus;

/// Maximum number of manual retries for a failed submission
pub const MAX_PRINT_RETRIES: i32 = 5;

/// Tracks the print-on-demand submission for an order
///
/// There is at most one print order per storefront order. A failed
/// submission keeps the provider's error so an admin can decide whether to
/// retry.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::print_orders)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PrintOrder {
    id: String,
    order_id: String,
    /// Order id at the fulfillment provider
    external_id: Option<String>,
    status: PrintOrderStatus,
    retry_count: i32,
    last_error: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl PrintOrder {
    pub fn new(order_id: &str) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            external_id: None,
            status: PrintOrderStatus::Pending,
            retry_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn get_id(&self) -> String {
        self.id.clone()
    }

    pub fn get_order_id(&self) -> String {
        self.order_id.clone()
    }

    pub fn get_external_id(&self) -> Option<String> {
        self.external_id.clone()
    }

    pub fn get_status(&self) -> PrintOrderStatus {
        self.status
    }

    pub fn get_retry_count(&self) -> i32 {
        self.retry_count
    }

    pub fn get_last_error(&self) -> Option<String> {
        self.last_error.clone()
    }

    /// Whether an admin may retry this submission
    pub fn can_retry(&self) -> bool {
        self.status == PrintOrderStatus::Failed && self.retry_count < MAX_PRINT_RETRIES
    }

    pub fn get_created_at(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.created_at, Utc)
    }

    pub fn get_updated_at(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.updated_at, Utc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_print_order_is_pending() {
        let print_order = PrintOrder::new("order-1");
        assert_eq!(print_order.get_status(), PrintOrderStatus::Pending);
        assert_eq!(print_order.get_retry_count(), 0);
        assert!(!print_order.can_retry());
    }

    #[test]
    fn test_retry_cap() {
        let mut print_order = PrintOrder::new("order-1");
        print_order.status = PrintOrderStatus::Failed;
        assert!(print_order.can_retry());
        print_order.retry_count = MAX_PRINT_RETRIES;
        assert!(!print_order.can_retry());
    }
}
