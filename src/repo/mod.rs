/// Repository module
///
/// This module provides the data access layer for the application. Each
/// file owns the queries for one area of the business; multi-row writes run
/// inside a single transaction.

mod product_repo;
mod order_repo;
mod print_order_repo;
mod client_repo;
mod invoice_repo;
mod contract_repo;
mod partner_repo;
mod affiliate_repo;
mod inquiry_repo;
mod expense_repo;
mod bank_repo;
mod dashboard_repo;

// Re-export all repository functions
pub use product_repo::*;
pub use order_repo::*;
pub use print_order_repo::*;
pub use client_repo::*;
pub use invoice_repo::*;
pub use contract_repo::*;
pub use partner_repo::*;
pub use affiliate_repo::*;
pub use inquiry_repo::*;
pub use expense_repo::*;
pub use bank_repo::*;
pub use dashboard_repo::*;

/// Result of recording a payment against an order or invoice
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentRecorded<T> {
    /// The record moved to PAID by this call
    Marked(T),
    /// The record was already paid; nothing changed
    Unchanged(T),
}

impl<T> PaymentRecorded<T> {
    pub fn into_inner(self) -> T {
        match self {
            PaymentRecorded::Marked(record) | PaymentRecorded::Unchanged(record) => record,
        }
    }
}
