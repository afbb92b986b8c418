//! Workflows that span the database and third-party providers
//!
//! Handlers stay thin: they parse the request, call into one of these
//! modules, and render the result. Provider failures that must not fail the
//! request (emails, fulfillment after payment) are logged here.

pub mod bank_sync;
pub mod bills;
pub mod checkout;
pub mod contracts;
pub mod fulfillment;
pub mod payments;
pub mod recurring_invoices;
pub mod shipping;
