/// Web API Handlers
///
/// This module contains the handlers for the RESTful API endpoints, one file
/// per area of the business. Handlers extract and validate the request, call
/// the repository or a service, and map the outcome to a response.

mod catalog_handlers;
mod order_handlers;
mod payment_handlers;
mod client_handlers;
mod invoice_handlers;
mod contract_handlers;
mod partner_handlers;
mod lead_handlers;
mod expense_handlers;
mod bank_handlers;
mod cron_handlers;

// Re-export all handlers
pub use catalog_handlers::*;
pub use order_handlers::*;
pub use payment_handlers::*;
pub use client_handlers::*;
pub use invoice_handlers::*;
pub use contract_handlers::*;
pub use partner_handlers::*;
pub use lead_handlers::*;
pub use expense_handlers::*;
pub use bank_handlers::*;
pub use cron_handlers::*;
