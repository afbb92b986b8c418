//! 47 Industries: storefront and back office
//!
//! This library provides the storefront (catalog, checkout, shipping and
//! print-on-demand fulfillment), the service side of the business (clients,
//! invoices, recurring billing, contracts with e-signature), the partner and
//! MotoRev affiliate programs, inbound leads, and bookkeeping (expenses,
//! recurring bills, mailbox bill discovery and bank sync).
//!
//! ### Web API
//!
//! - `/api/...` public storefront, signer and webhook routes
//! - `/api/admin/...` back office routes, bearer admin token
//! - `/api/cron/...` scheduled jobs, bearer cron secret

/// Shared-secret checks and token generation
pub mod auth;

/// Layered configuration (defaults, TOML file, environment, flags)
pub mod config;

/// Database connection management and migrations
pub mod db;

/// Request and query payloads
pub mod dto;

/// Outgoing email templates
pub mod email;

/// API error type and its HTTP mapping
pub mod errors;

/// HTTP request handlers
pub mod handlers;

/// Adapters for payment, shipping, fulfillment, mail, bank and mailbox providers
pub mod integrations;

/// Data models module
pub mod models;

/// Integer-cent arithmetic and formatting
pub mod money;

/// Contract PDF stamping
pub mod pdf;

/// Repository module for database operations
pub mod repo;

/// Database schema module
pub mod schema;

/// Workflows spanning several repositories and providers
pub mod services;

/// Shared application state
pub mod state;

#[cfg(test)]
pub mod test_utils;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::auth::{require_admin, require_cron};
use crate::errors::ApiError;
use crate::handlers::*;
use crate::state::AppState;

/// Upper bound for request bodies carrying a base64 contract PDF
const CONTRACT_UPLOAD_LIMIT: usize = 25 * 1024 * 1024;

fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Catalog and checkout
        .route("/api/products", get(list_products_handler))
        .route("/api/products/{slug}", get(get_product_handler))
        .route("/api/shipping/rates", post(shipping_rates_handler))
        .route("/api/checkout", post(checkout_handler))
        .route("/api/orders/lookup", get(lookup_order_handler))
        .route("/api/partners/validate/{code}", get(validate_code_handler))
        // Invoices and contracts, addressed by access token
        .route("/api/invoices/{token}", get(public_invoice_handler))
        .route("/api/invoices/{token}/checkout", post(invoice_checkout_handler))
        .route("/api/contracts/{token}", get(public_contract_handler))
        .route("/api/contracts/{token}/pdf", get(public_pdf_handler))
        .route("/api/contracts/{token}/sign", post(sign_contract_handler))
        .route("/api/contracts/{token}/signed-pdf", get(public_signed_pdf_handler))
        // Webhooks, each checking its own secret
        .route("/api/webhooks/stripe", post(stripe_webhook_handler))
        .route("/api/webhooks/leads", post(lead_webhook_handler))
        // MotoRev portal
        .route("/api/motorev/affiliate/connect", post(connect_affiliate_handler))
        .route("/api/motorev/affiliate/dashboard", get(affiliate_dashboard_handler))
        .route("/api/motorev/referrals", post(record_affiliate_referral_handler))
}

fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/admin/dashboard", get(dashboard_handler))
        // Catalog
        .route("/api/admin/products", get(admin_list_products_handler).post(create_product_handler))
        .route("/api/admin/products/{id}", put(update_product_handler).delete(delete_product_handler))
        // Orders and fulfillment
        .route("/api/admin/orders", get(list_orders_handler))
        .route("/api/admin/orders/{id}", get(get_order_handler))
        .route("/api/admin/orders/{id}/status", patch(update_order_status_handler))
        .route("/api/admin/orders/{id}/label", post(buy_label_handler))
        .route("/api/admin/print-orders", get(list_print_orders_handler))
        .route("/api/admin/print-orders/{id}/retry", post(retry_print_order_handler))
        // Clients and invoices
        .route("/api/admin/clients", get(list_clients_handler).post(create_client_handler))
        .route("/api/admin/clients/{id}", get(get_client_handler).put(update_client_handler))
        .route(
            "/api/admin/clients/{id}/recurring-charges",
            get(list_recurring_charges_handler).post(create_recurring_charge_handler),
        )
        .route("/api/admin/recurring-charges/{id}", delete(delete_recurring_charge_handler))
        .route("/api/admin/invoices", get(list_invoices_handler).post(create_invoice_handler))
        .route("/api/admin/invoices/{id}", get(get_invoice_handler))
        .route("/api/admin/invoices/{id}/send", post(send_invoice_handler))
        .route("/api/admin/invoices/{id}/mark-paid", post(mark_invoice_paid_handler))
        .route("/api/admin/invoices/{id}/cancel", post(cancel_invoice_handler))
        // Contracts
        .route(
            "/api/admin/contracts",
            get(list_contracts_handler)
                .post(create_contract_handler)
                .layer(DefaultBodyLimit::max(CONTRACT_UPLOAD_LIMIT)),
        )
        .route("/api/admin/contracts/{id}", get(get_contract_handler))
        .route("/api/admin/contracts/{id}/fields", put(replace_fields_handler))
        .route("/api/admin/contracts/{id}/send", post(send_contract_handler))
        .route("/api/admin/contracts/{id}/countersign", post(countersign_handler))
        .route("/api/admin/contracts/{id}/cancel", post(cancel_contract_handler))
        .route("/api/admin/contracts/{id}/signed-pdf", get(admin_signed_pdf_handler))
        // Partners and affiliates
        .route("/api/admin/partners", get(list_partners_handler).post(create_partner_handler))
        .route("/api/admin/partners/{id}", get(get_partner_handler).put(update_partner_handler))
        .route("/api/admin/partners/{id}/payout", post(partner_payout_handler))
        .route("/api/admin/partner-referrals/{id}/approve", post(approve_referral_handler))
        .route("/api/admin/partner-referrals/{id}/void", post(void_referral_handler))
        .route("/api/admin/affiliates", get(list_affiliates_handler))
        .route("/api/admin/affiliates/{id}/suspend", post(suspend_affiliate_handler))
        .route("/api/admin/affiliates/{id}/status", patch(set_affiliate_status_handler))
        .route("/api/admin/affiliates/{id}/payout", post(affiliate_payout_handler))
        // Leads
        .route("/api/admin/inquiries", get(list_inquiries_handler))
        .route("/api/admin/inquiries/{id}/status", patch(update_inquiry_status_handler))
        // Bookkeeping
        .route("/api/admin/expenses", get(list_expenses_handler).post(create_expense_handler))
        .route(
            "/api/admin/expenses/{id}",
            get(get_expense_handler).put(update_expense_handler).delete(delete_expense_handler),
        )
        .route("/api/admin/recurring-bills", get(list_recurring_bills_handler).post(create_recurring_bill_handler))
        .route("/api/admin/recurring-bills/{id}", get(get_recurring_bill_handler).put(update_recurring_bill_handler))
        .route("/api/admin/bill-instances", get(list_bill_instances_handler))
        .route("/api/admin/bill-instances/{id}/pay", post(pay_bill_instance_handler))
        .route("/api/admin/bill-instances/{id}/skip", post(skip_bill_instance_handler))
        .route("/api/admin/bills/scan", post(scan_bills_handler))
        .route("/api/admin/proposed-bills", get(list_proposed_bills_handler))
        .route("/api/admin/proposed-bills/{id}/approve", post(approve_proposed_bill_handler))
        .route("/api/admin/proposed-bills/{id}/reject", post(reject_proposed_bill_handler))
        .route(
            "/api/admin/bank/connections",
            get(list_bank_connections_handler).post(create_bank_connection_handler),
        )
        .route("/api/admin/bank/sync", post(bank_sync_handler))
        .route("/api/admin/bank/transactions", get(list_bank_transactions_handler))
}

fn cron_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/cron/recurring-invoices", post(recurring_invoices_cron_handler))
        .route("/api/cron/bills", post(bills_cron_handler))
}

/// Creates the application router with all routes
///
/// Admin and cron routes sit behind their bearer-token middleware; every
/// other route is public or checks its own webhook secret.
///
/// ### Arguments
///
/// * `state` - The shared application state
///
/// ### Returns
///
/// A configured Axum router
pub fn create_app(state: Arc<AppState>) -> Router {
    let admin = admin_routes().route_layer(middleware::from_fn_with_state(state.clone(), require_admin));
    let cron = cron_routes().route_layer(middleware::from_fn_with_state(state.clone(), require_cron));

    Router::new()
        .merge(public_routes())
        .merge(admin)
        .merge(cron)
        .method_not_allowed_fallback(|| async { ApiError::MethodNotAllowed })
        .layer(CorsLayer::permissive())
        .with_state(state)
}
