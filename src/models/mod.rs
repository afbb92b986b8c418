/// Data models module
///
/// This module defines the records stored in the database. Each struct maps
/// directly to one table; status columns use the enums from `status`.

mod json_value;
pub use json_value::JsonValue;

mod address;
pub use address::Address;

mod status;
pub use status::*;

mod product;
pub use product::{slugify, Product};

mod order;
pub use order::{generate_order_number, Order, OrderItem, OrderTotals};

mod print_order;
pub use print_order::{PrintOrder, MAX_PRINT_RETRIES};

mod client;
pub use client::{Client, RecurringCharge, DEFAULT_PAYMENT_TERMS_DAYS};

mod invoice;
pub use invoice::{compute_invoice_totals, format_invoice_number, Invoice, InvoiceItem, InvoiceTotals};

mod contract;
pub use contract::{Contract, SignatureField};

mod partner;
pub use partner::{normalize_code, Partner, PartnerReferral, DEFAULT_PARTNER_COMMISSION_BPS};

mod affiliate;
pub use affiliate::{AffiliateReferral, UserAffiliate, DEFAULT_AFFILIATE_COMMISSION_BPS};

mod inquiry;
pub use inquiry::ServiceInquiry;

mod expense;
pub use expense::{BillInstance, Expense, ProposedBill, RecurringBill};

mod bank;
pub use bank::{BankConnection, BankTransaction};
