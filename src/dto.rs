use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::integrations::Parcel;
use crate::models::{
    Address, AffiliateStatus, BillFrequency, BillInstanceStatus, ContractStatus, Fulfillment, InquiryStatus, InvoiceStatus,
    OrderStatus, PartnerStatus, PrintOrderStatus, ProposalStatus, ReferralEvent, SignatureParty,
};

/// Prefix every drawn signature must carry
pub const SIGNATURE_DATA_PREFIX: &str = "data:image/png;base64,";

fn default_quantity() -> i32 {
    1
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Checks that an email address is present and contains `@`
pub fn valid_email(email: &str) -> bool {
    let email = email.trim();
    !email.is_empty() && email.contains('@')
}

/// Parses a `YYYY-MM` month into its `[start, end)` date range
pub fn parse_month(month: &str) -> Option<(NaiveDate, NaiveDate)> {
    let (year, month) = month.trim().split_once('-')?;
    if year.len() != 4 || month.len() != 2 {
        return None;
    }
    let start = NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1)?;
    let end = start.checked_add_months(chrono::Months::new(1))?;
    Some((start, end))
}

/// The `YYYY-MM` label of the month containing `date`
pub fn month_label(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

// ===== Catalog =====

/// Data transfer object for creating a product
#[derive(Deserialize, Debug)]
pub struct CreateProductDto {
    pub name: String,

    /// Derived from the name when omitted
    #[serde(default)]
    pub slug: Option<String>,

    #[serde(default)]
    pub description: String,

    pub price_cents: i64,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub images: Vec<String>,

    #[serde(default)]
    pub fulfillment: Option<Fulfillment>,

    /// Required for print-on-demand products
    #[serde(default)]
    pub printful_variant_id: Option<i64>,

    /// In-house stock on hand; absent means untracked
    #[serde(default)]
    pub stock: Option<i32>,
}

impl CreateProductDto {
    pub fn validate(&self) -> Result<(), String> {
        if blank(&self.name) {
            return Err("name is required".to_string());
        }
        if self.price_cents < 0 {
            return Err("price_cents must not be negative".to_string());
        }
        if self.fulfillment == Some(Fulfillment::PrintOnDemand) && self.printful_variant_id.is_none() {
            return Err("print-on-demand products need a printful_variant_id".to_string());
        }
        if self.stock.is_some_and(|s| s < 0) {
            return Err("stock must not be negative".to_string());
        }
        Ok(())
    }
}

/// Data transfer object for updating a product; absent fields are left alone
#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct UpdateProductDto {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub category: Option<String>,
    pub images: Option<Vec<String>>,
    pub printful_variant_id: Option<i64>,
    pub stock: Option<i32>,
    pub active: Option<bool>,
}

impl UpdateProductDto {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.as_deref().is_some_and(blank) {
            return Err("name must not be blank".to_string());
        }
        if self.price_cents.is_some_and(|p| p < 0) {
            return Err("price_cents must not be negative".to_string());
        }
        if self.stock.is_some_and(|s| s < 0) {
            return Err("stock must not be negative".to_string());
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct ProductQuery {
    pub category: Option<String>,
}

// ===== Checkout and orders =====

#[derive(Deserialize, Debug, Clone)]
pub struct CheckoutItemDto {
    pub product_id: String,
    pub quantity: i32,
}

/// The shipping option picked from the rate quotes
#[derive(Deserialize, Debug, Clone)]
pub struct ShippingChoiceDto {
    pub provider: String,
    pub service: String,
    pub amount_cents: i64,
}

/// Data transfer object for starting a storefront checkout
#[derive(Deserialize, Debug)]
pub struct CheckoutDto {
    pub email: String,
    pub name: String,
    pub shipping_address: Address,
    pub items: Vec<CheckoutItemDto>,
    #[serde(default)]
    pub shipping: Option<ShippingChoiceDto>,
    /// Partner code entered at checkout
    #[serde(default)]
    pub referral_code: Option<String>,
}

impl CheckoutDto {
    pub fn validate(&self) -> Result<(), String> {
        if !valid_email(&self.email) {
            return Err("a valid email is required".to_string());
        }
        if blank(&self.name) {
            return Err("name is required".to_string());
        }
        let missing = self.shipping_address.missing_fields();
        if !missing.is_empty() {
            return Err(format!("shipping_address is missing: {}", missing.join(", ")));
        }
        if self.items.is_empty() {
            return Err("at least one item is required".to_string());
        }
        if self.items.iter().any(|item| item.quantity < 1) {
            return Err("item quantities must be at least 1".to_string());
        }
        if self.shipping.as_ref().is_some_and(|s| s.amount_cents < 0) {
            return Err("shipping amount must not be negative".to_string());
        }
        Ok(())
    }
}

/// Filters for the admin order list
///
/// `status` may repeat: `?status=PAID&status=SHIPPED`.
#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct OrderListQuery {
    pub status: Vec<OrderStatus>,
}

#[derive(Deserialize, Debug)]
pub struct OrderLookupQuery {
    pub email: String,
    pub order_number: String,
}

#[derive(Deserialize, Debug)]
pub struct UpdateOrderStatusDto {
    pub status: OrderStatus,
}

// ===== Shipping =====

#[derive(Deserialize, Debug)]
pub struct ShippingRatesDto {
    pub to: Address,
    /// Defaults to a 10×8×4 in, 16 oz box
    #[serde(default)]
    pub parcel: Option<Parcel>,
}

#[derive(Deserialize, Debug)]
pub struct BuyLabelDto {
    pub provider: String,
    pub rate_id: String,
    #[serde(default)]
    pub shipment_id: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct PrintOrderQuery {
    pub status: Option<PrintOrderStatus>,
}

// ===== Clients and invoices =====

/// Data transfer object for creating a client
#[derive(Deserialize, Debug)]
pub struct CreateClientDto {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    /// Days from issue until a recurring invoice is due
    #[serde(default)]
    pub payment_terms_days: Option<i32>,
    #[serde(default)]
    pub autopay_enabled: bool,
    #[serde(default)]
    pub stripe_customer_id: Option<String>,
    #[serde(default)]
    pub stripe_payment_method_id: Option<String>,
}

impl CreateClientDto {
    pub fn validate(&self) -> Result<(), String> {
        if blank(&self.name) {
            return Err("name is required".to_string());
        }
        if !valid_email(&self.email) {
            return Err("a valid email is required".to_string());
        }
        if self.payment_terms_days.is_some_and(|d| d < 0) {
            return Err("payment_terms_days must not be negative".to_string());
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct UpdateClientDto {
    pub name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub payment_terms_days: Option<i32>,
    pub autopay_enabled: Option<bool>,
    pub stripe_customer_id: Option<String>,
    pub stripe_payment_method_id: Option<String>,
    pub active: Option<bool>,
}

impl UpdateClientDto {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.as_deref().is_some_and(blank) {
            return Err("name must not be blank".to_string());
        }
        if self.email.as_deref().is_some_and(|e| !valid_email(e)) {
            return Err("a valid email is required".to_string());
        }
        if self.payment_terms_days.is_some_and(|d| d < 0) {
            return Err("payment_terms_days must not be negative".to_string());
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct ClientListQuery {
    pub include_inactive: bool,
}

#[derive(Deserialize, Debug)]
pub struct CreateRecurringChargeDto {
    pub description: String,
    pub amount_cents: i64,
}

impl CreateRecurringChargeDto {
    pub fn validate(&self) -> Result<(), String> {
        if blank(&self.description) {
            return Err("description is required".to_string());
        }
        if self.amount_cents <= 0 {
            return Err("amount_cents must be positive".to_string());
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct InvoiceLineDto {
    pub description: String,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    pub unit_price_cents: i64,
}

/// Data transfer object for creating an invoice by hand
///
/// When `client_id` is given, the customer name and email default to the
/// client's.
#[derive(Deserialize, Debug)]
pub struct CreateInvoiceDto {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub issue_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub tax_bps: i32,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<InvoiceLineDto>,
}

impl CreateInvoiceDto {
    pub fn validate(&self) -> Result<(), String> {
        if self.items.is_empty() {
            return Err("at least one item is required".to_string());
        }
        for item in &self.items {
            if blank(&item.description) {
                return Err("item descriptions are required".to_string());
            }
            if item.quantity < 1 {
                return Err("item quantities must be at least 1".to_string());
            }
            if item.unit_price_cents < 0 {
                return Err("item prices must not be negative".to_string());
            }
        }
        if !(0..=10_000).contains(&self.tax_bps) {
            return Err("tax_bps must be between 0 and 10000".to_string());
        }
        if let (Some(issue), Some(due)) = (self.issue_date, self.due_date) {
            if due < issue {
                return Err("due_date must not be before issue_date".to_string());
            }
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct InvoiceListQuery {
    pub status: Vec<InvoiceStatus>,
    pub client_id: Option<String>,
}

// ===== Contracts =====

/// Data transfer object for uploading a contract
#[derive(Deserialize, Debug)]
pub struct CreateContractDto {
    pub title: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub signer_name: Option<String>,
    pub signer_email: String,
    /// The PDF document, base64 encoded
    pub pdf_base64: String,
}

impl CreateContractDto {
    pub fn validate(&self) -> Result<(), String> {
        if blank(&self.title) {
            return Err("title is required".to_string());
        }
        if !valid_email(&self.signer_email) {
            return Err("a valid signer_email is required".to_string());
        }
        if blank(&self.pdf_base64) {
            return Err("pdf_base64 is required".to_string());
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct ContractListQuery {
    pub status: Option<ContractStatus>,
}

/// A signature box, in percentages of the page measured from the top left
#[derive(Deserialize, Debug, Clone)]
pub struct SignatureFieldDto {
    pub party: SignatureParty,
    #[serde(default)]
    pub page_index: i32,
    pub x_pct: f64,
    pub y_pct: f64,
    pub width_pct: f64,
    pub height_pct: f64,
}

#[derive(Deserialize, Debug)]
pub struct ReplaceFieldsDto {
    pub fields: Vec<SignatureFieldDto>,
}

/// Data transfer object for a signer submitting their signature
#[derive(Deserialize, Debug)]
pub struct SignContractDto {
    /// A `data:image/png;base64,` URL of the drawn signature
    pub signature_data: String,
    pub legal_name: String,
    /// Signs only this field; every unsigned client field otherwise
    #[serde(default)]
    pub field_id: Option<String>,
}

impl SignContractDto {
    pub fn validate(&self) -> Result<(), String> {
        validate_signature(&self.signature_data, &self.legal_name)
    }
}

#[derive(Deserialize, Debug)]
pub struct CountersignDto {
    pub signature_data: String,
    pub legal_name: String,
}

impl CountersignDto {
    pub fn validate(&self) -> Result<(), String> {
        validate_signature(&self.signature_data, &self.legal_name)
    }
}

fn validate_signature(signature_data: &str, legal_name: &str) -> Result<(), String> {
    match signature_data.strip_prefix(SIGNATURE_DATA_PREFIX) {
        Some(payload) if !payload.trim().is_empty() => {}
        _ => return Err("signature_data must be a PNG data URL".to_string()),
    }
    if blank(legal_name) {
        return Err("legal_name is required".to_string());
    }
    Ok(())
}

// ===== Partners and affiliates =====

#[derive(Deserialize, Debug)]
pub struct CreatePartnerDto {
    pub name: String,
    pub email: String,
    /// Generated when omitted
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub commission_rate_bps: Option<i32>,
}

impl CreatePartnerDto {
    pub fn validate(&self) -> Result<(), String> {
        if blank(&self.name) {
            return Err("name is required".to_string());
        }
        if !valid_email(&self.email) {
            return Err("a valid email is required".to_string());
        }
        if self.code.as_deref().is_some_and(|c| !valid_code(c)) {
            return Err("code may only contain letters, digits and dashes".to_string());
        }
        if self.commission_rate_bps.is_some_and(|r| !(0..=10_000).contains(&r)) {
            return Err("commission_rate_bps must be between 0 and 10000".to_string());
        }
        Ok(())
    }
}

fn valid_code(code: &str) -> bool {
    let code = code.trim();
    !code.is_empty() && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct UpdatePartnerDto {
    pub name: Option<String>,
    pub email: Option<String>,
    pub commission_rate_bps: Option<i32>,
    pub status: Option<PartnerStatus>,
}

impl UpdatePartnerDto {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.as_deref().is_some_and(blank) {
            return Err("name must not be blank".to_string());
        }
        if self.email.as_deref().is_some_and(|e| !valid_email(e)) {
            return Err("a valid email is required".to_string());
        }
        if self.commission_rate_bps.is_some_and(|r| !(0..=10_000).contains(&r)) {
            return Err("commission_rate_bps must be between 0 and 10000".to_string());
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug)]
pub struct ConnectAffiliateDto {
    pub motorev_user_id: String,
    pub email: String,
    pub name: String,
}

impl ConnectAffiliateDto {
    pub fn validate(&self) -> Result<(), String> {
        if blank(&self.motorev_user_id) {
            return Err("motorev_user_id is required".to_string());
        }
        if !valid_email(&self.email) {
            return Err("a valid email is required".to_string());
        }
        Ok(())
    }
}

/// A referral event reported by the MotoRev app
#[derive(Deserialize, Debug)]
pub struct AffiliateReferralDto {
    pub affiliate_code: String,
    pub referred_user_id: String,
    pub event: ReferralEvent,
    /// Purchase amount for a PRO_CONVERSION
    #[serde(default)]
    pub amount_cents: Option<i64>,
}

impl AffiliateReferralDto {
    pub fn validate(&self) -> Result<(), String> {
        if blank(&self.affiliate_code) || blank(&self.referred_user_id) {
            return Err("affiliate_code and referred_user_id are required".to_string());
        }
        if self.amount_cents.is_some_and(|a| a < 0) {
            return Err("amount_cents must not be negative".to_string());
        }
        if self.event == ReferralEvent::ProConversion && self.amount_cents.is_none() {
            return Err("amount_cents is required for PRO_CONVERSION".to_string());
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug)]
pub struct AffiliateStatusDto {
    pub status: AffiliateStatus,
}

// ===== Leads =====

/// An inbound lead posted by the marketing site
#[derive(Deserialize, Debug)]
pub struct LeadDto {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub service_type: Option<String>,
    #[serde(default)]
    pub budget: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub source: Option<String>,
}

impl LeadDto {
    pub fn validate(&self) -> Result<(), String> {
        let mut missing = Vec::new();
        if blank(&self.name) {
            missing.push("name");
        }
        if !valid_email(&self.email) {
            missing.push("email");
        }
        if blank(&self.message) {
            missing.push("message");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!("missing or invalid: {}", missing.join(", ")))
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct InquiryQuery {
    pub status: Option<InquiryStatus>,
}

#[derive(Deserialize, Debug)]
pub struct UpdateInquiryStatusDto {
    pub status: InquiryStatus,
}

// ===== Expenses, bills and bank =====

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct MonthQuery {
    /// `YYYY-MM`
    pub month: Option<String>,
}

impl MonthQuery {
    /// The requested month's range, or `None` when no month was asked for
    pub fn range(&self) -> Result<Option<(NaiveDate, NaiveDate)>, String> {
        match self.month.as_deref() {
            None => Ok(None),
            Some(month) => parse_month(month)
                .map(Some)
                .ok_or_else(|| format!("month must look like YYYY-MM, got {:?}", month)),
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct CreateExpenseDto {
    pub description: String,
    pub vendor: String,
    #[serde(default)]
    pub category: Option<String>,
    pub amount_cents: i64,
    pub expense_date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CreateExpenseDto {
    pub fn validate(&self) -> Result<(), String> {
        if blank(&self.description) || blank(&self.vendor) {
            return Err("description and vendor are required".to_string());
        }
        if self.amount_cents < 0 {
            return Err("amount_cents must not be negative".to_string());
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct UpdateExpenseDto {
    pub description: Option<String>,
    pub vendor: Option<String>,
    pub category: Option<String>,
    pub amount_cents: Option<i64>,
    pub expense_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct CreateRecurringBillDto {
    pub name: String,
    pub vendor: String,
    #[serde(default)]
    pub category: Option<String>,
    pub amount_cents: i64,
    pub frequency: BillFrequency,
    pub next_due_date: NaiveDate,
}

impl CreateRecurringBillDto {
    pub fn validate(&self) -> Result<(), String> {
        if blank(&self.name) || blank(&self.vendor) {
            return Err("name and vendor are required".to_string());
        }
        if self.amount_cents <= 0 {
            return Err("amount_cents must be positive".to_string());
        }
        Ok(())
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct UpdateRecurringBillDto {
    pub name: Option<String>,
    pub vendor: Option<String>,
    pub category: Option<String>,
    pub amount_cents: Option<i64>,
    pub frequency: Option<BillFrequency>,
    pub next_due_date: Option<NaiveDate>,
    pub active: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct BillInstanceQuery {
    pub status: Option<BillInstanceStatus>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct PayBillInstanceDto {
    /// Defaults to today
    pub paid_on: Option<NaiveDate>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct ProposedBillQuery {
    pub status: Option<ProposalStatus>,
}

#[derive(Deserialize, Debug)]
pub struct CreateBankConnectionDto {
    pub institution_name: String,
    /// Access token from the bank link exchange
    pub access_token: String,
}

impl CreateBankConnectionDto {
    pub fn validate(&self) -> Result<(), String> {
        if blank(&self.institution_name) || blank(&self.access_token) {
            return Err("institution_name and access_token are required".to_string());
        }
        Ok(())
    }
}
