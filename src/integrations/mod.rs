//! Third-party services behind traits
//!
//! Each provider is reached through a trait so handlers and services never
//! touch vendor payloads directly. `Integrations::from_config` wires up the
//! real adapters for every provider whose credentials are present; tests
//! substitute in-process fakes.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Config;
use crate::errors::IntegrationError;
use crate::models::Address;

pub mod easypost;
pub mod gmail;
pub mod plaid;
pub mod printful;
pub mod resend;
pub mod shippo;
pub mod stripe;

// ===== Payments =====

/// One line on a hosted checkout page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLine {
    pub name: String,
    pub unit_amount_cents: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub customer_email: String,
    pub lines: Vec<CheckoutLine>,
    pub success_url: String,
    pub cancel_url: String,
    /// Echoed back on the completion webhook
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// An off-session charge against a saved card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedMethodCharge {
    pub customer_id: String,
    pub payment_method_id: String,
    pub amount_cents: i64,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Succeeded { payment_intent_id: String },
    Declined { reason: String },
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a hosted checkout page for a one-time payment
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession, IntegrationError>;

    /// Charges a saved payment method without the customer present
    ///
    /// Card declines are an `Ok(ChargeOutcome::Declined)`; only transport and
    /// API failures are errors.
    async fn charge_saved_method(&self, charge: &SavedMethodCharge) -> Result<ChargeOutcome, IntegrationError>;
}

// ===== Shipping =====

/// Package dimensions in inches and weight in ounces
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Parcel {
    pub length_in: f64,
    pub width_in: f64,
    pub height_in: f64,
    pub weight_oz: f64,
}

impl Default for Parcel {
    fn default() -> Self {
        Self { length_in: 10.0, width_in: 8.0, height_in: 4.0, weight_oz: 16.0 }
    }
}

/// A quote normalised from any carrier aggregator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingRate {
    /// `SHIPPO` or `EASYPOST`
    pub provider: String,
    pub rate_id: String,
    pub shipment_id: Option<String>,
    pub carrier: String,
    pub service: String,
    pub amount_cents: i64,
    pub currency: String,
    pub estimated_days: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingLabel {
    pub tracking_number: String,
    pub label_url: String,
    pub carrier: String,
}

#[async_trait]
pub trait ShippingProvider: Send + Sync {
    /// Upper-case provider name stored on orders and rates
    fn name(&self) -> &'static str;

    async fn get_rates(&self, from: &Address, to: &Address, parcel: &Parcel) -> Result<Vec<ShippingRate>, IntegrationError>;

    async fn buy_label(&self, rate_id: &str, shipment_id: Option<&str>) -> Result<ShippingLabel, IntegrationError>;
}

// ===== Print-on-demand =====

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillmentItem {
    pub variant_id: i64,
    pub quantity: i32,
    pub name: String,
    pub retail_price_cents: i64,
}

#[async_trait]
pub trait FulfillmentProvider: Send + Sync {
    /// Places an order and returns the provider's id for it
    async fn submit_order(
        &self,
        external_ref: &str,
        recipient: &Address,
        items: &[FulfillmentItem],
    ) -> Result<String, IntegrationError>;
}

// ===== Email =====

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), IntegrationError>;
}

// ===== Bank feed =====

/// A transaction as reported by the bank feed; positive amounts are money out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedTransaction {
    pub external_id: String,
    pub amount_cents: i64,
    pub description: String,
    pub merchant_name: Option<String>,
    pub date: NaiveDate,
    pub pending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedSync {
    pub added: Vec<FeedTransaction>,
    pub modified: Vec<FeedTransaction>,
    pub removed: Vec<String>,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait BankFeed: Send + Sync {
    /// Pulls every change since `cursor`
    async fn sync(&self, access_token: &str, cursor: Option<&str>) -> Result<FeedSync, IntegrationError>;
}

// ===== Mailbox =====

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub id: String,
    /// Raw `From` header, e.g. `Tampa Electric <billing@tecoenergy.com>`
    pub from: String,
    pub subject: String,
    pub body: String,
    pub received_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait MailboxScanner: Send + Sync {
    async fn recent_messages(&self, max: usize) -> Result<Vec<MailMessage>, IntegrationError>;
}

/// The adapters available to this process
#[derive(Clone, Default)]
pub struct Integrations {
    pub payments: Option<Arc<dyn PaymentGateway>>,
    pub shipping: Vec<Arc<dyn ShippingProvider>>,
    pub fulfillment: Option<Arc<dyn FulfillmentProvider>>,
    pub mailer: Option<Arc<dyn Mailer>>,
    pub bank: Option<Arc<dyn BankFeed>>,
    pub mailbox: Option<Arc<dyn MailboxScanner>>,
}

fn configured(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl Integrations {
    /// Builds real adapters for every provider with credentials in `config`
    pub fn from_config(config: &Config) -> Result<Self, IntegrationError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(IntegrationError::http("http client"))?;

        let mut integrations = Integrations::default();

        if let Some(key) = configured(&config.stripe_secret_key) {
            integrations.payments = Some(Arc::new(stripe::StripeGateway::new(http.clone(), key)));
        }
        if let Some(key) = configured(&config.shippo_api_key) {
            integrations.shipping.push(Arc::new(shippo::ShippoClient::new(http.clone(), key)));
        }
        if let Some(key) = configured(&config.easypost_api_key) {
            integrations.shipping.push(Arc::new(easypost::EasyPostClient::new(http.clone(), key)));
        }
        if let Some(key) = configured(&config.printful_api_key) {
            integrations.fulfillment = Some(Arc::new(printful::PrintfulClient::new(http.clone(), key)));
        }
        if let Some(key) = configured(&config.resend_api_key) {
            integrations.mailer = Some(Arc::new(resend::ResendMailer::new(http.clone(), key, &config.email_from)));
        }
        if let (Some(client_id), Some(secret)) = (configured(&config.plaid_client_id), configured(&config.plaid_secret)) {
            integrations.bank = Some(Arc::new(plaid::PlaidClient::new(http.clone(), client_id, secret, &config.plaid_env)));
        }
        if let (Some(client_id), Some(secret), Some(refresh)) = (
            configured(&config.gmail_client_id),
            configured(&config.gmail_client_secret),
            configured(&config.gmail_refresh_token),
        ) {
            integrations.mailbox = Some(Arc::new(gmail::GmailScanner::new(http, client_id, secret, refresh)));
        }

        info!(
            "Integrations: payments={}, shipping={:?}, fulfillment={}, mailer={}, bank={}, mailbox={}",
            integrations.payments.is_some(),
            integrations.shipping.iter().map(|p| p.name()).collect::<Vec<_>>(),
            integrations.fulfillment.is_some(),
            integrations.mailer.is_some(),
            integrations.bank.is_some(),
            integrations.mailbox.is_some(),
        );

        Ok(integrations)
    }

    pub fn payments(&self) -> Result<&dyn PaymentGateway, IntegrationError> {
        self.payments.as_deref().ok_or(IntegrationError::NotConfigured("stripe"))
    }

    pub fn fulfillment(&self) -> Result<&dyn FulfillmentProvider, IntegrationError> {
        self.fulfillment.as_deref().ok_or(IntegrationError::NotConfigured("printful"))
    }

    pub fn mailer(&self) -> Result<&dyn Mailer, IntegrationError> {
        self.mailer.as_deref().ok_or(IntegrationError::NotConfigured("resend"))
    }

    pub fn bank(&self) -> Result<&dyn BankFeed, IntegrationError> {
        self.bank.as_deref().ok_or(IntegrationError::NotConfigured("plaid"))
    }

    pub fn mailbox(&self) -> Result<&dyn MailboxScanner, IntegrationError> {
        self.mailbox.as_deref().ok_or(IntegrationError::NotConfigured("gmail"))
    }

    /// Finds a shipping provider by its stored name, ignoring case
    pub fn shipping_provider(&self, name: &str) -> Option<&dyn ShippingProvider> {
        self.shipping
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
            .map(|p| p.as_ref())
    }
}

/// Reads a JSON body, turning non-2xx responses into `IntegrationError::Status`
pub(crate) async fn read_json<T: DeserializeOwned>(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<T, IntegrationError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(IntegrationError::Status { provider, status: status.as_u16(), body });
    }
    response.json::<T>().await.map_err(IntegrationError::decode(provider))
}

/// Converts a decimal dollar string from a vendor payload to cents
pub(crate) fn decimal_to_cents(provider: &'static str, amount: &str) -> Result<i64, IntegrationError> {
    crate::money::parse_dollars(amount).ok_or_else(|| IntegrationError::Decode {
        provider,
        message: format!("invalid amount {:?}", amount),
    })
}
