use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{read_json, ChargeOutcome, CheckoutRequest, CheckoutSession, PaymentGateway, SavedMethodCharge};
use crate::errors::IntegrationError;

const PROVIDER: &str = "stripe";
const API_BASE: &str = "https://api.stripe.com/v1";

/// Maximum age of a webhook signature timestamp, in seconds
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

/// Stripe REST client for hosted checkout and saved-card charges
pub struct StripeGateway {
    http: reqwest::Client,
    secret_key: String,
    base_url: String,
}

impl StripeGateway {
    pub fn new(http: reqwest::Client, secret_key: &str) -> Self {
        Self { http, secret_key: secret_key.to_string(), base_url: API_BASE.to_string() }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Deserialize)]
struct PaymentIntent {
    id: String,
    status: String,
}

/// Form fields for `POST /v1/checkout/sessions`
pub(crate) fn checkout_form(request: &CheckoutRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("customer_email".to_string(), request.customer_email.clone()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
    ];
    for (i, line) in request.lines.iter().enumerate() {
        form.push((format!("line_items[{i}][price_data][currency]"), "usd".to_string()));
        form.push((format!("line_items[{i}][price_data][product_data][name]"), line.name.clone()));
        form.push((format!("line_items[{i}][price_data][unit_amount]"), line.unit_amount_cents.to_string()));
        form.push((format!("line_items[{i}][quantity]"), line.quantity.to_string()));
    }
    for (key, value) in &request.metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
        form.push((format!("payment_intent_data[metadata][{key}]"), value.clone()));
    }
    form
}

/// Form fields for an off-session `POST /v1/payment_intents`
pub(crate) fn charge_form(charge: &SavedMethodCharge) -> Vec<(String, String)> {
    let mut form = vec![
        ("amount".to_string(), charge.amount_cents.to_string()),
        ("currency".to_string(), "usd".to_string()),
        ("customer".to_string(), charge.customer_id.clone()),
        ("payment_method".to_string(), charge.payment_method_id.clone()),
        ("off_session".to_string(), "true".to_string()),
        ("confirm".to_string(), "true".to_string()),
        ("description".to_string(), charge.description.clone()),
    ];
    for (key, value) in &charge.metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
    }
    form
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession, IntegrationError> {
        let response = self
            .http
            .post(format!("{}/checkout/sessions", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&checkout_form(request))
            .send()
            .await
            .map_err(IntegrationError::http(PROVIDER))?;

        let session: CheckoutSession = read_json(PROVIDER, response).await?;
        info!("Created checkout session {}", session.id);
        Ok(session)
    }

    async fn charge_saved_method(&self, charge: &SavedMethodCharge) -> Result<ChargeOutcome, IntegrationError> {
        let response = self
            .http
            .post(format!("{}/payment_intents", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&charge_form(charge))
            .send()
            .await
            .map_err(IntegrationError::http(PROVIDER))?;

        let status = response.status();
        if status.as_u16() == 402 {
            let body: StripeErrorBody = response.json().await.map_err(IntegrationError::decode(PROVIDER))?;
            let reason = body
                .error
                .message
                .or(body.error.code)
                .or(body.error.kind)
                .unwrap_or_else(|| "card declined".to_string());
            warn!("Off-session charge for {} declined: {}", charge.customer_id, reason);
            return Ok(ChargeOutcome::Declined { reason });
        }

        let intent: PaymentIntent = read_json(PROVIDER, response).await?;
        debug!("Payment intent {} is {}", intent.id, intent.status);
        Ok(intent_outcome(intent))
    }
}

fn intent_outcome(intent: PaymentIntent) -> ChargeOutcome {
    if intent.status == "succeeded" {
        ChargeOutcome::Succeeded { payment_intent_id: intent.id }
    } else {
        ChargeOutcome::Declined { reason: format!("payment intent {} is {}", intent.id, intent.status) }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed signature header")]
    Malformed,
    #[error("signature timestamp outside tolerance")]
    Expired,
    #[error("no signature matched")]
    Mismatch,
}

/// Verifies a `Stripe-Signature` header against the raw request body
///
/// The header looks like `t=1700000000,v1=<hex>,v1=<hex>`; any `v1` entry
/// equal to HMAC-SHA256(secret, "{t}.{body}") passes, provided `t` is within
/// [`SIGNATURE_TOLERANCE_SECS`] of `now`.
pub fn verify_signature(payload: &[u8], header: &str, secret: &str, now: i64) -> Result<(), SignatureError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    let seconds: i64 = timestamp.parse().map_err(|_| SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if now.abs_diff(seconds) > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
        return Err(SignatureError::Expired);
    }

    let mac = signed_mac(payload, secret, timestamp)?;
    let matched = signatures.iter().any(|candidate| match hex::decode(candidate) {
        Ok(bytes) => mac.clone().verify_slice(&bytes).is_ok(),
        Err(_) => false,
    });
    if matched { Ok(()) } else { Err(SignatureError::Mismatch) }
}

fn signed_mac(payload: &[u8], secret: &str, timestamp: &str) -> Result<HmacSha256, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Computes the `v1` signature for a payload, as Stripe would send it
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, SignatureError> {
    let mac = signed_mac(payload, secret, &timestamp.to_string())?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// The subset of a webhook event this service reads
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}
