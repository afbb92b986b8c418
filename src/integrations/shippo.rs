use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::{decimal_to_cents, read_json, Parcel, ShippingLabel, ShippingProvider, ShippingRate};
use crate::errors::IntegrationError;
use crate::models::Address;

const PROVIDER: &str = "shippo";
const API_BASE: &str = "https://api.goshippo.com";

pub struct ShippoClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ShippoClient {
    pub fn new(http: reqwest::Client, api_key: &str) -> Self {
        Self { http, api_key: api_key.to_string(), base_url: API_BASE.to_string() }
    }

    fn auth(&self) -> String {
        format!("ShippoToken {}", self.api_key)
    }
}

#[derive(Serialize)]
struct ShippoAddress<'a> {
    name: &'a str,
    company: Option<&'a str>,
    street1: &'a str,
    street2: Option<&'a str>,
    city: &'a str,
    state: &'a str,
    zip: &'a str,
    country: &'a str,
    phone: Option<&'a str>,
    email: Option<&'a str>,
}

impl<'a> From<&'a Address> for ShippoAddress<'a> {
    fn from(a: &'a Address) -> Self {
        Self {
            name: &a.name,
            company: a.company.as_deref(),
            street1: &a.street1,
            street2: a.street2.as_deref(),
            city: &a.city,
            state: &a.state,
            zip: &a.zip,
            country: &a.country,
            phone: a.phone.as_deref(),
            email: a.email.as_deref(),
        }
    }
}

#[derive(Deserialize)]
struct ShipmentResponse {
    object_id: String,
    #[serde(default)]
    rates: Vec<ShippoRate>,
}

#[derive(Deserialize)]
struct ShippoRate {
    object_id: String,
    amount: String,
    currency: String,
    provider: String,
    servicelevel: ServiceLevel,
    #[serde(default)]
    estimated_days: Option<i32>,
}

#[derive(Deserialize)]
struct ServiceLevel {
    name: String,
}

#[derive(Deserialize)]
struct TransactionResponse {
    status: String,
    #[serde(default)]
    tracking_number: Option<String>,
    #[serde(default)]
    label_url: Option<String>,
    #[serde(default)]
    messages: Vec<TransactionMessage>,
}

#[derive(Deserialize)]
struct TransactionMessage {
    #[serde(default)]
    text: String,
}

fn normalize_rates(shipment: ShipmentResponse) -> Result<Vec<ShippingRate>, IntegrationError> {
    shipment
        .rates
        .into_iter()
        .map(|rate| {
            Ok(ShippingRate {
                provider: "SHIPPO".to_string(),
                amount_cents: decimal_to_cents(PROVIDER, &rate.amount)?,
                rate_id: rate.object_id,
                shipment_id: Some(shipment.object_id.clone()),
                carrier: rate.provider,
                service: rate.servicelevel.name,
                currency: rate.currency,
                estimated_days: rate.estimated_days,
            })
        })
        .collect()
}

#[async_trait]
impl ShippingProvider for ShippoClient {
    fn name(&self) -> &'static str {
        "SHIPPO"
    }

    async fn get_rates(&self, from: &Address, to: &Address, parcel: &Parcel) -> Result<Vec<ShippingRate>, IntegrationError> {
        let body = json!({
            "address_from": ShippoAddress::from(from),
            "address_to": ShippoAddress::from(to),
            "parcels": [{
                "length": parcel.length_in.to_string(),
                "width": parcel.width_in.to_string(),
                "height": parcel.height_in.to_string(),
                "distance_unit": "in",
                "weight": parcel.weight_oz.to_string(),
                "mass_unit": "oz",
            }],
            "async": false,
        });

        let response = self
            .http
            .post(format!("{}/shipments/", self.base_url))
            .header(reqwest::header::AUTHORIZATION, self.auth())
            .json(&body)
            .send()
            .await
            .map_err(IntegrationError::http(PROVIDER))?;

        let shipment: ShipmentResponse = read_json(PROVIDER, response).await?;
        debug!("Shippo shipment {} returned {} rates", shipment.object_id, shipment.rates.len());
        normalize_rates(shipment)
    }

    async fn buy_label(&self, rate_id: &str, _shipment_id: Option<&str>) -> Result<ShippingLabel, IntegrationError> {
        let rate_response = self
            .http
            .get(format!("{}/rates/{}", self.base_url, rate_id))
            .header(reqwest::header::AUTHORIZATION, self.auth())
            .send()
            .await
            .map_err(IntegrationError::http(PROVIDER))?;
        let rate: ShippoRate = read_json(PROVIDER, rate_response).await?;

        let response = self
            .http
            .post(format!("{}/transactions/", self.base_url))
            .header(reqwest::header::AUTHORIZATION, self.auth())
            .json(&json!({ "rate": rate_id, "label_file_type": "PDF", "async": false }))
            .send()
            .await
            .map_err(IntegrationError::http(PROVIDER))?;
        let transaction: TransactionResponse = read_json(PROVIDER, response).await?;

        let label = label_from_transaction(transaction, rate.provider)?;
        info!("Purchased Shippo label {}", label.tracking_number);
        Ok(label)
    }
}

fn label_from_transaction(transaction: TransactionResponse, carrier: String) -> Result<ShippingLabel, IntegrationError> {
    if transaction.status != "SUCCESS" {
        let message = transaction
            .messages
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(IntegrationError::Status { provider: PROVIDER, status: 422, body: message });
    }
    match (transaction.tracking_number, transaction.label_url) {
        (Some(tracking_number), Some(label_url)) => Ok(ShippingLabel { tracking_number, label_url, carrier }),
        _ => Err(IntegrationError::Decode {
            provider: PROVIDER,
            message: "transaction has no tracking number or label".to_string(),
        }),
    }
}
