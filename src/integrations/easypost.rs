use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::{decimal_to_cents, read_json, Parcel, ShippingLabel, ShippingProvider, ShippingRate};
use crate::errors::IntegrationError;
use crate::models::Address;

const PROVIDER: &str = "easypost";
const API_BASE: &str = "https://api.easypost.com/v2";

pub struct EasyPostClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl EasyPostClient {
    pub fn new(http: reqwest::Client, api_key: &str) -> Self {
        Self { http, api_key: api_key.to_string(), base_url: API_BASE.to_string() }
    }
}

#[derive(Serialize)]
struct EasyPostAddress<'a> {
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

impl<'a> From<&'a Address> for EasyPostAddress<'a> {
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
struct Shipment {
    id: String,
    #[serde(default)]
    rates: Vec<EasyPostRate>,
    #[serde(default)]
    tracking_code: Option<String>,
    #[serde(default)]
    postage_label: Option<PostageLabel>,
    #[serde(default)]
    selected_rate: Option<EasyPostRate>,
}

#[derive(Deserialize)]
struct EasyPostRate {
    id: String,
    carrier: String,
    service: String,
    rate: String,
    #[serde(default = "usd")]
    currency: String,
    #[serde(default)]
    delivery_days: Option<i32>,
}

fn usd() -> String {
    "USD".to_string()
}

#[derive(Deserialize)]
struct PostageLabel {
    label_url: String,
}

fn normalize_rates(shipment: Shipment) -> Result<Vec<ShippingRate>, IntegrationError> {
    shipment
        .rates
        .into_iter()
        .map(|rate| {
            Ok(ShippingRate {
                provider: "EASYPOST".to_string(),
                amount_cents: decimal_to_cents(PROVIDER, &rate.rate)?,
                rate_id: rate.id,
                shipment_id: Some(shipment.id.clone()),
                carrier: rate.carrier,
                service: rate.service,
                currency: rate.currency,
                estimated_days: rate.delivery_days,
            })
        })
        .collect()
}

fn label_from_shipment(shipment: Shipment) -> Result<ShippingLabel, IntegrationError> {
    match (shipment.tracking_code, shipment.postage_label, shipment.selected_rate) {
        (Some(tracking_number), Some(label), Some(rate)) => Ok(ShippingLabel {
            tracking_number,
            label_url: label.label_url,
            carrier: rate.carrier,
        }),
        _ => Err(IntegrationError::Decode {
            provider: PROVIDER,
            message: format!("shipment {} has no purchased label", shipment.id),
        }),
    }
}

#[async_trait]
impl ShippingProvider for EasyPostClient {
    fn name(&self) -> &'static str {
        "EASYPOST"
    }

    async fn get_rates(&self, from: &Address, to: &Address, parcel: &Parcel) -> Result<Vec<ShippingRate>, IntegrationError> {
        let body = json!({
            "shipment": {
                "from_address": EasyPostAddress::from(from),
                "to_address": EasyPostAddress::from(to),
                "parcel": {
                    "length": parcel.length_in,
                    "width": parcel.width_in,
                    "height": parcel.height_in,
                    "weight": parcel.weight_oz,
                },
            }
        });

        let response = self
            .http
            .post(format!("{}/shipments", self.base_url))
            .basic_auth(&self.api_key, None::<&str>)
            .json(&body)
            .send()
            .await
            .map_err(IntegrationError::http(PROVIDER))?;

        let shipment: Shipment = read_json(PROVIDER, response).await?;
        debug!("EasyPost shipment {} returned {} rates", shipment.id, shipment.rates.len());
        normalize_rates(shipment)
    }

    async fn buy_label(&self, rate_id: &str, shipment_id: Option<&str>) -> Result<ShippingLabel, IntegrationError> {
        let shipment_id = shipment_id.ok_or_else(|| IntegrationError::Decode {
            provider: PROVIDER,
            message: "buying a label needs the shipment id".to_string(),
        })?;

        let response = self
            .http
            .post(format!("{}/shipments/{}/buy", self.base_url, shipment_id))
            .basic_auth(&self.api_key, None::<&str>)
            .json(&json!({ "rate": { "id": rate_id } }))
            .send()
            .await
            .map_err(IntegrationError::http(PROVIDER))?;

        let shipment: Shipment = read_json(PROVIDER, response).await?;
        let label = label_from_shipment(shipment)?;
        info!("Purchased EasyPost label {}", label.tracking_number);
        Ok(label)
    }
}
