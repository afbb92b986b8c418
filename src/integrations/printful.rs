use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{read_json, FulfillmentItem, FulfillmentProvider};
use crate::errors::IntegrationError;
use crate::models::Address;

const PROVIDER: &str = "printful";
const API_BASE: &str = "https://api.printful.com";

pub struct PrintfulClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl PrintfulClient {
    pub fn new(http: reqwest::Client, api_key: &str) -> Self {
        Self { http, api_key: api_key.to_string(), base_url: API_BASE.to_string() }
    }
}

#[derive(Deserialize)]
struct OrderEnvelope {
    result: CreatedOrder,
}

#[derive(Deserialize)]
struct CreatedOrder {
    id: Value,
}

pub(crate) fn order_body(external_ref: &str, recipient: &Address, items: &[FulfillmentItem]) -> Value {
    json!({
        "external_id": external_ref,
        "recipient": {
            "name": recipient.name,
            "company": recipient.company,
            "address1": recipient.street1,
            "address2": recipient.street2,
            "city": recipient.city,
            "state_code": recipient.state,
            "country_code": recipient.country,
            "zip": recipient.zip,
            "phone": recipient.phone,
            "email": recipient.email,
        },
        "items": items.iter().map(|item| json!({
            "variant_id": item.variant_id,
            "quantity": item.quantity,
            "name": item.name,
            "retail_price": format!("{}.{:02}", item.retail_price_cents / 100, item.retail_price_cents % 100),
        })).collect::<Vec<_>>(),
    })
}

#[async_trait]
impl FulfillmentProvider for PrintfulClient {
    async fn submit_order(
        &self,
        external_ref: &str,
        recipient: &Address,
        items: &[FulfillmentItem],
    ) -> Result<String, IntegrationError> {
        let response = self
            .http
            .post(format!("{}/orders", self.base_url))
            .query(&[("confirm", "true")])
            .bearer_auth(&self.api_key)
            .json(&order_body(external_ref, recipient, items))
            .send()
            .await
            .map_err(IntegrationError::http(PROVIDER))?;

        let envelope: OrderEnvelope = read_json(PROVIDER, response).await?;
        let id = match envelope.result.id {
            Value::String(s) => s,
            other => other.to_string(),
        };
        info!("Printful accepted order {} as {}", external_ref, id);
        Ok(id)
    }
}
