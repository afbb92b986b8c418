use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{read_json, Email, Mailer};
use crate::errors::IntegrationError;

const PROVIDER: &str = "resend";
const API_BASE: &str = "https://api.resend.com";

pub struct ResendMailer {
    http: reqwest::Client,
    api_key: String,
    from: String,
    base_url: String,
}

impl ResendMailer {
    pub fn new(http: reqwest::Client, api_key: &str, from: &str) -> Self {
        Self {
            http,
            api_key: api_key.to_string(),
            from: from.to_string(),
            base_url: API_BASE.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct SendResponse {
    id: String,
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, email: &Email) -> Result<(), IntegrationError> {
        let response = self
            .http
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": [email.to],
                "subject": email.subject,
                "html": email.html,
            }))
            .send()
            .await
            .map_err(IntegrationError::http(PROVIDER))?;

        let sent: SendResponse = read_json(PROVIDER, response).await?;
        debug!("Sent \"{}\" to {} ({})", email.subject, email.to, sent.id);
        Ok(())
    }
}
