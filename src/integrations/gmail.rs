use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use super::{read_json, MailMessage, MailboxScanner};
use crate::errors::IntegrationError;

const PROVIDER: &str = "gmail";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
const SEARCH_QUERY: &str = "newer_than:30d";

/// Reads the back-office inbox with an offline refresh token
pub struct GmailScanner {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

impl GmailScanner {
    pub fn new(http: reqwest::Client, client_id: &str, client_secret: &str, refresh_token: &str) -> Self {
        Self {
            http,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            refresh_token: refresh_token.to_string(),
        }
    }

    async fn access_token(&self) -> Result<String, IntegrationError> {
        let response = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(IntegrationError::http(PROVIDER))?;
        let token: TokenResponse = read_json(PROVIDER, response).await?;
        Ok(token.access_token)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    internal_date: Option<String>,
    payload: MessagePayload,
}

#[derive(Deserialize)]
struct MessagePayload {
    #[serde(default)]
    headers: Vec<Header>,
}

#[derive(Deserialize)]
struct Header {
    name: String,
    value: String,
}

impl From<GmailMessage> for MailMessage {
    fn from(message: GmailMessage) -> Self {
        let header = |name: &str| {
            message
                .payload
                .headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name))
                .map(|h| h.value.clone())
                .unwrap_or_default()
        };
        let from = header("From");
        let subject = header("Subject");
        let received_at = message
            .internal_date
            .as_deref()
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(DateTime::<Utc>::from_timestamp_millis);

        MailMessage { id: message.id, from, subject, body: message.snippet, received_at }
    }
}

#[async_trait]
impl MailboxScanner for GmailScanner {
    async fn recent_messages(&self, max: usize) -> Result<Vec<MailMessage>, IntegrationError> {
        let token = self.access_token().await?;

        let response = self
            .http
            .get(format!("{}/messages", API_BASE))
            .bearer_auth(&token)
            .query(&[("q", SEARCH_QUERY.to_string()), ("maxResults", max.to_string())])
            .send()
            .await
            .map_err(IntegrationError::http(PROVIDER))?;
        let list: MessageList = read_json(PROVIDER, response).await?;
        debug!("Gmail returned {} message ids", list.messages.len());

        let mut messages = Vec::with_capacity(list.messages.len());
        for message_ref in list.messages {
            let response = self
                .http
                .get(format!("{}/messages/{}", API_BASE, message_ref.id))
                .bearer_auth(&token)
                .query(&[("format", "metadata"), ("metadataHeaders", "From"), ("metadataHeaders", "Subject")])
                .send()
                .await
                .map_err(IntegrationError::http(PROVIDER))?;
            let message: GmailMessage = read_json(PROVIDER, response).await?;
            messages.push(MailMessage::from(message));
        }

        Ok(messages)
    }
}
