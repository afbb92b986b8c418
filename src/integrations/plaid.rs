use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{read_json, BankFeed, FeedSync, FeedTransaction};
use crate::errors::IntegrationError;

const PROVIDER: &str = "plaid";
const PAGE_SIZE: u32 = 500;

pub struct PlaidClient {
    http: reqwest::Client,
    client_id: String,
    secret: String,
    base_url: String,
}

impl PlaidClient {
    /// `env` is `sandbox`, `development`, or `production`
    pub fn new(http: reqwest::Client, client_id: &str, secret: &str, env: &str) -> Self {
        Self {
            http,
            client_id: client_id.to_string(),
            secret: secret.to_string(),
            base_url: format!("https://{}.plaid.com", env.trim()),
        }
    }
}

#[derive(Deserialize)]
struct SyncResponse {
    #[serde(default)]
    added: Vec<PlaidTransaction>,
    #[serde(default)]
    modified: Vec<PlaidTransaction>,
    #[serde(default)]
    removed: Vec<RemovedTransaction>,
    next_cursor: String,
    has_more: bool,
}

#[derive(Deserialize)]
struct PlaidTransaction {
    transaction_id: String,
    amount: f64,
    name: String,
    #[serde(default)]
    merchant_name: Option<String>,
    date: NaiveDate,
    #[serde(default)]
    pending: bool,
}

#[derive(Deserialize)]
struct RemovedTransaction {
    transaction_id: String,
}

impl From<PlaidTransaction> for FeedTransaction {
    fn from(t: PlaidTransaction) -> Self {
        FeedTransaction {
            external_id: t.transaction_id,
            amount_cents: (t.amount * 100.0).round() as i64,
            description: t.name,
            merchant_name: t.merchant_name,
            date: t.date,
            pending: t.pending,
        }
    }
}

fn merge_page(sync: &mut FeedSync, page: SyncResponse) {
    sync.added.extend(page.added.into_iter().map(FeedTransaction::from));
    sync.modified.extend(page.modified.into_iter().map(FeedTransaction::from));
    sync.removed.extend(page.removed.into_iter().map(|r| r.transaction_id));
    sync.next_cursor = Some(page.next_cursor);
}

#[async_trait]
impl BankFeed for PlaidClient {
    async fn sync(&self, access_token: &str, cursor: Option<&str>) -> Result<FeedSync, IntegrationError> {
        let mut sync = FeedSync::default();
        let mut cursor = cursor.map(str::to_string);

        loop {
            let response = self
                .http
                .post(format!("{}/transactions/sync", self.base_url))
                .json(&json!({
                    "client_id": self.client_id,
                    "secret": self.secret,
                    "access_token": access_token,
                    "cursor": cursor,
                    "count": PAGE_SIZE,
                }))
                .send()
                .await
                .map_err(IntegrationError::http(PROVIDER))?;

            let page: SyncResponse = read_json(PROVIDER, response).await?;
            let has_more = page.has_more;
            merge_page(&mut sync, page);
            cursor = sync.next_cursor.clone();
            debug!("Plaid sync page: {} added so far, has_more={}", sync.added.len(), has_more);
            if !has_more {
                break;
            }
        }

        Ok(sync)
    }
}
