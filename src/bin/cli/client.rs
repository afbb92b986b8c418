use chrono::NaiveDate;
use fortyseven::models::{BillInstance, Invoice, Order, ProposedBill};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;

/// Error type for CLI client operations
#[derive(Debug)]
pub enum ClientError {
    /// Server returned an error status with a message body
    Server { status: reqwest::StatusCode, message: String },
    /// Network/connection/request error
    Request(reqwest::Error),
    /// A token the route needs was not supplied
    MissingCredential(&'static str),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Server { status, message } => {
                write!(f, "Server error ({}): {}", status.as_u16(), message)
            }
            ClientError::Request(err) => write!(f, "{}", err),
            ClientError::MissingCredential(what) => write!(f, "No {} given (flag or environment)", what),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Request(err) => Some(err),
            ClientError::Server { .. } | ClientError::MissingCredential(_) => None,
        }
    }
}

/// Extension trait for checking HTTP responses and extracting server error messages
trait ResponseExt {
    /// Checks for error status and extracts the server's error message body
    async fn check(self) -> Result<reqwest::Response, ClientError>;
}

impl ResponseExt for reqwest::Response {
    async fn check(self) -> Result<reqwest::Response, ClientError> {
        if self.status().is_success() {
            return Ok(self);
        }
        let status = self.status();
        let message = match self.json::<serde_json::Value>().await {
            Ok(body) => body.get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("Unknown error")
                .to_string(),
            Err(_) => format!("HTTP {}", status),
        };
        Err(ClientError::Server { status, message })
    }
}

/// HTTP client for the back office and cron routes of the 47 Industries server
pub struct FortysevenClient {
    /// The base URL of the server (e.g. "http://localhost:3000")
    base_url: String,
    client: Client,
    admin_token: Option<String>,
    cron_secret: Option<String>,
}

impl FortysevenClient {
    /// Creates a new client
    ///
    /// ### Arguments
    ///
    /// * `base_url` - The base URL of the server
    /// * `admin_token` - Bearer token for `/api/admin` routes
    /// * `cron_secret` - Bearer token for `/api/cron` routes
    pub fn new(base_url: String, admin_token: Option<String>, cron_secret: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
            admin_token,
            cron_secret,
        }
    }

    fn admin(&self, method: reqwest::Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let token = self.admin_token.as_deref().ok_or(ClientError::MissingCredential("admin token"))?;
        let url = format!("{}/api/admin{}", self.base_url, path);
        Ok(self.client.request(method, url).bearer_auth(token))
    }

    fn cron(&self, path: &str) -> Result<RequestBuilder, ClientError> {
        let secret = self.cron_secret.as_deref().ok_or(ClientError::MissingCredential("cron secret"))?;
        let url = format!("{}/api/cron{}", self.base_url, path);
        Ok(self.client.post(url).bearer_auth(secret))
    }

    async fn fetch<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await.map_err(ClientError::Request)?.check().await?;
        response.json().await.map_err(ClientError::Request)
    }

    // ── Orders ───────────────────────────────────────────────────────

    /// Lists orders, optionally restricted to some statuses
    pub async fn list_orders(&self, statuses: &[String]) -> Result<Vec<Order>, ClientError> {
        let params: Vec<(&str, &str)> = statuses.iter().map(|s| ("status", s.as_str())).collect();
        Self::fetch(self.admin(reqwest::Method::GET, "/orders")?.query(&params)).await
    }

    /// Gets one order by ID
    pub async fn get_order(&self, id: &str) -> Result<Order, ClientError> {
        Self::fetch(self.admin(reqwest::Method::GET, &format!("/orders/{}", id))?).await
    }

    /// Moves an order to a new status
    pub async fn update_order_status(&self, id: &str, status: &str) -> Result<Order, ClientError> {
        let request = self
            .admin(reqwest::Method::PATCH, &format!("/orders/{}/status", id))?
            .json(&json!({ "status": status }));
        Self::fetch(request).await
    }

    // ── Invoices ─────────────────────────────────────────────────────

    pub async fn list_invoices(&self, statuses: &[String], client_id: Option<&str>) -> Result<Vec<Invoice>, ClientError> {
        let mut params: Vec<(&str, &str)> = statuses.iter().map(|s| ("status", s.as_str())).collect();
        if let Some(client_id) = client_id {
            params.push(("client_id", client_id));
        }
        Self::fetch(self.admin(reqwest::Method::GET, "/invoices")?.query(&params)).await
    }

    /// Emails an invoice to its customer
    pub async fn send_invoice(&self, id: &str) -> Result<Invoice, ClientError> {
        Self::fetch(self.admin(reqwest::Method::POST, &format!("/invoices/{}/send", id))?).await
    }

    /// Records an invoice as paid outside Stripe
    pub async fn mark_invoice_paid(&self, id: &str) -> Result<Invoice, ClientError> {
        Self::fetch(self.admin(reqwest::Method::POST, &format!("/invoices/{}/mark-paid", id))?).await
    }

    // ── Bills ────────────────────────────────────────────────────────

    pub async fn list_bill_instances(&self, status: Option<&str>) -> Result<Vec<BillInstance>, ClientError> {
        let params: Vec<(&str, &str)> = status.map(|s| ("status", s)).into_iter().collect();
        Self::fetch(self.admin(reqwest::Method::GET, "/bill-instances")?.query(&params)).await
    }

    /// Marks a bill instance paid, returning the server's payment record
    pub async fn pay_bill_instance(&self, id: &str, paid_on: Option<NaiveDate>) -> Result<serde_json::Value, ClientError> {
        let request = self
            .admin(reqwest::Method::POST, &format!("/bill-instances/{}/pay", id))?
            .json(&json!({ "paid_on": paid_on }));
        Self::fetch(request).await
    }

    pub async fn skip_bill_instance(&self, id: &str) -> Result<BillInstance, ClientError> {
        Self::fetch(self.admin(reqwest::Method::POST, &format!("/bill-instances/{}/skip", id))?).await
    }

    /// Scans the mailbox for new bills
    pub async fn scan_bills(&self) -> Result<serde_json::Value, ClientError> {
        Self::fetch(self.admin(reqwest::Method::POST, "/bills/scan")?).await
    }

    pub async fn list_proposed_bills(&self, status: Option<&str>) -> Result<Vec<ProposedBill>, ClientError> {
        let params: Vec<(&str, &str)> = status.map(|s| ("status", s)).into_iter().collect();
        Self::fetch(self.admin(reqwest::Method::GET, "/proposed-bills")?.query(&params)).await
    }

    pub async fn approve_proposed_bill(&self, id: &str) -> Result<serde_json::Value, ClientError> {
        Self::fetch(self.admin(reqwest::Method::POST, &format!("/proposed-bills/{}/approve", id))?).await
    }

    pub async fn reject_proposed_bill(&self, id: &str) -> Result<ProposedBill, ClientError> {
        Self::fetch(self.admin(reqwest::Method::POST, &format!("/proposed-bills/{}/reject", id))?).await
    }

    // ── Bank, dashboard and scheduled jobs ───────────────────────────

    /// Pulls new transactions from every linked bank account
    pub async fn bank_sync(&self) -> Result<serde_json::Value, ClientError> {
        Self::fetch(self.admin(reqwest::Method::POST, "/bank/sync")?).await
    }

    pub async fn dashboard(&self, month: Option<&str>) -> Result<serde_json::Value, ClientError> {
        let params: Vec<(&str, &str)> = month.map(|m| ("month", m)).into_iter().collect();
        Self::fetch(self.admin(reqwest::Method::GET, "/dashboard")?.query(&params)).await
    }

    /// Triggers the monthly recurring invoice run
    pub async fn run_recurring_invoices(&self) -> Result<serde_json::Value, ClientError> {
        Self::fetch(self.cron("/recurring-invoices")?).await
    }

    /// Triggers generation of upcoming bill instances
    pub async fn generate_bills(&self) -> Result<Vec<BillInstance>, ClientError> {
        Self::fetch(self.cron("/bills")?).await
    }
}
