use crate::*;
use crate::config::{base_config, ConfigUpdate};
use crate::db::DbPool;
use crate::errors::IntegrationError;
use crate::integrations::*;
use crate::models::Address;
use crate::state::AppState;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use diesel::connection::SimpleConnection;
use diesel::RunQueryDsl;
use proptest::prelude::*;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub const ADMIN_TOKEN: &str = "admin-test-token";
pub const CRON_SECRET: &str = "cron-test-secret";
pub const LEAD_SECRET: &str = "lead-test-secret";
pub const MOTOREV_SECRET: &str = "motorev-test-secret";
pub const STRIPE_WEBHOOK_SECRET: &str = "whsec_test";

/// A 1×1 PNG
pub const PNG_DATA_URL: &str =
    "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

/// Sets up a test database with migrations applied
///
/// This function:
/// 1. Creates an in-memory SQLite database
/// 2. Enables foreign key constraints
/// 3. Runs all migrations to set up the schema
///
/// ### Returns
///
/// A database connection pool connected to the in-memory database
pub fn setup_test_db() -> DbPool {
    // Use a unique shared in-memory database for each test.
    // Plain ":memory:" gives each connection its own separate database,
    // so migrations run on one connection wouldn't be visible on others.
    let unique_id = uuid::Uuid::new_v4();
    let database_url = format!("file:test_{}?mode=memory&cache=shared", unique_id);
    let pool = db::init_pool(&database_url).expect("Failed to create pool");

    let mut conn = pool.get().expect("Failed to get connection");
    conn.batch_execute("PRAGMA foreign_keys = ON").unwrap();
    db::run_migrations(&mut conn).expect("Failed to run migrations");

    pool
}

pub fn test_address() -> Address {
    Address {
        name: "Jordan Vega".to_string(),
        company: None,
        street1: "500 Harbor Blvd".to_string(),
        street2: None,
        city: "Tampa".to_string(),
        state: "FL".to_string(),
        zip: "33602".to_string(),
        country: "US".to_string(),
        phone: None,
        email: Some("jordan@example.com".to_string()),
    }
}

/// Configuration with every shared secret set to a known test value
pub fn test_config() -> config::Config {
    base_config(None).apply_update(ConfigUpdate {
        admin_api_token: Some(ADMIN_TOKEN.to_string()),
        cron_secret: Some(CRON_SECRET.to_string()),
        lead_webhook_secret: Some(LEAD_SECRET.to_string()),
        motorev_webhook_secret: Some(MOTOREV_SECRET.to_string()),
        stripe_webhook_secret: Some(STRIPE_WEBHOOK_SECRET.to_string()),
        admin_email: Some("admin@47industries.com".to_string()),
        site_url: Some("https://47industries.test".to_string()),
        sales_tax_bps: Some(700),
        ship_from: Some(test_address()),
        storage_dir: Some(std::env::temp_dir().join(format!("fortyseven-test-{}", uuid::Uuid::new_v4()))),
        ..Default::default()
    })
}

/// A set of in-process fakes and the shared state wired to them
pub struct TestHarness {
    pub state: Arc<AppState>,
    pub payments: Arc<FakePayments>,
    pub mailer: Arc<FakeMailer>,
    pub fulfillment: Arc<FakeFulfillment>,
}

pub fn test_harness(pool: DbPool) -> TestHarness {
    let payments = Arc::new(FakePayments::default());
    let mailer = Arc::new(FakeMailer::default());
    let fulfillment = Arc::new(FakeFulfillment::default());
    let integrations = Integrations {
        payments: Some(payments.clone() as Arc<dyn PaymentGateway>),
        shipping: vec![
            Arc::new(FakeShipping::new("SHIPPO", vec![(799, Some(3)), (1250, Some(1))])) as Arc<dyn ShippingProvider>,
            Arc::new(FakeShipping::new("EASYPOST", vec![(799, Some(2)), (650, Some(5))])) as Arc<dyn ShippingProvider>,
        ],
        fulfillment: Some(fulfillment.clone() as Arc<dyn FulfillmentProvider>),
        mailer: Some(mailer.clone() as Arc<dyn Mailer>),
        bank: None,
        mailbox: None,
    };
    TestHarness {
        state: Arc::new(AppState::new(pool, test_config(), integrations)),
        payments,
        mailer,
        fulfillment,
    }
}

#[derive(Default)]
pub struct FakePayments {
    pub sessions: Mutex<Vec<CheckoutRequest>>,
    pub charges: Mutex<Vec<SavedMethodCharge>>,
    /// Customer ids whose saved card is declined
    pub declined_customers: Mutex<Vec<String>>,
}

#[async_trait]
impl PaymentGateway for FakePayments {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession, IntegrationError> {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.push(request.clone());
        let id = format!("cs_test_{}", sessions.len());
        Ok(CheckoutSession { url: format!("https://checkout.test/{}", id), id })
    }

    async fn charge_saved_method(&self, charge: &SavedMethodCharge) -> Result<ChargeOutcome, IntegrationError> {
        let mut charges = self.charges.lock().unwrap();
        charges.push(charge.clone());
        if self.declined_customers.lock().unwrap().contains(&charge.customer_id) {
            return Ok(ChargeOutcome::Declined { reason: "Your card was declined.".to_string() });
        }
        Ok(ChargeOutcome::Succeeded { payment_intent_id: format!("pi_test_{}", charges.len()) })
    }
}

pub struct FakeShipping {
    name: &'static str,
    quotes: Vec<(i64, Option<i32>)>,
    pub fail: bool,
}

impl FakeShipping {
    pub fn new(name: &'static str, quotes: Vec<(i64, Option<i32>)>) -> Self {
        Self { name, quotes, fail: false }
    }

    pub fn failing(name: &'static str) -> Self {
        Self { name, quotes: Vec::new(), fail: true }
    }
}

#[async_trait]
impl ShippingProvider for FakeShipping {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn get_rates(&self, _from: &Address, _to: &Address, _parcel: &Parcel) -> Result<Vec<ShippingRate>, IntegrationError> {
        if self.fail {
            return Err(IntegrationError::Status { provider: "fake", status: 503, body: "down".to_string() });
        }
        Ok(self
            .quotes
            .iter()
            .enumerate()
            .map(|(i, (amount, days))| ShippingRate {
                provider: self.name.to_string(),
                rate_id: format!("{}-rate-{}", self.name.to_lowercase(), i),
                shipment_id: Some(format!("{}-shp", self.name.to_lowercase())),
                carrier: "USPS".to_string(),
                service: format!("Service {}", i),
                amount_cents: *amount,
                currency: "USD".to_string(),
                estimated_days: *days,
            })
            .collect())
    }

    async fn buy_label(&self, rate_id: &str, _shipment_id: Option<&str>) -> Result<ShippingLabel, IntegrationError> {
        if self.fail {
            return Err(IntegrationError::Status { provider: "fake", status: 503, body: "down".to_string() });
        }
        Ok(ShippingLabel {
            tracking_number: format!("TRACK-{}", rate_id),
            label_url: format!("https://labels.test/{}.pdf", rate_id),
            carrier: "USPS".to_string(),
        })
    }
}

#[derive(Default)]
pub struct FakeFulfillment {
    pub submitted: Mutex<Vec<(String, Vec<FulfillmentItem>)>>,
    pub fail: Mutex<bool>,
}

#[async_trait]
impl FulfillmentProvider for FakeFulfillment {
    async fn submit_order(
        &self,
        external_ref: &str,
        _recipient: &Address,
        items: &[FulfillmentItem],
    ) -> Result<String, IntegrationError> {
        if *self.fail.lock().unwrap() {
            return Err(IntegrationError::Status { provider: "printful", status: 400, body: "Invalid variant".to_string() });
        }
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push((external_ref.to_string(), items.to_vec()));
        Ok(format!("pf_{}", submitted.len()))
    }
}

#[derive(Default)]
pub struct FakeMailer {
    pub sent: Mutex<Vec<Email>>,
    pub fail: Mutex<bool>,
}

impl FakeMailer {
    pub fn subjects(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|e| e.subject.clone()).collect()
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, email: &Email) -> Result<(), IntegrationError> {
        if *self.fail.lock().unwrap() {
            return Err(IntegrationError::Status { provider: "resend", status: 500, body: "boom".to_string() });
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub struct FakeBank {
    pub pages: Mutex<Vec<FeedSync>>,
}

#[async_trait]
impl BankFeed for FakeBank {
    async fn sync(&self, _access_token: &str, _cursor: Option<&str>) -> Result<FeedSync, IntegrationError> {
        let mut pages = self.pages.lock().unwrap();
        if pages.is_empty() {
            return Ok(FeedSync::default());
        }
        Ok(pages.remove(0))
    }
}

pub struct FakeMailbox {
    pub messages: Vec<MailMessage>,
}

#[async_trait]
impl MailboxScanner for FakeMailbox {
    async fn recent_messages(&self, max: usize) -> Result<Vec<MailMessage>, IntegrationError> {
        Ok(self.messages.iter().take(max).cloned().collect())
    }
}

/// Builds a blank A4 document with `page_count` pages sharing inherited resources
pub fn blank_pdf(page_count: usize) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();
    for _ in 0..page_count {
        let content = Content { operations: vec![Operation::new("n", vec![])] };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => page_count as i64,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        "Resources" => dictionary! {},
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// Builds a request carrying the admin bearer token
pub fn admin_request(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", ADMIN_TOKEN));
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Builds an unauthenticated JSON request
pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Reads a response body as JSON
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    if bytes.is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}

use diesel::sql_types::Text;
use diesel::QueryableByName;

#[derive(QueryableByName, Debug)]
struct TableName {
    #[diesel(sql_type = Text)]
    name: String,
}

/// Tests the setup_test_db function
///
/// This test verifies that:
/// 1. The test database can be created and connected to
/// 2. The database has the expected tables
/// 3. The app can serve a request against it
#[tokio::test]
async fn test_setup_test_db() {
    let pool = setup_test_db();
    let mut conn = pool.get().unwrap();

    let table_names: Vec<TableName> = diesel::sql_query("SELECT name FROM sqlite_master WHERE type='table'")
        .load(&mut conn)
        .expect("Failed to load table names");

    let expected_tables = vec![
        "products", "orders", "order_items", "print_orders",
        "clients", "recurring_charges", "invoices", "invoice_items",
        "contracts", "signature_fields",
        "partners", "partner_referrals", "user_affiliates", "affiliate_referrals",
        "service_inquiries", "expenses", "recurring_bills", "bill_instances", "proposed_bills",
        "bank_connections", "bank_transactions",
        "__diesel_schema_migrations", // Diesel's migration tracking table
    ];

    for table in expected_tables {
        let exists = table_names.iter().any(|t| t.name == table);
        assert!(exists, "Table '{}' not found in database", table);

        let query = format!("SELECT COUNT(*) FROM {}", table);
        let result = diesel::sql_query(&query).execute(&mut conn);
        assert!(result.is_ok(), "Failed to query table '{}': {:?}", table, result.err());
    }

    drop(conn);

    let harness = test_harness(pool);
    let app = create_app(harness.state);

    let request = Request::builder()
        .uri("/api/products")
        .method("GET")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Generates strings with awkward characters: quotes, unicode, whitespace
pub fn arb_messy_string() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 _.-]{0,40}",
        "\\PC{0,20}",
        Just(String::new()),
        Just("  padded  ".to_string()),
        Just("quote\"d 'value'".to_string()),
    ]
}
