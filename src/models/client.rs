use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default number of days between issuing and due date
pub const DEFAULT_PAYMENT_TERMS_DAYS: i32 = 15;

/// Represents a service client billed through invoices
///
/// Clients with autopay enabled and a saved payment method are charged
/// automatically by the monthly recurring-invoice run.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::clients)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Client {
    id: String,
    name: String,
    email: String,
    company: Option<String>,
    phone: Option<String>,
    address: Option<String>,
    payment_terms_days: i32,
    autopay_enabled: bool,
    stripe_customer_id: Option<String>,
    stripe_payment_method_id: Option<String>,
    active: bool,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl Client {
    /// Creates a new active client with default payment terms and autopay off
    pub fn new(name: String, email: String) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            email,
            company: None,
            phone: None,
            address: None,
            payment_terms_days: DEFAULT_PAYMENT_TERMS_DAYS,
            autopay_enabled: false,
            stripe_customer_id: None,
            stripe_payment_method_id: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_contact(mut self, company: Option<String>, phone: Option<String>, address: Option<String>) -> Self {
        self.company = company;
        self.phone = phone;
        self.address = address;
        self
    }

    pub fn with_payment_terms_days(mut self, days: i32) -> Self {
        self.payment_terms_days = days;
        self
    }

    pub fn with_autopay(mut self, enabled: bool, customer_id: Option<String>, payment_method_id: Option<String>) -> Self {
        self.autopay_enabled = enabled;
        self.stripe_customer_id = customer_id;
        self.stripe_payment_method_id = payment_method_id;
        self
    }

    pub fn get_id(&self) -> String {
        self.id.clone()
    }

    pub fn get_name(&self) -> String {
        self.name.clone()
    }

    pub fn get_email(&self) -> String {
        self.email.clone()
    }

    pub fn get_company(&self) -> Option<String> {
        self.company.clone()
    }

    pub fn get_phone(&self) -> Option<String> {
        self.phone.clone()
    }

    pub fn get_address(&self) -> Option<String> {
        self.address.clone()
    }

    pub fn get_payment_terms_days(&self) -> i32 {
        self.payment_terms_days
    }

    pub fn is_autopay_enabled(&self) -> bool {
        self.autopay_enabled
    }

    pub fn get_stripe_customer_id(&self) -> Option<String> {
        self.stripe_customer_id.clone()
    }

    pub fn get_stripe_payment_method_id(&self) -> Option<String> {
        self.stripe_payment_method_id.clone()
    }

    /// The saved customer and payment method, when autopay can run
    pub fn autopay_method(&self) -> Option<(String, String)> {
        if !self.autopay_enabled {
            return None;
        }
        match (&self.stripe_customer_id, &self.stripe_payment_method_id) {
            (Some(customer), Some(method)) if !customer.is_empty() && !method.is_empty() => {
                Some((customer.clone(), method.clone()))
            }
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn get_created_at(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.created_at, Utc)
    }

    pub fn get_updated_at(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.updated_at, Utc)
    }
}

/// A fixed monthly charge billed to a client
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::recurring_charges)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RecurringCharge {
    pub id: String,
    pub client_id: String,
    pub description: String,
    pub amount_cents: i64,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

impl RecurringCharge {
    pub fn new(client_id: &str, description: String, amount_cents: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            client_id: client_id.to_string(),
            description,
            amount_cents,
            active: true,
            created_at: Utc::now().naive_utc(),
        }
    }
}
