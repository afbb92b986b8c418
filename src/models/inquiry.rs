use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::InquiryStatus;

/// A service lead captured from the website's contact form webhook
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::service_inquiries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ServiceInquiry {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub service_type: Option<String>,
    pub budget: Option<String>,
    pub message: String,
    /// Where the lead came from, e.g. `website` or `webhook`
    pub source: String,
    pub status: InquiryStatus,
    pub created_at: NaiveDateTime,
}

impl ServiceInquiry {
    pub fn new(name: String, email: String, message: String, source: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            email,
            phone: None,
            company: None,
            service_type: None,
            budget: None,
            message,
            source,
            status: InquiryStatus::New,
            created_at: Utc::now().naive_utc(),
        }
    }
}
