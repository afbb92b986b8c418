use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AffiliateStatus, ReferralEvent};
use crate::auth::{generate_code, generate_token};

/// Default MotoRev affiliate commission: 20%
pub const DEFAULT_AFFILIATE_COMMISSION_BPS: i32 = 2000;

/// A MotoRev app user enrolled in the affiliate program
///
/// Created when the user connects from the mobile web portal. The
/// `api_token` authenticates the portal's dashboard requests.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::user_affiliates)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct UserAffiliate {
    id: String,
    motorev_user_id: String,
    email: String,
    name: String,
    /// Shareable code, e.g. `MR-7KQ2ZP`
    affiliate_code: String,
    #[serde(skip_serializing, default)]
    api_token: String,
    commission_rate_bps: i32,
    total_referrals: i32,
    total_points: i32,
    pending_commission_cents: i64,
    paid_commission_cents: i64,
    status: AffiliateStatus,
    connected_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl UserAffiliate {
    pub fn new(motorev_user_id: String, email: String, name: String) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4().to_string(),
            motorev_user_id,
            email,
            name,
            affiliate_code: generate_code("MR-", 6),
            api_token: generate_token(),
            commission_rate_bps: DEFAULT_AFFILIATE_COMMISSION_BPS,
            total_referrals: 0,
            total_points: 0,
            pending_commission_cents: 0,
            paid_commission_cents: 0,
            status: AffiliateStatus::Active,
            connected_at: now,
            updated_at: now,
        }
    }

    pub fn get_id(&self) -> String {
        self.id.clone()
    }

    pub fn get_motorev_user_id(&self) -> String {
        self.motorev_user_id.clone()
    }

    pub fn get_email(&self) -> String {
        self.email.clone()
    }

    pub fn get_name(&self) -> String {
        self.name.clone()
    }

    pub fn get_affiliate_code(&self) -> String {
        self.affiliate_code.clone()
    }

    pub fn get_api_token(&self) -> String {
        self.api_token.clone()
    }

    pub fn get_commission_rate_bps(&self) -> i32 {
        self.commission_rate_bps
    }

    pub fn get_total_referrals(&self) -> i32 {
        self.total_referrals
    }

    pub fn get_total_points(&self) -> i32 {
        self.total_points
    }

    pub fn get_pending_commission_cents(&self) -> i64 {
        self.pending_commission_cents
    }

    pub fn get_paid_commission_cents(&self) -> i64 {
        self.paid_commission_cents
    }

    pub fn get_status(&self) -> AffiliateStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == AffiliateStatus::Active
    }

    pub fn get_connected_at(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.connected_at, Utc)
    }

    pub fn get_updated_at(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.updated_at, Utc)
    }
}

/// One credited event from the MotoRev app
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::affiliate_referrals)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AffiliateReferral {
    pub id: String,
    pub affiliate_id: String,
    pub referred_user_id: String,
    pub event: ReferralEvent,
    pub points: i32,
    pub amount_cents: i64,
    pub commission_cents: i64,
    pub created_at: NaiveDateTime,
}

impl AffiliateReferral {
    pub fn new(affiliate_id: &str, referred_user_id: String, event: ReferralEvent, amount_cents: i64, commission_cents: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            affiliate_id: affiliate_id.to_string(),
            referred_user_id,
            event,
            points: event.points(),
            amount_cents,
            commission_cents,
            created_at: Utc::now().naive_utc(),
        }
    }
}
