use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{PartnerStatus, ReferralStatus};

/// Default partner commission: 10%
pub const DEFAULT_PARTNER_COMMISSION_BPS: i32 = 1000;

/// A storefront partner earning commission on referred orders
///
/// The running totals are maintained in the same transaction that records
/// each referral or payout.
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::partners)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Partner {
    id: String,
    name: String,
    email: String,
    /// Upper-case referral code entered at checkout
    code: String,
    commission_rate_bps: i32,
    status: PartnerStatus,
    total_referrals: i32,
    total_earned_cents: i64,
    total_paid_cents: i64,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

impl Partner {
    pub fn new(name: String, email: String, code: &str, commission_rate_bps: i32) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            email,
            code: normalize_code(code),
            commission_rate_bps,
            status: PartnerStatus::Active,
            total_referrals: 0,
            total_earned_cents: 0,
            total_paid_cents: 0,
            created_at: now,
            updated_at: now,
        }
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

    pub fn get_code(&self) -> String {
        self.code.clone()
    }

    pub fn get_commission_rate_bps(&self) -> i32 {
        self.commission_rate_bps
    }

    pub fn get_status(&self) -> PartnerStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == PartnerStatus::Active
    }

    pub fn get_total_referrals(&self) -> i32 {
        self.total_referrals
    }

    pub fn get_total_earned_cents(&self) -> i64 {
        self.total_earned_cents
    }

    pub fn get_total_paid_cents(&self) -> i64 {
        self.total_paid_cents
    }

    /// Commission earned but not yet paid out
    pub fn get_balance_cents(&self) -> i64 {
        self.total_earned_cents - self.total_paid_cents
    }

    pub fn get_created_at(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.created_at, Utc)
    }

    pub fn get_updated_at(&self) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(self.updated_at, Utc)
    }
}

/// Normalizes a referral code as typed by a customer
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Commission owed to a partner for one referred order
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::partner_referrals)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PartnerReferral {
    pub id: String,
    pub partner_id: String,
    pub order_id: String,
    pub order_total_cents: i64,
    pub commission_cents: i64,
    pub status: ReferralStatus,
    pub created_at: NaiveDateTime,
    pub paid_at: Option<NaiveDateTime>,
}

impl PartnerReferral {
    pub fn new(partner_id: &str, order_id: &str, order_total_cents: i64, commission_cents: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            partner_id: partner_id.to_string(),
            order_id: order_id.to_string(),
            order_total_cents,
            commission_cents,
            status: ReferralStatus::Pending,
            created_at: Utc::now().naive_utc(),
            paid_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partner_code_normalized() {
        let partner = Partner::new("Moto Shop".to_string(), "shop@example.com".to_string(), " motoshop ", 1500);
        assert_eq!(partner.get_code(), "MOTOSHOP");
        assert!(partner.is_active());
        assert_eq!(partner.get_balance_cents(), 0);
    }

    #[test]
    fn test_referral_starts_pending() {
        let referral = PartnerReferral::new("p1", "o1", 10_000, 1_000);
        assert_eq!(referral.status, ReferralStatus::Pending);
        assert!(referral.paid_at.is_none());
    }
}
