use crate::db::DbPool;
use crate::models::{normalize_code, AffiliateReferral, AffiliateStatus, ReferralEvent, UserAffiliate};
use crate::money::apply_bps_floor;
use crate::schema::{affiliate_referrals, user_affiliates};
use anyhow::Result;
use chrono::Utc;
use diesel::prelude::*;
use tracing::{debug, info, instrument};

/// Number of referrals shown on the affiliate dashboard
pub const RECENT_REFERRAL_LIMIT: i64 = 20;

/// Result of crediting a MotoRev referral event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AffiliateReferralOutcome {
    Recorded(AffiliateReferral),
    /// The referred user already produced this event
    Duplicate,
    Suspended,
    UnknownCode,
}

/// Links a MotoRev user to an affiliate account, creating it on first use
///
/// Connecting again returns the existing account with the same code and
/// token; the contact details are refreshed.
///
/// ### Returns
///
/// The affiliate and whether it was created by this call
#[instrument(skip(pool, email, name))]
pub fn connect_affiliate(pool: &DbPool, motorev_user_id: &str, email: &str, name: &str) -> Result<(UserAffiliate, bool)> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        let existing = user_affiliates::table
            .filter(user_affiliates::motorev_user_id.eq(motorev_user_id))
            .first::<UserAffiliate>(conn)
            .optional()?;
        if let Some(existing) = existing {
            diesel::update(user_affiliates::table.find(existing.get_id()))
                .set((
                    user_affiliates::email.eq(email),
                    user_affiliates::name.eq(name),
                    user_affiliates::updated_at.eq(Utc::now().naive_utc()),
                ))
                .execute(conn)?;
            debug!("MotoRev user {} reconnected", motorev_user_id);
            let affiliate = user_affiliates::table.find(existing.get_id()).first::<UserAffiliate>(conn)?;
            return Ok((affiliate, false));
        }

        let affiliate = UserAffiliate::new(motorev_user_id.to_string(), email.to_string(), name.to_string());
        diesel::insert_into(user_affiliates::table)
            .values(&affiliate)
            .execute(conn)?;
        info!("Connected MotoRev user {} as {}", motorev_user_id, affiliate.get_affiliate_code());
        Ok((affiliate, true))
    })
}

pub fn get_affiliate(pool: &DbPool, affiliate_id: &str) -> Result<Option<UserAffiliate>> {
    let conn = &mut pool.get()?;
    let affiliate = user_affiliates::table
        .find(affiliate_id)
        .first::<UserAffiliate>(conn)
        .optional()?;
    Ok(affiliate)
}

/// Finds the affiliate owning a dashboard API token
pub fn get_affiliate_by_token(pool: &DbPool, api_token: &str) -> Result<Option<UserAffiliate>> {
    let conn = &mut pool.get()?;
    let affiliate = user_affiliates::table
        .filter(user_affiliates::api_token.eq(api_token))
        .first::<UserAffiliate>(conn)
        .optional()?;
    Ok(affiliate)
}

pub fn list_affiliates(pool: &DbPool) -> Result<Vec<UserAffiliate>> {
    let conn = &mut pool.get()?;
    let result = user_affiliates::table
        .order(user_affiliates::connected_at.desc())
        .load::<UserAffiliate>(conn)?;
    Ok(result)
}

/// The most recent referrals credited to an affiliate
pub fn recent_affiliate_referrals(pool: &DbPool, affiliate_id: &str) -> Result<Vec<AffiliateReferral>> {
    let conn = &mut pool.get()?;
    let result = affiliate_referrals::table
        .filter(affiliate_referrals::affiliate_id.eq(affiliate_id))
        .order(affiliate_referrals::created_at.desc())
        .limit(RECENT_REFERRAL_LIMIT)
        .load::<AffiliateReferral>(conn)?;
    Ok(result)
}

/// Credits an affiliate with a referral event from the MotoRev app
///
/// SIGNUP earns points only; PRO_CONVERSION also earns
/// `amount × rate / 10000` (rounded down) of pending commission. The
/// referral and the affiliate's totals are written in one transaction.
///
/// ### Arguments
///
/// * `pool` - A reference to the database connection pool
/// * `code` - The affiliate code the referred user signed up with
/// * `referred_user_id` - The MotoRev user who was referred
/// * `event` - What the referred user did
/// * `amount_cents` - The purchase amount for a conversion
#[instrument(skip(pool))]
pub fn record_affiliate_referral(
    pool: &DbPool,
    code: &str,
    referred_user_id: &str,
    event: ReferralEvent,
    amount_cents: i64,
) -> Result<AffiliateReferralOutcome> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        let Some(affiliate) = user_affiliates::table
            .filter(user_affiliates::affiliate_code.eq(normalize_code(code)))
            .first::<UserAffiliate>(conn)
            .optional()?
        else {
            return Ok(AffiliateReferralOutcome::UnknownCode);
        };
        if !affiliate.is_active() {
            return Ok(AffiliateReferralOutcome::Suspended);
        }

        let seen: i64 = affiliate_referrals::table
            .filter(affiliate_referrals::referred_user_id.eq(referred_user_id))
            .filter(affiliate_referrals::event.eq(event))
            .count()
            .get_result(conn)?;
        if seen > 0 {
            debug!("{} already recorded for {}", event, referred_user_id);
            return Ok(AffiliateReferralOutcome::Duplicate);
        }

        let (amount, commission) = if event.earns_commission() {
            let amount = amount_cents.max(0);
            (amount, apply_bps_floor(amount, affiliate.get_commission_rate_bps()))
        } else {
            (0, 0)
        };
        let referral = AffiliateReferral::new(&affiliate.get_id(), referred_user_id.to_string(), event, amount, commission);
        diesel::insert_into(affiliate_referrals::table)
            .values(&referral)
            .execute(conn)?;

        let new_referral = if event == ReferralEvent::Signup { 1 } else { 0 };
        diesel::update(user_affiliates::table.find(affiliate.get_id()))
            .set((
                user_affiliates::total_referrals.eq(user_affiliates::total_referrals + new_referral),
                user_affiliates::total_points.eq(user_affiliates::total_points + referral.points),
                user_affiliates::pending_commission_cents.eq(user_affiliates::pending_commission_cents + commission),
                user_affiliates::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        info!("Affiliate {} credited {} for {}", affiliate.get_affiliate_code(), event, referred_user_id);
        Ok(AffiliateReferralOutcome::Recorded(referral))
    })
}

pub fn set_affiliate_status(pool: &DbPool, affiliate_id: &str, status: AffiliateStatus) -> Result<Option<UserAffiliate>> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        let updated = diesel::update(user_affiliates::table.find(affiliate_id))
            .set((
                user_affiliates::status.eq(status),
                user_affiliates::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        if updated == 0 {
            return Ok(None);
        }
        info!("Affiliate {} is now {}", affiliate_id, status);
        user_affiliates::table.find(affiliate_id).first::<UserAffiliate>(conn).optional()
    })
    .map_err(Into::into)
}

/// Moves an affiliate's pending commission to paid
///
/// ### Returns
///
/// The amount paid, or `None` when the affiliate does not exist
pub fn pay_out_affiliate(pool: &DbPool, affiliate_id: &str) -> Result<Option<i64>> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        let Some(affiliate) = user_affiliates::table
            .find(affiliate_id)
            .first::<UserAffiliate>(conn)
            .optional()?
        else {
            return Ok(None);
        };
        let amount = affiliate.get_pending_commission_cents();
        diesel::update(user_affiliates::table.find(affiliate_id))
            .set((
                user_affiliates::pending_commission_cents.eq(0),
                user_affiliates::paid_commission_cents.eq(user_affiliates::paid_commission_cents + amount),
                user_affiliates::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        info!("Paid affiliate {} {} cents", affiliate_id, amount);
        Ok(Some(amount))
    })
}
