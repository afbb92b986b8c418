use crate::db::DbPool;
use crate::models::{normalize_code, Partner, PartnerReferral, PartnerStatus, ReferralStatus};
use crate::money::apply_bps_floor;
use crate::schema::{partner_referrals, partners};
use anyhow::Result;
use chrono::Utc;
use diesel::prelude::*;
use tracing::{debug, info, instrument};

/// Fields an admin may change on an existing partner
#[derive(AsChangeset, Debug, Default, Clone)]
#[diesel(table_name = partners)]
pub struct PartnerChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub commission_rate_bps: Option<i32>,
    pub status: Option<PartnerStatus>,
}

/// Result of an approve or void request on a referral
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferralUpdate {
    Updated(PartnerReferral),
    /// The referral is not in a status that allows the change
    InvalidStatus(ReferralStatus),
}

#[instrument(skip(pool, partner), fields(code = %partner.get_code()))]
pub fn create_partner(pool: &DbPool, partner: Partner) -> Result<Partner> {
    let conn = &mut pool.get()?;
    diesel::insert_into(partners::table)
        .values(&partner)
        .execute(conn)?;
    info!("Created partner {}", partner.get_id());
    Ok(partner)
}

pub fn get_partner(pool: &DbPool, partner_id: &str) -> Result<Option<Partner>> {
    let conn = &mut pool.get()?;
    let partner = partners::table
        .find(partner_id)
        .first::<Partner>(conn)
        .optional()?;
    Ok(partner)
}

/// Looks up a partner by referral code as a customer typed it
pub fn get_partner_by_code(pool: &DbPool, code: &str) -> Result<Option<Partner>> {
    let conn = &mut pool.get()?;
    let partner = partners::table
        .filter(partners::code.eq(normalize_code(code)))
        .first::<Partner>(conn)
        .optional()?;
    Ok(partner)
}

pub fn list_partners(pool: &DbPool) -> Result<Vec<Partner>> {
    let conn = &mut pool.get()?;
    let result = partners::table
        .order(partners::name.asc())
        .load::<Partner>(conn)?;
    Ok(result)
}

pub fn update_partner(pool: &DbPool, partner_id: &str, changes: PartnerChanges) -> Result<Option<Partner>> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        let updated = diesel::update(partners::table.find(partner_id))
            .set((&changes, partners::updated_at.eq(Utc::now().naive_utc())))
            .execute(conn)?;
        if updated == 0 {
            return Ok(None);
        }
        info!("Updated partner {}", partner_id);
        partners::table.find(partner_id).first::<Partner>(conn).optional()
    })
    .map_err(Into::into)
}

/// Referrals credited to a partner, newest first
pub fn list_partner_referrals(pool: &DbPool, partner_id: &str) -> Result<Vec<PartnerReferral>> {
    let conn = &mut pool.get()?;
    let result = partner_referrals::table
        .filter(partner_referrals::partner_id.eq(partner_id))
        .order(partner_referrals::created_at.desc())
        .load::<PartnerReferral>(conn)?;
    Ok(result)
}

/// Credits the partner behind `code` with a paid order
///
/// The commission is `subtotal × rate / 10000` rounded down. An order is
/// credited at most once; the referral and the partner's totals are written
/// in one transaction.
///
/// ### Arguments
///
/// * `pool` - A reference to the database connection pool
/// * `code` - The referral code stored on the order
/// * `order_id` - The paid order
/// * `subtotal_cents` - The order subtotal the commission is based on
///
/// ### Returns
///
/// The new referral, or `None` when the code is unknown or inactive or the
/// order was already credited
#[instrument(skip(pool))]
pub fn record_referral_for_order(
    pool: &DbPool,
    code: &str,
    order_id: &str,
    subtotal_cents: i64,
) -> Result<Option<PartnerReferral>> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        let Some(partner) = partners::table
            .filter(partners::code.eq(normalize_code(code)))
            .first::<Partner>(conn)
            .optional()?
        else {
            debug!("No partner for code {}", code);
            return Ok(None);
        };
        if !partner.is_active() {
            debug!("Partner {} is inactive", partner.get_id());
            return Ok(None);
        }

        let already: i64 = partner_referrals::table
            .filter(partner_referrals::order_id.eq(order_id))
            .count()
            .get_result(conn)?;
        if already > 0 {
            debug!("Order {} already credited", order_id);
            return Ok(None);
        }

        let commission = apply_bps_floor(subtotal_cents, partner.get_commission_rate_bps());
        let referral = PartnerReferral::new(&partner.get_id(), order_id, subtotal_cents, commission);
        diesel::insert_into(partner_referrals::table)
            .values(&referral)
            .execute(conn)?;
        diesel::update(partners::table.find(partner.get_id()))
            .set((
                partners::total_referrals.eq(partners::total_referrals + 1),
                partners::total_earned_cents.eq(partners::total_earned_cents + commission),
                partners::updated_at.eq(Utc::now().naive_utc()),
            ))
            .execute(conn)?;
        info!("Partner {} earned {} on order {}", partner.get_code(), commission, order_id);
        Ok(Some(referral))
    })
}

fn set_referral_status(
    pool: &DbPool,
    referral_id: &str,
    allowed_from: &[ReferralStatus],
    next: ReferralStatus,
) -> Result<Option<ReferralUpdate>> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        let Some(referral) = partner_referrals::table
            .find(referral_id)
            .first::<PartnerReferral>(conn)
            .optional()?
        else {
            return Ok(None);
        };
        if !allowed_from.contains(&referral.status) {
            return Ok(Some(ReferralUpdate::InvalidStatus(referral.status)));
        }
        diesel::update(partner_referrals::table.find(referral_id))
            .set(partner_referrals::status.eq(next))
            .execute(conn)?;
        if next == ReferralStatus::Void {
            diesel::update(partners::table.find(&referral.partner_id))
                .set((
                    partners::total_earned_cents.eq(partners::total_earned_cents - referral.commission_cents),
                    partners::updated_at.eq(Utc::now().naive_utc()),
                ))
                .execute(conn)?;
        }
        info!("Referral {} is now {}", referral_id, next);
        let referral = partner_referrals::table.find(referral_id).first::<PartnerReferral>(conn)?;
        Ok(Some(ReferralUpdate::Updated(referral)))
    })
}

/// Approves a PENDING referral for payout
pub fn approve_referral(pool: &DbPool, referral_id: &str) -> Result<Option<ReferralUpdate>> {
    set_referral_status(pool, referral_id, &[ReferralStatus::Pending], ReferralStatus::Approved)
}

/// Voids an unpaid referral and takes its commission off the partner's
/// earnings
pub fn void_referral(pool: &DbPool, referral_id: &str) -> Result<Option<ReferralUpdate>> {
    set_referral_status(
        pool,
        referral_id,
        &[ReferralStatus::Pending, ReferralStatus::Approved],
        ReferralStatus::Void,
    )
}

/// Pays out every APPROVED referral of a partner
///
/// ### Returns
///
/// The amount paid, or `None` when the partner does not exist
#[instrument(skip(pool))]
pub fn pay_out_partner(pool: &DbPool, partner_id: &str) -> Result<Option<i64>> {
    let conn = &mut pool.get()?;
    conn.transaction(|conn| {
        let exists: i64 = partners::table.find(partner_id).count().get_result(conn)?;
        if exists == 0 {
            return Ok(None);
        }
        let approved = partner_referrals::table
            .filter(partner_referrals::partner_id.eq(partner_id))
            .filter(partner_referrals::status.eq(ReferralStatus::Approved))
            .load::<PartnerReferral>(conn)?;
        let amount: i64 = approved.iter().map(|r| r.commission_cents).sum();
        if approved.is_empty() {
            return Ok(Some(0));
        }

        let now = Utc::now().naive_utc();
        let ids: Vec<String> = approved.into_iter().map(|r| r.id).collect();
        diesel::update(partner_referrals::table.filter(partner_referrals::id.eq_any(&ids)))
            .set((
                partner_referrals::status.eq(ReferralStatus::Paid),
                partner_referrals::paid_at.eq(Some(now)),
            ))
            .execute(conn)?;
        diesel::update(partners::table.find(partner_id))
            .set((
                partners::total_paid_cents.eq(partners::total_paid_cents + amount),
                partners::updated_at.eq(now),
            ))
            .execute(conn)?;
        info!("Paid partner {} {} cents for {} referral(s)", partner_id, amount, ids.len());
        Ok(Some(amount))
    })
}
