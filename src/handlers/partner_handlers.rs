use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::auth::{bearer_token, generate_code, header_secret, secrets_match};
use crate::dto::{AffiliateReferralDto, AffiliateStatusDto, ConnectAffiliateDto, CreatePartnerDto, UpdatePartnerDto};
use crate::errors::ApiError;
use crate::models::{
    AffiliateReferral, AffiliateStatus, Partner, PartnerReferral, UserAffiliate, DEFAULT_PARTNER_COMMISSION_BPS,
};
use crate::repo::{self, AffiliateReferralOutcome, PartnerChanges, ReferralUpdate};
use crate::state::AppState;

const MOTOREV_SECRET_HEADER: &str = "x-motorev-secret";

/// Attempts at drawing an unused partner code before giving up
const CODE_ATTEMPTS: usize = 5;

/// A partner with its referrals
#[derive(Debug, Serialize)]
pub struct PartnerDetail {
    #[serde(flatten)]
    pub partner: Partner,
    pub balance_cents: i64,
    pub referrals: Vec<PartnerReferral>,
}

/// The public answer for a referral code
#[derive(Debug, Serialize)]
pub struct CodeValidation {
    pub valid: bool,
    pub code: String,
    pub partner_name: String,
}

#[derive(Debug, Serialize)]
pub struct Payout {
    pub amount_cents: i64,
}

/// Returned to the MotoRev portal on connect
///
/// This is the only place the api token is ever serialized.
#[derive(Debug, Serialize)]
pub struct AffiliateConnection {
    pub affiliate_id: String,
    pub affiliate_code: String,
    pub api_token: String,
    pub created: bool,
}

#[derive(Debug, Serialize)]
pub struct AffiliateDashboard {
    #[serde(flatten)]
    pub affiliate: UserAffiliate,
    pub recent_referrals: Vec<AffiliateReferral>,
}

fn check_motorev_secret(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    if !secrets_match(
        header_secret(headers, MOTOREV_SECRET_HEADER),
        state.config.motorev_webhook_secret.as_deref(),
    ) {
        warn!("Rejected MotoRev request without a valid secret");
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

fn referral_update(update: Option<ReferralUpdate>) -> Result<PartnerReferral, ApiError> {
    match update.ok_or(ApiError::NotFound("Referral"))? {
        ReferralUpdate::Updated(referral) => Ok(referral),
        ReferralUpdate::InvalidStatus(status) => Err(ApiError::Conflict(format!("Referral is {}", status))),
    }
}

fn unused_code(state: &AppState) -> Result<String, ApiError> {
    for _ in 0..CODE_ATTEMPTS {
        let code = generate_code("", 8);
        if repo::get_partner_by_code(&state.pool, &code).map_err(ApiError::Database)?.is_none() {
            return Ok(code);
        }
    }
    Err(ApiError::Conflict("Could not allocate a partner code".to_string()))
}

// Storefront partners

/// Handler for enrolling a partner
///
/// This function handles POST requests to `/api/admin/partners`. A code is
/// generated when none is given; codes are stored upper-case.
///
/// ### Arguments
///
/// * `state` - The shared application state
/// * `payload` - Name, email and optional code and commission rate
///
/// ### Returns
///
/// The created partner with status 201, or 409 when the code is taken
#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn create_partner_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreatePartnerDto>,
) -> Result<(StatusCode, Json<Partner>), ApiError> {
    payload.validate().map_err(ApiError::BadRequest)?;
    let code = match payload.code.as_deref() {
        Some(code) => {
            if repo::get_partner_by_code(&state.pool, code).map_err(ApiError::Database)?.is_some() {
                return Err(ApiError::Conflict(format!("Code {} is already in use", code.trim().to_ascii_uppercase())));
            }
            code.to_string()
        }
        None => unused_code(&state)?,
    };
    let partner = Partner::new(
        payload.name.trim().to_string(),
        payload.email.trim().to_string(),
        &code,
        payload.commission_rate_bps.unwrap_or(DEFAULT_PARTNER_COMMISSION_BPS),
    );
    let partner = repo::create_partner(&state.pool, partner).map_err(ApiError::Database)?;
    info!("Enrolled partner {}", partner.get_code());
    Ok((StatusCode::CREATED, Json(partner)))
}

#[instrument(skip(state))]
pub async fn list_partners_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Partner>>, ApiError> {
    let partners = repo::list_partners(&state.pool).map_err(ApiError::Database)?;
    Ok(Json(partners))
}

#[instrument(skip(state))]
pub async fn get_partner_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PartnerDetail>, ApiError> {
    let partner = repo::get_partner(&state.pool, &id)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Partner"))?;
    let referrals = repo::list_partner_referrals(&state.pool, &id).map_err(ApiError::Database)?;
    Ok(Json(PartnerDetail {
        balance_cents: partner.get_balance_cents(),
        partner,
        referrals,
    }))
}

#[instrument(skip(state, payload))]
pub async fn update_partner_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdatePartnerDto>,
) -> Result<Json<Partner>, ApiError> {
    payload.validate().map_err(ApiError::BadRequest)?;
    let changes = PartnerChanges {
        name: payload.name.map(|n| n.trim().to_string()),
        email: payload.email.map(|e| e.trim().to_string()),
        commission_rate_bps: payload.commission_rate_bps,
        status: payload.status,
    };
    let partner = repo::update_partner(&state.pool, &id, changes)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Partner"))?;
    Ok(Json(partner))
}

/// Handler for checking a referral code at checkout
///
/// This function handles GET requests to `/api/partners/validate/{code}`.
/// Unknown and inactive codes are both reported as not found.
#[instrument(skip(state))]
pub async fn validate_code_handler(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<CodeValidation>, ApiError> {
    let partner = repo::get_partner_by_code(&state.pool, &code)
        .map_err(ApiError::Database)?
        .filter(Partner::is_active)
        .ok_or(ApiError::NotFound("Referral code"))?;
    Ok(Json(CodeValidation {
        valid: true,
        code: partner.get_code(),
        partner_name: partner.get_name(),
    }))
}

/// Handler for approving a referral for payout
///
/// This function handles POST requests to
/// `/api/admin/partner-referrals/{id}/approve`. Only PENDING referrals can
/// be approved.
#[instrument(skip(state))]
pub async fn approve_referral_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PartnerReferral>, ApiError> {
    let update = repo::approve_referral(&state.pool, &id).map_err(ApiError::Database)?;
    Ok(Json(referral_update(update)?))
}

/// Handler for voiding an unpaid referral
///
/// This function handles POST requests to
/// `/api/admin/partner-referrals/{id}/void`.
#[instrument(skip(state))]
pub async fn void_referral_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PartnerReferral>, ApiError> {
    let update = repo::void_referral(&state.pool, &id).map_err(ApiError::Database)?;
    Ok(Json(referral_update(update)?))
}

/// Handler for paying a partner every approved commission
///
/// This function handles POST requests to `/api/admin/partners/{id}/payout`.
#[instrument(skip(state))]
pub async fn partner_payout_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Payout>, ApiError> {
    let amount_cents = repo::pay_out_partner(&state.pool, &id)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Partner"))?;
    Ok(Json(Payout { amount_cents }))
}

// MotoRev affiliates

/// Handler for a MotoRev user joining the affiliate program
///
/// This function handles POST requests to `/api/motorev/affiliate/connect`,
/// authenticated by the `x-motorev-secret` header. Connecting twice returns
/// the same code and token.
///
/// ### Returns
///
/// The affiliate code and dashboard token; status 201 on first connect
#[instrument(skip_all, fields(user = %payload.motorev_user_id))]
pub async fn connect_affiliate_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ConnectAffiliateDto>,
) -> Result<(StatusCode, Json<AffiliateConnection>), ApiError> {
    check_motorev_secret(&state, &headers)?;
    payload.validate().map_err(ApiError::BadRequest)?;
    let (affiliate, created) = repo::connect_affiliate(
        &state.pool,
        payload.motorev_user_id.trim(),
        payload.email.trim(),
        payload.name.trim(),
    )
    .map_err(ApiError::Database)?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((
        status,
        Json(AffiliateConnection {
            affiliate_id: affiliate.get_id(),
            affiliate_code: affiliate.get_affiliate_code(),
            api_token: affiliate.get_api_token(),
            created,
        }),
    ))
}

/// Handler for the affiliate's own dashboard
///
/// This function handles GET requests to `/api/motorev/affiliate/dashboard`
/// with the affiliate's api token as bearer token.
#[instrument(skip_all)]
pub async fn affiliate_dashboard_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<AffiliateDashboard>, ApiError> {
    let token = bearer_token(&headers).ok_or(ApiError::Unauthorized)?;
    let affiliate = repo::get_affiliate_by_token(&state.pool, token)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::Unauthorized)?;
    let recent_referrals =
        repo::recent_affiliate_referrals(&state.pool, &affiliate.get_id()).map_err(ApiError::Database)?;
    Ok(Json(AffiliateDashboard { affiliate, recent_referrals }))
}

/// Handler for referral events reported by the MotoRev app
///
/// This function handles POST requests to `/api/motorev/referrals`.
///
/// ### Returns
///
/// The credited referral with status 201; 409 for a repeated event, 403 for
/// a suspended affiliate and 404 for an unknown code
#[instrument(skip_all, fields(event = %payload.event))]
pub async fn record_affiliate_referral_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<AffiliateReferralDto>,
) -> Result<(StatusCode, Json<AffiliateReferral>), ApiError> {
    check_motorev_secret(&state, &headers)?;
    payload.validate().map_err(ApiError::BadRequest)?;
    let outcome = repo::record_affiliate_referral(
        &state.pool,
        &payload.affiliate_code,
        payload.referred_user_id.trim(),
        payload.event,
        payload.amount_cents.unwrap_or(0),
    )
    .map_err(ApiError::Database)?;
    match outcome {
        AffiliateReferralOutcome::Recorded(referral) => Ok((StatusCode::CREATED, Json(referral))),
        AffiliateReferralOutcome::Duplicate => Err(ApiError::Conflict(format!(
            "{} already recorded for {}",
            payload.event, payload.referred_user_id
        ))),
        AffiliateReferralOutcome::Suspended => Err(ApiError::Forbidden("Affiliate is suspended".to_string())),
        AffiliateReferralOutcome::UnknownCode => Err(ApiError::NotFound("Affiliate")),
    }
}

#[instrument(skip(state))]
pub async fn list_affiliates_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<UserAffiliate>>, ApiError> {
    let affiliates = repo::list_affiliates(&state.pool).map_err(ApiError::Database)?;
    Ok(Json(affiliates))
}

/// Handler for suspending an affiliate
///
/// This function handles POST requests to `/api/admin/affiliates/{id}/suspend`.
#[instrument(skip(state))]
pub async fn suspend_affiliate_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<UserAffiliate>, ApiError> {
    let affiliate = repo::set_affiliate_status(&state.pool, &id, AffiliateStatus::Suspended)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Affiliate"))?;
    Ok(Json(affiliate))
}

/// Handler for setting an affiliate's status, e.g. to reinstate one
///
/// This function handles PATCH requests to `/api/admin/affiliates/{id}/status`.
#[instrument(skip(state, payload), fields(status = %payload.status))]
pub async fn set_affiliate_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<AffiliateStatusDto>,
) -> Result<Json<UserAffiliate>, ApiError> {
    let affiliate = repo::set_affiliate_status(&state.pool, &id, payload.status)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Affiliate"))?;
    Ok(Json(affiliate))
}

#[instrument(skip(state))]
pub async fn affiliate_payout_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Payout>, ApiError> {
    let amount_cents = repo::pay_out_affiliate(&state.pool, &id)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Affiliate"))?;
    Ok(Json(Payout { amount_cents }))
}

#[cfg(test)]
mod tests {
    use crate::create_app;
    use crate::models::{Order, OrderTotals};
    use crate::repo::{create_order, record_referral_for_order};
    use crate::test_utils::{admin_request, body_json, setup_test_db, test_address, test_harness, MOTOREV_SECRET};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn motorev_request(uri: &str, secret: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .header("x-motorev-secret", secret)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_partner_referral_payout() {
        let harness = test_harness(setup_test_db());
        let pool = &harness.state.pool;
        let app = create_app(harness.state.clone());

        let created = app
            .clone()
            .oneshot(admin_request("POST", "/api/admin/partners", Some(json!({
                "name": "Coastal Riders", "email": "team@coastal.test", "code": "coastal"
            }))))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let partner = body_json(created).await;
        assert_eq!(partner["code"], "COASTAL");
        assert_eq!(partner["commission_rate_bps"], 1000);
        let partner_id = partner["id"].as_str().unwrap().to_string();

        let taken = app
            .clone()
            .oneshot(admin_request("POST", "/api/admin/partners", Some(json!({
                "name": "Other", "email": "o@other.test", "code": "COASTAL"
            }))))
            .await
            .unwrap();
        assert_eq!(taken.status(), StatusCode::CONFLICT);

        let valid = app
            .clone()
            .oneshot(Request::get("/api/partners/validate/coastal").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(valid).await["partner_name"], "Coastal Riders");

        let order = Order::new(
            "rider@example.com".to_string(),
            "Jordan Vega".to_string(),
            &test_address(),
            OrderTotals { subtotal_cents: 12_345, shipping_cents: 0, tax_cents: 0 },
        );
        let order_id = order.get_id();
        create_order(pool, order, vec![]).unwrap();
        let referral = record_referral_for_order(pool, "COASTAL", &order_id, 12_345).unwrap().unwrap();
        assert_eq!(referral.commission_cents, 1_234);

        let approved = app
            .clone()
            .oneshot(admin_request("POST", &format!("/api/admin/partner-referrals/{}/approve", referral.id), None))
            .await
            .unwrap();
        assert_eq!(body_json(approved).await["status"], "APPROVED");
        let twice = app
            .clone()
            .oneshot(admin_request("POST", &format!("/api/admin/partner-referrals/{}/approve", referral.id), None))
            .await
            .unwrap();
        assert_eq!(twice.status(), StatusCode::CONFLICT);

        let payout = app
            .clone()
            .oneshot(admin_request("POST", &format!("/api/admin/partners/{}/payout", partner_id), None))
            .await
            .unwrap();
        assert_eq!(body_json(payout).await["amount_cents"], 1_234);

        let void_paid = app
            .clone()
            .oneshot(admin_request("POST", &format!("/api/admin/partner-referrals/{}/void", referral.id), None))
            .await
            .unwrap();
        assert_eq!(void_paid.status(), StatusCode::CONFLICT);

        let detail = app
            .clone()
            .oneshot(admin_request("GET", &format!("/api/admin/partners/{}", partner_id), None))
            .await
            .unwrap();
        let detail = body_json(detail).await;
        assert_eq!(detail["total_paid_cents"], 1_234);
        assert_eq!(detail["balance_cents"], 0);

        app.clone()
            .oneshot(admin_request("PUT", &format!("/api/admin/partners/{}", partner_id), Some(json!({"status": "INACTIVE"}))))
            .await
            .unwrap();
        let inactive = app
            .oneshot(Request::get("/api/partners/validate/COASTAL").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(inactive.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_motorev_affiliate_flow() {
        let harness = test_harness(setup_test_db());
        let app = create_app(harness.state);
        let connect_body = json!({"motorev_user_id": "mr_1", "email": "ace@motorev.test", "name": "Ace"});

        let rejected = app
            .clone()
            .oneshot(motorev_request("/api/motorev/affiliate/connect", "wrong", connect_body.clone()))
            .await
            .unwrap();
        assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);

        let first = app
            .clone()
            .oneshot(motorev_request("/api/motorev/affiliate/connect", MOTOREV_SECRET, connect_body.clone()))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);
        let first = body_json(first).await;
        let code = first["affiliate_code"].as_str().unwrap().to_string();
        let token = first["api_token"].as_str().unwrap().to_string();
        assert!(code.starts_with("MR-"));

        let second = app
            .clone()
            .oneshot(motorev_request("/api/motorev/affiliate/connect", MOTOREV_SECRET, connect_body))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(body_json(second).await["api_token"], token.as_str());

        let signup = json!({"affiliate_code": code, "referred_user_id": "mr_2", "event": "SIGNUP"});
        let recorded = app
            .clone()
            .oneshot(motorev_request("/api/motorev/referrals", MOTOREV_SECRET, signup.clone()))
            .await
            .unwrap();
        assert_eq!(recorded.status(), StatusCode::CREATED);
        let repeat = app
            .clone()
            .oneshot(motorev_request("/api/motorev/referrals", MOTOREV_SECRET, signup))
            .await
            .unwrap();
        assert_eq!(repeat.status(), StatusCode::CONFLICT);

        let conversion = app
            .clone()
            .oneshot(motorev_request("/api/motorev/referrals", MOTOREV_SECRET, json!({
                "affiliate_code": code, "referred_user_id": "mr_2", "event": "PRO_CONVERSION", "amount_cents": 4_999
            })))
            .await
            .unwrap();
        assert_eq!(body_json(conversion).await["commission_cents"], 999);

        let unknown = app
            .clone()
            .oneshot(motorev_request("/api/motorev/referrals", MOTOREV_SECRET, json!({
                "affiliate_code": "MR-NOPE00", "referred_user_id": "mr_3", "event": "SIGNUP"
            })))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

        let dashboard = app
            .clone()
            .oneshot(
                Request::get("/api/motorev/affiliate/dashboard")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let dashboard = body_json(dashboard).await;
        assert_eq!(dashboard["total_points"], 60);
        assert_eq!(dashboard["total_referrals"], 1);
        assert_eq!(dashboard["pending_commission_cents"], 999);
        assert_eq!(dashboard["recent_referrals"].as_array().unwrap().len(), 2);
        assert!(dashboard.get("api_token").is_none());

        let affiliate_id = first["affiliate_id"].as_str().unwrap().to_string();
        app.clone()
            .oneshot(admin_request("POST", &format!("/api/admin/affiliates/{}/suspend", affiliate_id), None))
            .await
            .unwrap();
        let suspended = app
            .clone()
            .oneshot(motorev_request("/api/motorev/referrals", MOTOREV_SECRET, json!({
                "affiliate_code": code, "referred_user_id": "mr_4", "event": "SIGNUP"
            })))
            .await
            .unwrap();
        assert_eq!(suspended.status(), StatusCode::FORBIDDEN);

        let payout = app
            .oneshot(admin_request("POST", &format!("/api/admin/affiliates/{}/payout", affiliate_id), None))
            .await
            .unwrap();
        assert_eq!(body_json(payout).await["amount_cents"], 999);
    }

    #[tokio::test]
    async fn test_dashboard_needs_known_token() {
        let harness = test_harness(setup_test_db());
        let app = create_app(harness.state);

        let response = app
            .oneshot(
                Request::get("/api/motorev/affiliate/dashboard")
                    .header("authorization", "Bearer nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
