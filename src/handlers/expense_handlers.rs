use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{Datelike, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::dto::{
    BillInstanceQuery, CreateExpenseDto, CreateRecurringBillDto, MonthQuery, PayBillInstanceDto, ProposedBillQuery,
    UpdateExpenseDto, UpdateRecurringBillDto,
};
use crate::errors::ApiError;
use crate::models::{BillInstance, Expense, ProposedBill, RecurringBill};
use crate::repo::{self, BillInstanceUpdate, ExpenseChanges, ProposalApproval, RecurringBillChanges};
use crate::services::bills::{scan_mailbox, ScanSummary};
use crate::state::AppState;

/// A paid bill instance and the expense it produced
#[derive(Debug, Serialize)]
pub struct BillPayment {
    pub instance: BillInstance,
    pub expense: Expense,
}

#[derive(Debug, Serialize)]
pub struct ApprovedProposal {
    pub proposal: ProposedBill,
    pub recurring_bill: RecurringBill,
}

fn category_or_default(category: Option<String>) -> Option<String> {
    category.map(|c| c.trim().to_string()).filter(|c| !c.is_empty())
}

// Expenses

/// Handler for recording an expense
///
/// This function handles POST requests to `/api/admin/expenses`.
///
/// ### Arguments
///
/// * `state` - The shared application state
/// * `payload` - Description, vendor, amount and date of the expense
///
/// ### Returns
///
/// The recorded expense with status 201
#[instrument(skip(state, payload))]
pub async fn create_expense_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateExpenseDto>,
) -> Result<(StatusCode, Json<Expense>), ApiError> {
    payload.validate().map_err(ApiError::BadRequest)?;
    let mut expense = Expense::new(
        payload.description.trim().to_string(),
        payload.vendor.trim().to_string(),
        category_or_default(payload.category).unwrap_or_else(|| "general".to_string()),
        payload.amount_cents,
        payload.expense_date,
    );
    expense.notes = payload.notes;
    let expense = repo::create_expense(&state.pool, expense).map_err(ApiError::Database)?;
    Ok((StatusCode::CREATED, Json(expense)))
}

/// Handler for listing expenses
///
/// This function handles GET requests to `/api/admin/expenses`, optionally
/// limited to one `month=YYYY-MM`.
#[instrument(skip(state))]
pub async fn list_expenses_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MonthQuery>,
) -> Result<Json<Vec<Expense>>, ApiError> {
    let range = query.range().map_err(ApiError::BadRequest)?;
    let expenses = repo::list_expenses(&state.pool, range).map_err(ApiError::Database)?;
    Ok(Json(expenses))
}

#[instrument(skip(state))]
pub async fn get_expense_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Expense>, ApiError> {
    let expense = repo::get_expense(&state.pool, &id)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Expense"))?;
    Ok(Json(expense))
}

#[instrument(skip(state, payload))]
pub async fn update_expense_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateExpenseDto>,
) -> Result<Json<Expense>, ApiError> {
    if payload.amount_cents.is_some_and(|a| a < 0) {
        return Err(ApiError::BadRequest("amount_cents must not be negative".to_string()));
    }
    let changes = ExpenseChanges {
        description: payload.description.map(|d| d.trim().to_string()),
        vendor: payload.vendor.map(|v| v.trim().to_string()),
        category: category_or_default(payload.category),
        amount_cents: payload.amount_cents,
        expense_date: payload.expense_date,
        notes: payload.notes.map(Some),
    };
    let expense = repo::update_expense(&state.pool, &id, changes)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Expense"))?;
    Ok(Json(expense))
}

#[instrument(skip(state))]
pub async fn delete_expense_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !repo::delete_expense(&state.pool, &id).map_err(ApiError::Database)? {
        return Err(ApiError::NotFound("Expense"));
    }
    Ok(StatusCode::NO_CONTENT)
}

// Recurring bills

/// Handler for adding a recurring bill
///
/// This function handles POST requests to `/api/admin/recurring-bills`.
#[instrument(skip(state, payload), fields(frequency = %payload.frequency))]
pub async fn create_recurring_bill_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateRecurringBillDto>,
) -> Result<(StatusCode, Json<RecurringBill>), ApiError> {
    payload.validate().map_err(ApiError::BadRequest)?;
    let mut bill = RecurringBill::new(
        payload.name.trim().to_string(),
        payload.vendor.trim().to_string(),
        payload.amount_cents,
        payload.frequency,
        payload.next_due_date,
    );
    if let Some(category) = category_or_default(payload.category) {
        bill.category = category;
    }
    let bill = repo::create_recurring_bill(&state.pool, bill).map_err(ApiError::Database)?;
    Ok((StatusCode::CREATED, Json(bill)))
}

#[instrument(skip(state))]
pub async fn list_recurring_bills_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RecurringBill>>, ApiError> {
    let bills = repo::list_recurring_bills(&state.pool).map_err(ApiError::Database)?;
    Ok(Json(bills))
}

#[instrument(skip(state))]
pub async fn get_recurring_bill_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RecurringBill>, ApiError> {
    let bill = repo::get_recurring_bill(&state.pool, &id)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Recurring bill"))?;
    Ok(Json(bill))
}

/// Handler for editing or pausing a recurring bill
///
/// This function handles PUT requests to `/api/admin/recurring-bills/{id}`.
/// Setting `active` to false stops new instances; existing ones are kept.
#[instrument(skip(state, payload))]
pub async fn update_recurring_bill_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateRecurringBillDto>,
) -> Result<Json<RecurringBill>, ApiError> {
    if payload.amount_cents.is_some_and(|a| a <= 0) {
        return Err(ApiError::BadRequest("amount_cents must be positive".to_string()));
    }
    let changes = RecurringBillChanges {
        name: payload.name.map(|n| n.trim().to_string()),
        vendor: payload.vendor.map(|v| v.trim().to_string()),
        category: category_or_default(payload.category),
        amount_cents: payload.amount_cents,
        frequency: payload.frequency,
        next_due_date: payload.next_due_date,
        active: payload.active,
        anchor_day: payload.next_due_date.map(|d| d.day() as i32),
    };
    let bill = repo::update_recurring_bill(&state.pool, &id, changes)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Recurring bill"))?;
    Ok(Json(bill))
}

// Bill instances

#[instrument(skip(state))]
pub async fn list_bill_instances_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BillInstanceQuery>,
) -> Result<Json<Vec<BillInstance>>, ApiError> {
    let instances = repo::list_bill_instances(&state.pool, query.status).map_err(ApiError::Database)?;
    Ok(Json(instances))
}

/// Handler for paying a bill by hand
///
/// This function handles POST requests to `/api/admin/bill-instances/{id}/pay`.
/// The body is optional; `paid_on` defaults to today.
///
/// ### Returns
///
/// The PAID instance and the expense recorded for it
#[instrument(skip(state, payload))]
pub async fn pay_bill_instance_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Option<Json<PayBillInstanceDto>>,
) -> Result<Json<BillPayment>, ApiError> {
    let paid_on = payload
        .and_then(|Json(dto)| dto.paid_on)
        .unwrap_or_else(|| Utc::now().date_naive());
    let update = repo::pay_bill_instance(&state.pool, &id, paid_on)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Bill instance"))?;
    match update {
        BillInstanceUpdate::Paid(instance, expense) => Ok(Json(BillPayment { instance, expense })),
        BillInstanceUpdate::NotPending(status) => Err(ApiError::Conflict(format!("Bill instance is {}", status))),
        BillInstanceUpdate::Skipped(_) => Err(ApiError::Conflict("Bill instance is SKIPPED".to_string())),
    }
}

#[instrument(skip(state))]
pub async fn skip_bill_instance_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BillInstance>, ApiError> {
    let update = repo::skip_bill_instance(&state.pool, &id)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Bill instance"))?;
    match update {
        BillInstanceUpdate::Skipped(instance) => Ok(Json(instance)),
        BillInstanceUpdate::NotPending(status) => Err(ApiError::Conflict(format!("Bill instance is {}", status))),
        BillInstanceUpdate::Paid(..) => Err(ApiError::Conflict("Bill instance is PAID".to_string())),
    }
}

// Proposed bills

/// Handler for scanning the mailbox for bills
///
/// This function handles POST requests to `/api/admin/bills/scan`.
#[instrument(skip(state))]
pub async fn scan_bills_handler(State(state): State<Arc<AppState>>) -> Result<Json<ScanSummary>, ApiError> {
    let summary = scan_mailbox(&state).await?;
    info!("Mailbox scan proposed {} bills", summary.proposed);
    Ok(Json(summary))
}

#[instrument(skip(state))]
pub async fn list_proposed_bills_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProposedBillQuery>,
) -> Result<Json<Vec<ProposedBill>>, ApiError> {
    let proposals = repo::list_proposed_bills(&state.pool, query.status).map_err(ApiError::Database)?;
    Ok(Json(proposals))
}

/// Handler for turning a proposal into a monthly recurring bill
///
/// This function handles POST requests to `/api/admin/proposed-bills/{id}/approve`.
/// Proposals without an amount cannot be approved.
#[instrument(skip(state))]
pub async fn approve_proposed_bill_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<ApprovedProposal>), ApiError> {
    let approval = repo::approve_proposed_bill(&state.pool, &id, Utc::now().date_naive())
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Proposed bill"))?;
    match approval {
        ProposalApproval::Approved(proposal, recurring_bill) => {
            Ok((StatusCode::CREATED, Json(ApprovedProposal { proposal, recurring_bill })))
        }
        ProposalApproval::MissingAmount => {
            Err(ApiError::BadRequest("Proposal has no amount; create the bill by hand".to_string()))
        }
        ProposalApproval::NotPending(status) => Err(ApiError::Conflict(format!("Proposal is {}", status))),
    }
}

#[instrument(skip(state))]
pub async fn reject_proposed_bill_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ProposedBill>, ApiError> {
    let proposal = repo::reject_proposed_bill(&state.pool, &id)
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound("Proposed bill"))?;
    Ok(Json(proposal))
}

#[cfg(test)]
mod tests {
    use crate::create_app;
    use crate::models::ProposedBill;
    use crate::repo::insert_proposed_bill_if_new;
    use crate::test_utils::{admin_request, body_json, setup_test_db, test_harness, CRON_SECRET};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_expense_crud_by_month() {
        let harness = test_harness(setup_test_db());
        let app = create_app(harness.state);

        for (date, amount) in [("2026-04-03", 1_200), ("2026-05-10", 4_500)] {
            let created = app
                .clone()
                .oneshot(admin_request("POST", "/api/admin/expenses", Some(json!({
                    "description": "Filament", "vendor": "Prusa", "amount_cents": amount, "expense_date": date
                }))))
                .await
                .unwrap();
            assert_eq!(created.status(), StatusCode::CREATED);
        }

        let april = app
            .clone()
            .oneshot(admin_request("GET", "/api/admin/expenses?month=2026-04", None))
            .await
            .unwrap();
        let april = body_json(april).await;
        assert_eq!(april.as_array().unwrap().len(), 1);
        assert_eq!(april[0]["category"], "general");
        let id = april[0]["id"].as_str().unwrap().to_string();

        let bad_month = app
            .clone()
            .oneshot(admin_request("GET", "/api/admin/expenses?month=April", None))
            .await
            .unwrap();
        assert_eq!(bad_month.status(), StatusCode::BAD_REQUEST);

        let updated = app
            .clone()
            .oneshot(admin_request("PUT", &format!("/api/admin/expenses/{}", id), Some(json!({"category": "materials"}))))
            .await
            .unwrap();
        assert_eq!(body_json(updated).await["category"], "materials");

        let deleted = app
            .clone()
            .oneshot(admin_request("DELETE", &format!("/api/admin/expenses/{}", id), None))
            .await
            .unwrap();
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
        let gone = app
            .oneshot(admin_request("GET", &format!("/api/admin/expenses/{}", id), None))
            .await
            .unwrap();
        assert_eq!(gone.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bill_instances_pay_and_skip() {
        let harness = test_harness(setup_test_db());
        let app = create_app(harness.state);
        let today = chrono::Utc::now().date_naive();

        for name in ["Hosting", "Insurance"] {
            app.clone()
                .oneshot(admin_request("POST", "/api/admin/recurring-bills", Some(json!({
                    "name": name, "vendor": name, "amount_cents": 2_000,
                    "frequency": "MONTHLY", "next_due_date": today.to_string()
                }))))
                .await
                .unwrap();
        }

        let generated = app
            .clone()
            .oneshot(
                Request::post("/api/cron/bills")
                    .header("authorization", format!("Bearer {}", CRON_SECRET))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(generated.status(), StatusCode::OK);
        let instances = body_json(generated).await;
        let instances = instances.as_array().unwrap();
        assert_eq!(instances.len(), 2);
        let first = instances[0]["id"].as_str().unwrap().to_string();
        let second = instances[1]["id"].as_str().unwrap().to_string();

        let paid = app
            .clone()
            .oneshot(admin_request("POST", &format!("/api/admin/bill-instances/{}/pay", first), Some(json!({}))))
            .await
            .unwrap();
        let paid = body_json(paid).await;
        assert_eq!(paid["instance"]["status"], "PAID");
        assert_eq!(paid["expense"]["amount_cents"], 2_000);
        assert_eq!(paid["expense"]["bill_instance_id"], first.as_str());

        let skipped = app
            .clone()
            .oneshot(admin_request("POST", &format!("/api/admin/bill-instances/{}/skip", second), None))
            .await
            .unwrap();
        assert_eq!(body_json(skipped).await["status"], "SKIPPED");

        let pay_skipped = app
            .clone()
            .oneshot(admin_request("POST", &format!("/api/admin/bill-instances/{}/pay", second), None))
            .await
            .unwrap();
        assert_eq!(pay_skipped.status(), StatusCode::CONFLICT);

        let pending = app
            .oneshot(admin_request("GET", "/api/admin/bill-instances?status=PENDING", None))
            .await
            .unwrap();
        assert!(body_json(pending).await.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_proposal_approval() {
        let harness = test_harness(setup_test_db());
        let pool = &harness.state.pool;
        let with_amount = ProposedBill::new("m1".to_string(), "Spectrum".to_string(), "Your bill".to_string(), Some(8_999), None);
        let without = ProposedBill::new("m2".to_string(), "TECO".to_string(), "Statement".to_string(), None, None);
        insert_proposed_bill_if_new(pool, &with_amount).unwrap();
        insert_proposed_bill_if_new(pool, &without).unwrap();
        let app = create_app(harness.state.clone());

        let approved = app
            .clone()
            .oneshot(admin_request("POST", &format!("/api/admin/proposed-bills/{}/approve", with_amount.id), None))
            .await
            .unwrap();
        assert_eq!(approved.status(), StatusCode::CREATED);
        let approved = body_json(approved).await;
        assert_eq!(approved["recurring_bill"]["frequency"], "MONTHLY");
        assert_eq!(approved["recurring_bill"]["amount_cents"], 8_999);

        let no_amount = app
            .clone()
            .oneshot(admin_request("POST", &format!("/api/admin/proposed-bills/{}/approve", without.id), None))
            .await
            .unwrap();
        assert_eq!(no_amount.status(), StatusCode::BAD_REQUEST);

        let rejected = app
            .clone()
            .oneshot(admin_request("POST", &format!("/api/admin/proposed-bills/{}/reject", without.id), None))
            .await
            .unwrap();
        assert_eq!(body_json(rejected).await["status"], "REJECTED");

        let scan = app
            .oneshot(admin_request("POST", "/api/admin/bills/scan", None))
            .await
            .unwrap();
        assert_eq!(scan.status(), StatusCode::BAD_GATEWAY);
    }
}
