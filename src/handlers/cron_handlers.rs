use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::dto::{month_label, parse_month, MonthQuery};
use crate::errors::ApiError;
use crate::models::BillInstance;
use crate::repo::{self, DashboardStats};
use crate::services::bills::generate_bills;
use crate::services::recurring_invoices::{run_recurring_invoices, RecurringRunSummary};
use crate::state::AppState;

/// Handler for the monthly invoice run
///
/// This function handles POST requests to `/api/cron/recurring-invoices`.
/// Running it twice in a month creates nothing new.
///
/// ### Returns
///
/// A summary of created, autopaid and skipped invoices
#[instrument(skip(state))]
pub async fn recurring_invoices_cron_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RecurringRunSummary>, ApiError> {
    let summary = run_recurring_invoices(&state, Utc::now().date_naive())
        .await
        .map_err(ApiError::Database)?;
    info!("Recurring invoices for {}: {} created", summary.period, summary.created);
    Ok(Json(summary))
}

/// Handler for generating upcoming bill instances
///
/// This function handles POST requests to `/api/cron/bills`.
#[instrument(skip(state))]
pub async fn bills_cron_handler(State(state): State<Arc<AppState>>) -> Result<Json<Vec<BillInstance>>, ApiError> {
    let instances = generate_bills(&state, Utc::now().date_naive()).map_err(ApiError::Database)?;
    Ok(Json(instances))
}

/// Handler for the admin dashboard numbers
///
/// This function handles GET requests to `/api/admin/dashboard`. The month
/// defaults to the current one.
#[instrument(skip(state))]
pub async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MonthQuery>,
) -> Result<Json<DashboardStats>, ApiError> {
    let label = match query.month {
        Some(month) => month,
        None => month_label(Utc::now().date_naive()),
    };
    let (start, end) = parse_month(&label)
        .ok_or_else(|| ApiError::BadRequest(format!("month must look like YYYY-MM, got {:?}", label)))?;
    let stats = repo::dashboard_stats(&state.pool, label.trim(), start, end).map_err(ApiError::Database)?;
    Ok(Json(stats))
}
