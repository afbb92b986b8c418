use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::errors::ApiError;
use crate::integrations::FeedSync;
use crate::repo::{apply_bank_sync, list_bank_connections, match_bill_payments, BillMatch, SyncCounts};
use crate::state::AppState;

/// Upper bound on feed pages pulled for one connection in one sync
const MAX_SYNC_PAGES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSync {
    pub connection_id: String,
    pub institution_name: String,
    pub counts: SyncCounts,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BankSyncSummary {
    pub connections: Vec<ConnectionSync>,
    pub matched_bills: Vec<BillMatch>,
}

fn add_counts(total: &mut SyncCounts, counts: SyncCounts) {
    total.added += counts.added;
    total.modified += counts.modified;
    total.removed += counts.removed;
}

/// Pulls every new page for one connection, storing each as it arrives
///
/// The cursor is saved with each page, so a failure part way keeps what was
/// already applied.
async fn sync_connection(state: &AppState, connection_id: &str, access_token: &str, mut cursor: Option<String>) -> (SyncCounts, Option<String>) {
    let bank = match state.integrations.bank() {
        Ok(bank) => bank,
        Err(e) => return (SyncCounts::default(), Some(e.to_string())),
    };
    let mut total = SyncCounts::default();
    for _ in 0..MAX_SYNC_PAGES {
        let page: FeedSync = match bank.sync(access_token, cursor.as_deref()).await {
            Ok(page) => page,
            Err(e) => return (total, Some(e.to_string())),
        };
        let page_was_empty = page.added.is_empty() && page.modified.is_empty() && page.removed.is_empty();
        let unchanged_cursor = page.next_cursor.is_none() || page.next_cursor == cursor;
        if page_was_empty && unchanged_cursor {
            break;
        }
        match apply_bank_sync(&state.pool, connection_id, &page) {
            Ok(counts) => add_counts(&mut total, counts),
            Err(e) => return (total, Some(format!("{:#}", e))),
        }
        if page_was_empty || unchanged_cursor {
            break;
        }
        cursor = page.next_cursor;
    }
    (total, None)
}

/// Syncs every bank connection, then settles bills paid by the new transactions
///
/// A connection that fails is reported in the summary; the others still sync
/// and bill matching still runs.
#[instrument(skip(state))]
pub async fn sync_all_connections(state: &AppState) -> Result<BankSyncSummary, ApiError> {
    state.integrations.bank()?;
    let connections = list_bank_connections(&state.pool).map_err(ApiError::Database)?;

    let mut summary = BankSyncSummary::default();
    for connection in connections {
        let (counts, error) = sync_connection(state, &connection.id, &connection.access_token, connection.cursor.clone()).await;
        if let Some(error) = &error {
            warn!("Bank sync for {} failed: {}", connection.institution_name, error);
        }
        summary.connections.push(ConnectionSync {
            connection_id: connection.id,
            institution_name: connection.institution_name,
            counts,
            error,
        });
    }

    summary.matched_bills = match_bill_payments(&state.pool).map_err(ApiError::Database)?;
    info!(
        "Bank sync finished: {} connection(s), {} bill(s) matched",
        summary.connections.len(),
        summary.matched_bills.len()
    );
    Ok(summary)
}
