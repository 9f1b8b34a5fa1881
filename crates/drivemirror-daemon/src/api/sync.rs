//! Reconciliation, replication history and token maintenance

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::{info, instrument};

use drivemirror_sync::accounts::AccountRefreshResult;
use drivemirror_sync::reconcile::ReconcileReport;
use drivemirror_sync::replication::ReplicationReport;

use super::{ApiResult, AppState};

/// Runs a full reconciliation pass and returns its report
#[instrument(skip_all)]
pub async fn reconcile(State(state): State<AppState>) -> ApiResult<Json<ReconcileReport>> {
    let report = state.services.reconciler.reconcile().await?;
    info!(
        reconciled = report.total_reconciled(),
        failed = report.total_failed(),
        "Reconciliation requested via API finished"
    );
    Ok(Json(report))
}

/// Recent replication reports, newest first
pub async fn replications(State(state): State<AppState>) -> Json<Vec<ReplicationReport>> {
    Json(state.services.replication_log().recent())
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshQuery {
    /// Refresh every active account, not only those near expiry
    pub force: Option<bool>,
}

#[instrument(skip(state))]
pub async fn refresh_tokens(
    State(state): State<AppState>,
    Query(query): Query<RefreshQuery>,
) -> ApiResult<Json<Vec<AccountRefreshResult>>> {
    let force = query.force.unwrap_or(true);
    Ok(Json(state.services.accounts.refresh_all(force).await?))
}
