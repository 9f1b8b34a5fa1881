//! Account endpoints

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use drivemirror_core::domain::AccountId;
use drivemirror_sync::accounts::{AccountStatus, AuthorizationRequest};

use super::{ApiError, ApiResult, AppState};

pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<AccountStatus>>> {
    Ok(Json(state.services.accounts.status_list().await?))
}

/// Consent URL for linking a new account
pub async fn authorize(State(state): State<AppState>) -> Json<AuthorizationRequest> {
    Json(state.services.accounts.authorization_url())
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
    pub state: Option<String>,
}

/// OAuth redirect target
#[instrument(skip_all)]
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<(StatusCode, Json<AccountStatus>)> {
    if let Some(error) = query.error {
        warn!(%error, "Authorization denied");
        return Err(ApiError::BadRequest(format!("Authorization denied: {error}")));
    }
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing authorization code".to_string()))?;

    let account = state.services.accounts.link_account(&code).await?;
    info!(account_id = %account.id(), email = %account.email(), "Account linked via callback");
    Ok((
        StatusCode::CREATED,
        Json(AccountStatus::from_account(&account, Utc::now())),
    ))
}

#[instrument(skip(state))]
pub async fn activate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = id.parse::<AccountId>()?;
    state.services.accounts.activate(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn deactivate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = id.parse::<AccountId>()?;
    state.services.accounts.deactivate(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn set_default(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = id.parse::<AccountId>()?;
    state.services.accounts.set_default(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = id.parse::<AccountId>()?;
    state.services.accounts.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
