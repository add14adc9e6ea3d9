use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderName;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::account::AccountRole;
use crate::http::AppError;
use crate::AppState;

/// The verified caller identity. The identity gateway in front of this
/// service authenticates the request and forwards the account id; a request
/// that reaches us without one is rejected before any mutation is attempted.
#[derive(Debug, Clone)]
pub struct AuthAccount {
    pub account_id: Uuid,
    pub role: AccountRole,
}

#[derive(Debug, Clone)]
pub struct AdminToken;

const ACCOUNT_ID_HEADER: HeaderName = HeaderName::from_static("x-account-id");
const ADMIN_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-admin-token");

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthAccount {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ACCOUNT_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("missing account identity"))?;

        let account_id = Uuid::parse_str(raw)
            .map_err(|_| AppError::unauthorized("invalid account identity"))?;

        let row = sqlx::query("SELECT role, is_deleted FROM accounts WHERE id = $1")
            .bind(account_id)
            .fetch_optional(state.db.pool())
            .await
            .map_err(|err| {
                tracing::error!(error = ?err, "failed to resolve account");
                AppError::internal("failed to resolve account")
            })?;

        let row = row.ok_or_else(|| AppError::unauthorized("unknown account"))?;
        let is_deleted: bool = row.get("is_deleted");
        if is_deleted {
            return Err(AppError::unauthorized("unknown account"));
        }

        let role: String = row.get("role");
        let role = AccountRole::from_db(&role)
            .ok_or_else(|| AppError::internal("unknown account role"))?;

        Ok(AuthAccount { account_id, role })
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminToken {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let expected = state
            .admin_token
            .as_ref()
            .ok_or_else(|| AppError::forbidden("admin token not configured"))?;

        let provided = parts
            .headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::forbidden("missing admin token"))?;

        if provided != expected {
            return Err(AppError::forbidden("invalid admin token"));
        }

        Ok(AdminToken)
    }
}
