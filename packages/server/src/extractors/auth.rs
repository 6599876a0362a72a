use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::CookieJar;
use sea_orm::EntityTrait;

use crate::entity::session;
use crate::error::AppError;
use crate::state::AppState;
use crate::utils::jwt;

/// Cookie carrying the same bearer token for browser clients.
pub const SESSION_COOKIE: &str = "archflow_session";

/// Authenticated user.
///
/// The token comes from `Authorization: Bearer <token>` or, failing that, the
/// [`SESSION_COOKIE`] cookie. A valid signature is not enough: the session it
/// names must still exist and be unexpired, so logout revokes the token.
pub struct AuthUser {
    pub user_id: i32,
    pub email: String,
    pub session_token: String,
}

impl AuthUser {
    /// Returns `Ok(())` if the user owns the resource, `Err(PermissionDenied)` otherwise.
    pub fn require_owner(&self, owner_id: i32) -> Result<(), AppError> {
        if self.user_id == owner_id {
            Ok(())
        } else {
            Err(AppError::PermissionDenied)
        }
    }
}

fn bearer_token(parts: &Parts) -> Result<Option<String>, AppError> {
    let Some(header) = parts.headers.get("Authorization") else {
        return Ok(None);
    };
    let value = header.to_str().map_err(|_| AppError::TokenInvalid)?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or(AppError::TokenInvalid)?;
    Ok(Some(token.trim().to_string()))
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = match bearer_token(parts)? {
            Some(token) => token,
            None => CookieJar::from_headers(&parts.headers)
                .get(SESSION_COOKIE)
                .map(|c| c.value().to_string())
                .ok_or(AppError::TokenMissing)?,
        };

        let claims = jwt::verify(&token, &state.config.auth.jwt_secret)
            .map_err(|_| AppError::TokenInvalid)?;

        let session = session::Entity::find_by_id(claims.sid.clone())
            .one(&state.db)
            .await?
            .ok_or(AppError::TokenInvalid)?;

        if session.user_id != claims.uid || session.expires <= chrono::Utc::now() {
            return Err(AppError::TokenInvalid);
        }

        Ok(AuthUser {
            user_id: claims.uid,
            email: claims.sub,
            session_token: session.session_token,
        })
    }
}
