use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{Duration, Utc};
use sea_orm::*;
use tracing::instrument;

use crate::entity::{account, session, user, verification_token};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::{AuthUser, SESSION_COOKIE};
use crate::extractors::json::AppJson;
use crate::models::auth::{
    LoginRequest, LoginResponse, MagicLinkRequest, MagicLinkResponse, MagicLinkVerifyRequest,
    RegisterRequest, UserResponse, normalize_email, validate_login_request,
    validate_register_request,
};
use crate::state::AppState;
use crate::utils::{hash, jwt};

/// Create a session row and the bearer token bound to it.
async fn issue_session(
    state: &AppState,
    user: user::Model,
    jar: CookieJar,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let expires = Utc::now() + Duration::days(state.config.auth.session_days);
    let session_token = hash::random_token(32);

    session::ActiveModel {
        session_token: Set(session_token.clone()),
        user_id: Set(user.id),
        expires: Set(expires),
    }
    .insert(&state.db)
    .await?;

    let token = jwt::sign(
        user.id,
        &user.email,
        &session_token,
        expires,
        &state.config.auth.jwt_secret,
    )
    .map_err(|e| AppError::Internal(format!("JWT sign error: {e}")))?;

    let cookie = Cookie::build((SESSION_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    Ok((
        jar.add(cookie),
        Json(LoginResponse {
            token,
            expires_at: expires,
            user: user.into(),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/register",
    tag = "Auth",
    operation_id = "register",
    summary = "Register with email and password",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 409, description = "Email already registered (EMAIL_TAKEN)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = validate_register_request(&payload)?;

    let password_hash = hash::hash_password(&payload.password)
        .map_err(|e| AppError::Internal(format!("Password hash error: {e}")))?;
    let now = Utc::now();

    let txn = state.db.begin().await?;

    let new_user = user::ActiveModel {
        email: Set(email.clone()),
        name: Set(payload
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())),
        image: Set(None),
        email_verified: Set(None),
        created_at: Set(now),
        ..Default::default()
    };

    let user = new_user.insert(&txn).await.map_err(|e| match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::EmailTaken,
        _ => AppError::from(e),
    })?;

    account::ActiveModel {
        user_id: Set(user.id),
        provider: Set(account::CREDENTIALS_PROVIDER.to_string()),
        provider_account_id: Set(email),
        password_hash: Set(Some(password_hash)),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await
    .map_err(|e| match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::EmailTaken,
        _ => AppError::from(e),
    })?;

    txn.commit().await?;
    tracing::info!(user_id = user.id, "Registered user");

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

#[utoipa::path(
    post,
    path = "/login",
    tag = "Auth",
    operation_id = "login",
    summary = "Log in with email and password",
    description = "Creates a session. The token is returned in the body and set as the `archflow_session` cookie.",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session created", body = LoginResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Wrong email or password (INVALID_CREDENTIALS)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    validate_login_request(&payload)?;
    let email = payload.email.trim().to_lowercase();

    let account = account::Entity::find()
        .filter(account::Column::Provider.eq(account::CREDENTIALS_PROVIDER))
        .filter(account::Column::ProviderAccountId.eq(&email))
        .one(&state.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    let stored = account
        .password_hash
        .as_deref()
        .ok_or(AppError::InvalidCredentials)?;
    let is_valid = hash::verify_password(&payload.password, stored)
        .map_err(|e| AppError::Internal(format!("Password verify error: {e}")))?;
    if !is_valid {
        return Err(AppError::InvalidCredentials);
    }

    let user = user::Entity::find_by_id(account.user_id)
        .one(&state.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    issue_session(&state, user, jar).await
}

#[utoipa::path(
    post,
    path = "/logout",
    tag = "Auth",
    operation_id = "logout",
    summary = "End the current session",
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, jar), fields(user_id = auth_user.user_id))]
pub async fn logout(
    auth_user: AuthUser,
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    session::Entity::delete_by_id(auth_user.session_token)
        .exec(&state.db)
        .await?;

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Ok((jar, StatusCode::NO_CONTENT))
}

#[utoipa::path(
    get,
    path = "/me",
    tag = "Auth",
    operation_id = "getCurrentUser",
    summary = "Get the current user",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn me(
    auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserResponse>, AppError> {
    let user = user::Entity::find_by_id(auth_user.user_id)
        .one(&state.db)
        .await?
        .ok_or(AppError::TokenInvalid)?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    post,
    path = "/magic-link",
    tag = "Auth",
    operation_id = "requestMagicLink",
    summary = "Request a sign-in link",
    description = "Issues a single-use token for the address. Delivery is out of band; the token is written to the server log.",
    request_body = MagicLinkRequest,
    responses(
        (status = 202, description = "Link issued", body = MagicLinkResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, payload))]
pub async fn request_magic_link(
    State(state): State<AppState>,
    AppJson(payload): AppJson<MagicLinkRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = normalize_email(&payload.email)?;
    let token = hash::random_token(32);
    let expires = Utc::now() + Duration::minutes(state.config.auth.magic_link_minutes);

    verification_token::ActiveModel {
        identifier: Set(email.clone()),
        token: Set(token.clone()),
        expires: Set(expires),
    }
    .insert(&state.db)
    .await?;

    tracing::info!(email = %email, token = %token, "Magic link issued");

    Ok((
        StatusCode::ACCEPTED,
        Json(MagicLinkResponse {
            message: "If the address can sign in, a link has been issued".into(),
            expires_at: expires,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/magic-link/verify",
    tag = "Auth",
    operation_id = "verifyMagicLink",
    summary = "Redeem a sign-in link",
    description = "Consumes the token, creating the user on first sign-in and marking the email verified.",
    request_body = MagicLinkVerifyRequest,
    responses(
        (status = 200, description = "Session created", body = LoginResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unknown, used or expired token (TOKEN_INVALID)", body = ErrorBody),
    ),
)]
#[instrument(skip(state, jar, payload))]
pub async fn verify_magic_link(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(payload): AppJson<MagicLinkVerifyRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let email = normalize_email(&payload.email)?;
    let now = Utc::now();

    let txn = state.db.begin().await?;

    let record = verification_token::Entity::find_by_id((email.clone(), payload.token.trim().to_string()))
        .one(&txn)
        .await?
        .ok_or(AppError::TokenInvalid)?;
    // Single use, even when expired.
    verification_token::Entity::delete_by_id((record.identifier.clone(), record.token.clone()))
        .exec(&txn)
        .await?;

    if record.expires <= now {
        txn.commit().await?;
        return Err(AppError::TokenInvalid);
    }

    let existing = user::Entity::find()
        .filter(user::Column::Email.eq(&email))
        .one(&txn)
        .await?;

    let user = match existing {
        Some(u) => {
            let mut active: user::ActiveModel = u.into();
            active.email_verified = Set(Some(now));
            active.update(&txn).await?
        }
        None => {
            user::ActiveModel {
                email: Set(email.clone()),
                name: Set(None),
                image: Set(None),
                email_verified: Set(Some(now)),
                created_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?
        }
    };

    let has_account = account::Entity::find()
        .filter(account::Column::Provider.eq(account::EMAIL_PROVIDER))
        .filter(account::Column::ProviderAccountId.eq(&email))
        .one(&txn)
        .await?
        .is_some();
    if !has_account {
        account::ActiveModel {
            user_id: Set(user.id),
            provider: Set(account::EMAIL_PROVIDER.to_string()),
            provider_account_id: Set(email),
            password_hash: Set(None),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }

    txn.commit().await?;
    tracing::info!(user_id = user.id, "Magic link redeemed");

    issue_session(&state, user, jar).await
}
