//! Custom Axum extractors for request authentication.
//!
//! Provides:
//! - `WebhookAuth`: the payment gateway's shared secret, from
//!   `Authorization: Bearer` or `X-Webhook-Secret`, compared in constant time.
//! - `InternalAuth`: `X-Internal-Secret` verified against the argon2 hash
//!   held in the internal config section.
//! - `LoopbackPeer`: the TCP peer is a loopback address.
//! - `BearerUser` / `AdminUser`: a storefront session looked up by the
//!   SHA-256 digest of its bearer token. `Option<BearerUser>` lets guests
//!   through.
//! - `ApiJson<T>`: a JSON body whose rejection is a 400 with an error body.
//!
//! All rejections happen before a handler runs, so a failed check never
//! changes state.

use axum::{
    Json,
    extract::{ConnectInfo, FromRequest, FromRequestParts, OptionalFromRequestParts, Request},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use gtop_core::entities::users::SessionUser;
use gtop_sdk::auth::{
    AUTHORIZATION_HEADER, INTERNAL_SECRET_HEADER, SecretCheck, WEBHOOK_SECRET_HEADER,
    bearer_token, check_shared_secret, hash_session_token,
};
use gtop_sdk::objects::ErrorResponse;
use serde::de::DeserializeOwned;
use std::net::SocketAddr;

use crate::state::AppState;

/// Reasons an extractor refuses a request.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing authorization token")]
    MissingToken,
    #[error("invalid or expired session")]
    InvalidToken,
    #[error("admin role required")]
    Forbidden,
    #[error("missing credentials")]
    MissingSecret,
    #[error("invalid credentials")]
    InvalidSecret,
    #[error("peer is not a loopback address")]
    NotLoopback,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Missing authorization token"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid or expired session"),
            AuthError::Forbidden => (StatusCode::FORBIDDEN, "Admin access required"),
            AuthError::MissingSecret | AuthError::InvalidSecret => {
                (StatusCode::UNAUTHORIZED, "Unauthorized")
            }
            AuthError::NotLoopback => (StatusCode::FORBIDDEN, "Forbidden"),
            AuthError::Database(e) => {
                tracing::error!(error = %e, "Session lookup failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };
        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

// ---------------------------------------------------------------------------
// Shared secrets
// ---------------------------------------------------------------------------

/// The request carries the payment gateway's webhook secret.
pub struct WebhookAuth;

impl FromRequestParts<AppState> for WebhookAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let webhook = state.config.webhook.read().await;
        let check = check_shared_secret(
            header(parts, AUTHORIZATION_HEADER),
            header(parts, WEBHOOK_SECRET_HEADER),
            &webhook.secret,
        );
        drop(webhook);

        match check {
            SecretCheck::Valid => Ok(WebhookAuth),
            SecretCheck::Missing => {
                tracing::warn!(path = %parts.uri.path(), "Webhook delivery without credentials");
                Err(AuthError::MissingSecret)
            }
            SecretCheck::Mismatch => {
                tracing::warn!(path = %parts.uri.path(), "Webhook delivery with a wrong secret");
                Err(AuthError::InvalidSecret)
            }
        }
    }
}

/// The request carries the internal service secret.
pub struct InternalAuth;

fn verify_internal_secret(provided: &str, secret_hash: &str) -> bool {
    use argon2::{Argon2, PasswordHash, PasswordVerifier};

    match PasswordHash::new(secret_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(provided.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Stored internal secret hash is malformed");
            false
        }
    }
}

impl FromRequestParts<AppState> for InternalAuth {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let provided = header(parts, INTERNAL_SECRET_HEADER)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::MissingSecret)?;

        let secret_hash = state.config.internal.read().await.secret_hash.clone();
        if verify_internal_secret(provided, &secret_hash) {
            Ok(InternalAuth)
        } else {
            tracing::warn!(path = %parts.uri.path(), "Internal route called with a wrong secret");
            Err(AuthError::InvalidSecret)
        }
    }
}

/// The TCP peer of the request is on the loopback interface.
pub struct LoopbackPeer(pub SocketAddr);

impl FromRequestParts<AppState> for LoopbackPeer {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let ConnectInfo(addr) = ConnectInfo::<SocketAddr>::from_request_parts(parts, state)
            .await
            .map_err(|_| AuthError::NotLoopback)?;

        if addr.ip().to_canonical().is_loopback() {
            Ok(LoopbackPeer(addr))
        } else {
            tracing::warn!(peer = %addr, path = %parts.uri.path(), "Loopback-only route called remotely");
            Err(AuthError::NotLoopback)
        }
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// A signed-in storefront user.
pub struct BearerUser(pub SessionUser);

/// A signed-in user holding the `admin` role.
pub struct AdminUser(pub SessionUser);

/// `Ok(None)` when no `Authorization` header is present at all.
async fn session_from_parts(
    parts: &Parts,
    state: &AppState,
) -> Result<Option<SessionUser>, AuthError> {
    let Some(value) = header(parts, AUTHORIZATION_HEADER) else {
        return Ok(None);
    };
    let token = bearer_token(value).ok_or(AuthError::InvalidToken)?;
    match state.repo.find_session(hash_session_token(token)).await? {
        Some(user) => Ok(Some(user)),
        None => Err(AuthError::InvalidToken),
    }
}

impl FromRequestParts<AppState> for BearerUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        session_from_parts(parts, state)
            .await?
            .map(BearerUser)
            .ok_or(AuthError::MissingToken)
    }
}

impl OptionalFromRequestParts<AppState> for BearerUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(session_from_parts(parts, state).await?.map(BearerUser))
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let BearerUser(user) =
            <BearerUser as FromRequestParts<AppState>>::from_request_parts(parts, state).await?;
        if !user.is_admin {
            tracing::warn!(user_id = %user.user_id, path = %parts.uri.path(), "Non-admin on admin route");
            return Err(AuthError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}

// ---------------------------------------------------------------------------
// Body
// ---------------------------------------------------------------------------

/// `Json<T>` whose rejections are reported as `400` with an error body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new(rejection.body_text())),
            )),
        }
    }
}
