use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::db::SessionUser;
use crate::errors::AppError;
use crate::routes::AppState;

/// Cookie names the auth service uses for its session token.
const SESSION_COOKIES: [&str; 2] = [
    "better-auth.session_token",
    "__Secure-better-auth.session_token",
];

/// The authenticated caller. Rejects with 401 when no valid session exists.
pub struct AuthUser(pub SessionUser);

/// An authenticated caller with the `admin` role. Rejects with 403 otherwise.
pub struct AdminUser(pub SessionUser);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers).ok_or_else(unauthorized)?;
        let user = state
            .sessions
            .find_user_by_token(&token)
            .await?
            .ok_or_else(unauthorized)?;
        Ok(AuthUser(user))
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AppError::Forbidden(
                "You are not allowed to access this resource".to_string(),
            ));
        }
        Ok(AdminUser(user))
    }
}

fn unauthorized() -> AppError {
    AppError::Unauthorized("You are not allowed to access this resource".to_string())
}

/// Session token from `Authorization: Bearer` or from the session cookie.
/// Signed cookie values look like `<token>.<signature>`.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| SESSION_COOKIES.contains(name))
        .map(|(_, value)| value.split('.').next().unwrap_or_default().trim().to_string())
        .filter(|t| !t.is_empty())
}
