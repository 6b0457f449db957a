//! Caller identity extractor.
//!
//! Validates the Bearer token in the Authorization header and registers the
//! caller's id/username pair in the user directory.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use domain::models::user::Caller;
use domain::services::StoreError;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;

/// Authenticated caller from a verified JWT.
#[derive(Debug, Clone)]
pub struct UserAuth {
    /// User ID from the JWT subject claim.
    pub user_id: Uuid,
    pub username: String,
    /// JWT ID (jti) for log correlation.
    pub jti: String,
}

impl UserAuth {
    pub fn caller(&self) -> Caller {
        Caller::new(self.user_id, self.username.clone())
    }
}

fn bearer_token(parts: &Parts) -> Result<Option<&str>, ApiError> {
    let Some(header) = parts.headers.get("Authorization") else {
        return Ok(None);
    };
    let header = header
        .to_str()
        .map_err(|_| ApiError::Unauthorized("Invalid Authorization header".to_string()))?;
    header
        .strip_prefix("Bearer ")
        .map(|token| Some(token.trim()))
        .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header format".to_string()))
}

async fn authenticate(token: &str, state: &AppState) -> Result<UserAuth, ApiError> {
    let claims = state.jwt.validate_access_token(token)?;
    let user_id = shared::jwt::extract_user_id(&claims)?;

    state
        .register_caller(user_id, &claims.username)
        .await
        .map_err(|e| match e {
            StoreError::Conflict(_) => ApiError::Unauthorized(
                "Username is already bound to another user".to_string(),
            ),
            other => other.into(),
        })?;

    Ok(UserAuth {
        user_id,
        username: claims.username,
        jti: claims.jti,
    })
}

#[async_trait]
impl FromRequestParts<AppState> for UserAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(auth) = parts.extensions.get::<UserAuth>() {
            return Ok(auth.clone());
        }

        let token = bearer_token(parts)?
            .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;
        let auth = authenticate(token, state).await?;

        parts.extensions.insert(auth.clone());
        Ok(auth)
    }
}

/// Optional caller identity.
///
/// A missing header yields `None`; a header that is present but invalid is
/// still rejected, so a bad token is never silently downgraded to anonymous.
#[derive(Debug, Clone)]
pub struct OptionalUserAuth(pub Option<UserAuth>);

#[async_trait]
impl FromRequestParts<AppState> for OptionalUserAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let has_token = bearer_token(parts)?.is_some();
        if !has_token {
            return Ok(OptionalUserAuth(None));
        }

        let auth = UserAuth::from_request_parts(parts, state).await?;
        Ok(OptionalUserAuth(Some(auth)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/v1/groups");
        if let Some(value) = header {
            builder = builder.header("Authorization", value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_token_missing_header() {
        assert!(bearer_token(&parts_with(None)).unwrap().is_none());
    }

    #[test]
    fn test_bearer_token_extracted() {
        let parts = parts_with(Some("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&parts).unwrap(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_non_bearer_scheme_is_rejected() {
        let parts = parts_with(Some("Basic dXNlcjpwYXNz"));
        assert!(matches!(bearer_token(&parts), Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn test_caller_from_auth() {
        let auth = UserAuth {
            user_id: Uuid::nil(),
            username: "alice".to_string(),
            jti: "jti".to_string(),
        };
        assert_eq!(auth.caller(), Caller::new(Uuid::nil(), "alice"));
    }
}
