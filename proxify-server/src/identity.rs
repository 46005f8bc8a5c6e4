//! Caller identity.
//!
//! Authentication happens upstream. The gateway forwards the authenticated
//! user in `X-User-Id` and their role in `X-User-Role`.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

use proxify_core::UserId;

use crate::api::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Roles that may vote on reports.
const MODERATOR_ROLES: &[&str] = &["moderator", "admin"];

/// The authenticated user making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub is_moderator: bool,
}

impl Caller {
    pub fn user(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            is_moderator: false,
        }
    }

    pub fn moderator(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            is_moderator: true,
        }
    }

    /// Returns `None` if the user id header is missing or blank.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let user_id = headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())?;

        let is_moderator = headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|role| {
                let role = role.trim();
                MODERATOR_ROLES
                    .iter()
                    .any(|allowed| role.eq_ignore_ascii_case(allowed))
            })
            .unwrap_or(false);

        Some(Self {
            user_id: UserId::from(user_id),
            is_moderator,
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Caller::from_headers(&parts.headers).ok_or(ApiError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_static(value));
        }
        headers
    }

    #[test]
    fn test_missing_user_id_is_anonymous() {
        assert_eq!(Caller::from_headers(&headers(&[])), None);
        assert_eq!(
            Caller::from_headers(&headers(&[(USER_ID_HEADER, "  ")])),
            None
        );
    }

    #[test]
    fn test_plain_user() {
        let caller = Caller::from_headers(&headers(&[(USER_ID_HEADER, "alice")])).unwrap();
        assert_eq!(caller, Caller::user("alice"));
    }

    #[test]
    fn test_moderator_and_admin_roles_may_vote() {
        for role in ["moderator", "admin", "Admin"] {
            let caller = Caller::from_headers(&headers(&[
                (USER_ID_HEADER, "mod-1"),
                (USER_ROLE_HEADER, role),
            ]))
            .unwrap();
            assert!(caller.is_moderator, "role {role} should moderate");
        }
    }

    #[test]
    fn test_other_roles_may_not_vote() {
        let caller = Caller::from_headers(&headers(&[
            (USER_ID_HEADER, "bob"),
            (USER_ROLE_HEADER, "user"),
        ]))
        .unwrap();
        assert!(!caller.is_moderator);
    }
}
