use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::{debug, warn};

use crate::{error::AppError, state::AppState};

/// Authenticated caller, resolved from the bearer token's subject.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub email: String,
}

/// Pulls the token out of `Authorization: Bearer <token>`.
pub(crate) fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            debug!("missing bearer token");
            return Err(AppError::Unauthorized);
        };

        let email = state.keys.decode(token).map_err(|e| {
            debug!(reason = %e, "token rejected");
            AppError::Unauthorized
        })?;

        if state.config.verify_user_on_request {
            match state.users.find_by_email(&email).await? {
                Some(user) if user.is_active => {}
                Some(_) => {
                    warn!(%email, "token subject is inactive");
                    return Err(AppError::Unauthorized);
                }
                None => {
                    warn!(%email, "token subject no longer exists");
                    return Err(AppError::Unauthorized);
                }
            }
        }

        Ok(AuthUser { email })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/files");
        if let Some(h) = header {
            builder = builder.header(AUTHORIZATION, h);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn extracts_bearer_token() {
        assert_eq!(bearer_token(&parts_with(Some("Bearer abc.def"))), Some("abc.def"));
        assert_eq!(bearer_token(&parts_with(Some("bearer abc.def"))), Some("abc.def"));
    }

    #[test]
    fn rejects_other_schemes_and_empty_tokens() {
        assert_eq!(bearer_token(&parts_with(None)), None);
        assert_eq!(bearer_token(&parts_with(Some("Basic dXNlcjpwYXNz"))), None);
        assert_eq!(bearer_token(&parts_with(Some("Bearer "))), None);
        assert_eq!(bearer_token(&parts_with(Some("Bearer"))), None);
    }
}
