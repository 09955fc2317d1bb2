use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
    http::StatusCode,
};
use busconnect_core::identity::{Caller, Role};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: String,
    pub exp: usize,
}

impl UserClaims {
    pub fn into_caller(self) -> Option<Caller> {
        let role = Role::parse(&self.role)?;
        let caller = Caller::new(self.sub, role);
        Some(match self.email {
            Some(email) => caller.with_email(email),
            None => caller,
        })
    }
}

// ============================================================================
// Bearer Authentication Middleware
// ============================================================================

/// Validates the bearer token and puts the resulting `Caller` into request
/// extensions for handlers to pick up.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Extract token from Authorization header
    let token = req.headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // 2. Decode and validate JWT
    let token_data = decode::<UserClaims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    ).map_err(|e| {
        tracing::debug!("Rejected bearer token: {}", e);
        StatusCode::UNAUTHORIZED
    })?;

    // 3. Unknown roles are not callers
    let caller = token_data.claims.into_caller().ok_or(StatusCode::FORBIDDEN)?;

    req.extensions_mut().insert(caller);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_to_caller() {
        let claims = UserClaims {
            sub: "user-1".to_string(),
            email: Some("user-1@st.ug.edu.gh".to_string()),
            role: "student".to_string(),
            exp: 0,
        };
        let caller = claims.into_caller().unwrap();
        assert_eq!(caller.role, Role::Student);
        assert_eq!(caller.email.as_deref(), Some("user-1@st.ug.edu.gh"));

        let unknown = UserClaims {
            sub: "user-2".to_string(),
            email: None,
            role: "SUPER_ADMIN".to_string(),
            exp: 0,
        };
        assert!(unknown.into_caller().is_none());
    }
}
