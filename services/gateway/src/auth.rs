//! Bearer token authentication
//!
//! Tokens are HS256 JWTs signed with the shared `API_SECRET`. `exp` and `sub`
//! are required; `sub` identifies the caller in audit entries.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ApiError;
use crate::request_id::RequestId;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
}

/// Authenticated caller, inserted into request extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub String);

pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.key, &self.validation).map(|data| data.claims)
    }
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub async fn require_bearer(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let request_id = RequestId::from_extensions(req.extensions());

    let claims = match bearer_token(&req).map(|token| state.auth.verify(token)) {
        Some(Ok(claims)) => claims,
        Some(Err(e)) => {
            debug!(request_id = %request_id, "Rejected bearer token: {}", e);
            return ApiError::Unauthorized.for_request(&request_id).into_response();
        }
        None => return ApiError::Unauthorized.for_request(&request_id).into_response(),
    };

    req.extensions_mut().insert(Caller(claims.sub));
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(secret: &str, exp: u64) -> String {
        let claims = Claims {
            sub: "ops@warpify.io".to_string(),
            exp,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn in_one_hour() -> u64 {
        (chrono::Utc::now().timestamp() + 3600) as u64
    }

    #[test]
    fn test_valid_token() {
        let verifier = TokenVerifier::new("s3cret");
        let claims = verifier.verify(&token("s3cret", in_one_hour())).unwrap();
        assert_eq!(claims.sub, "ops@warpify.io");
    }

    #[test]
    fn test_wrong_secret_and_expired() {
        let verifier = TokenVerifier::new("s3cret");
        assert!(verifier.verify(&token("other", in_one_hour())).is_err());
        assert!(verifier.verify(&token("s3cret", 1_000)).is_err());
        assert!(verifier.verify("not.a.jwt").is_err());
    }
}
