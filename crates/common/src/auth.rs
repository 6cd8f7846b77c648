//! Bearer-token plumbing shared by the auth routes and the face service.

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// JWT Claims structure matching auth-service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthClaims {
    pub sub: String, // username
    pub exp: i64,
    pub iat: i64,
}

/// Extract the bearer token from the Authorization header.
pub fn extract_token(headers: &HeaderMap) -> Option<&str> {
    let auth_str = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = auth_str.split_once(' ')?;
    let token = token.trim();

    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/// Verify an HS256 token and return its claims.
///
/// Expiry is enforced; a token without a subject is rejected.
pub fn verify_jwt_local(token: &str, jwt_secret: &str) -> Result<AuthClaims, String> {
    use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

    let token_data = decode::<AuthClaims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| format!("Invalid JWT: {}", e))?;

    if token_data.claims.sub.is_empty() {
        return Err("Invalid JWT: empty subject".to_string());
    }

    Ok(token_data.claims)
}

/// 401 carrying the `WWW-Authenticate: Bearer` challenge.
pub fn unauthorized_response(message: &str) -> Response {
    let mut response = (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::safe_unix_timestamp;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(sub: &str, exp_offset: i64, secret: &str) -> String {
        let now = safe_unix_timestamp() as i64;
        let claims = AuthClaims {
            sub: sub.to_string(),
            exp: now + exp_offset,
            iat: now,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(extract_token(&headers("Bearer abc")), Some("abc"));
        assert_eq!(extract_token(&headers("bearer abc")), Some("abc"));
        assert_eq!(extract_token(&headers("Basic abc")), None);
        assert_eq!(extract_token(&headers("Bearer ")), None);
        assert_eq!(extract_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_verify_jwt_local() {
        let claims = verify_jwt_local(&token("alice", 600, "secret"), "secret").unwrap();
        assert_eq!(claims.sub, "alice");

        assert!(verify_jwt_local(&token("alice", 600, "other"), "secret").is_err());
        assert!(verify_jwt_local(&token("alice", -3600, "secret"), "secret").is_err());
        assert!(verify_jwt_local(&token("", 600, "secret"), "secret").is_err());
        assert!(verify_jwt_local("not.a.jwt", "secret").is_err());
    }

    #[test]
    fn test_unauthorized_response_has_challenge() {
        let response = unauthorized_response("Could not validate credentials");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }
}
