use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use common::auth::AuthClaims;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("failed to hash password: {}", e))?
        .to_string();
    Ok(password_hash)
}

/// Verify a password against its hash
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| anyhow!("failed to parse password hash: {}", e))?;
    let argon2 = Argon2::default();
    Ok(argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Issue a token for `username` valid for `expiration_secs`.
pub fn generate_jwt(username: &str, jwt_secret: &str, expiration_secs: i64) -> Result<String> {
    let now = Utc::now().timestamp();
    let claims = AuthClaims {
        sub: username.to_string(),
        exp: now + expiration_secs,
        iat: now,
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .context("failed to encode JWT")?;

    Ok(token)
}

/// Verify and decode a JWT token
pub fn verify_jwt(token: &str, jwt_secret: &str) -> Result<AuthClaims> {
    common::auth::verify_jwt_local(token, jwt_secret).map_err(|e| anyhow!(e))
}
