use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    config::AuthConfig,
    crypto,
    error::ApiError,
    models::*,
    repository::UserRepository,
};

const DUPLICATE_USERNAME: &str = "Username already registered";
const INVALID_CREDENTIALS: &str = "Invalid username or password";
const INVALID_TOKEN: &str = "Could not validate credentials";

fn record(operation: &str, status: &str) {
    telemetry::metrics::AUTH_OPERATIONS
        .with_label_values(&[operation, status])
        .inc();
}

pub struct AuthService {
    repo: Arc<dyn UserRepository>,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(repo: Arc<dyn UserRepository>, config: AuthConfig) -> Self {
        Self { repo, config }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub async fn health_check(&self) -> bool {
        self.repo.health_check().await
    }

    // ===== Registration =====

    pub async fn register(&self, req: RegisterRequest) -> Result<User, ApiError> {
        let result = self.register_inner(req).await;
        record("register", if result.is_ok() { "success" } else { "failure" });
        result
    }

    async fn register_inner(&self, req: RegisterRequest) -> Result<User, ApiError> {
        common::validation::validate_username(&req.username)
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        common::validation::validate_password(&req.password)
            .map_err(|e| ApiError::bad_request(e.to_string()))?;

        if self.repo.get_user_by_username(&req.username).await?.is_some() {
            return Err(ApiError::bad_request(DUPLICATE_USERNAME));
        }

        let hashed_password = crypto::hash_password(&req.password)?;

        let user = match self.repo.create_user(&req.username, &hashed_password).await {
            Ok(user) => user,
            // Lost a race with a concurrent registration of the same name.
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(ApiError::bad_request(DUPLICATE_USERNAME));
            }
            Err(e) => return Err(e.into()),
        };

        info!(user_id = user.id, username = %user.username, "user registered");
        Ok(user)
    }

    // ===== Authentication =====

    pub async fn login(&self, form: LoginForm) -> Result<TokenResponse, ApiError> {
        let result = self.login_inner(form).await;
        record("login", if result.is_ok() { "success" } else { "failure" });
        result
    }

    async fn login_inner(&self, form: LoginForm) -> Result<TokenResponse, ApiError> {
        let user = self
            .repo
            .get_user_by_username(&form.username)
            .await?
            .ok_or_else(|| ApiError::bad_request(INVALID_CREDENTIALS))?;

        if !crypto::verify_password(&form.password, &user.hashed_password)? {
            warn!(username = %user.username, "login with wrong password");
            return Err(ApiError::bad_request(INVALID_CREDENTIALS));
        }

        let access_token = crypto::generate_jwt(
            &user.username,
            &self.config.jwt_secret,
            self.config.jwt_expiration_secs,
        )?;

        info!(username = %user.username, "user logged in");
        Ok(TokenResponse {
            access_token,
            token_type: "bearer".to_string(),
        })
    }

    /// Resolve a bearer token to a live account.
    ///
    /// Invalid or expired tokens, and tokens whose account no longer exists,
    /// are all `Unauthorized`.
    pub async fn current_user(&self, token: &str) -> Result<User, ApiError> {
        let result = self.current_user_inner(token).await;
        record("verify", if result.is_ok() { "success" } else { "failure" });
        result
    }

    async fn current_user_inner(&self, token: &str) -> Result<User, ApiError> {
        let claims = crypto::verify_jwt(token, &self.config.jwt_secret).map_err(|e| {
            tracing::debug!(error = %e, "bearer token rejected");
            ApiError::unauthorized(INVALID_TOKEN)
        })?;

        self.repo
            .get_user_by_username(&claims.sub)
            .await?
            .ok_or_else(|| ApiError::unauthorized(INVALID_TOKEN))
    }
}
