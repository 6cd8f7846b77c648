use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

use crate::models::User;

/// Persistence for user accounts.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new account. Fails with a unique violation if the username
    /// is already taken.
    async fn create_user(&self, username: &str, hashed_password: &str) -> Result<User, sqlx::Error>;

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error>;

    async fn health_check(&self) -> bool {
        true
    }
}

pub struct SqliteUserRepository {
    pool: Pool<Sqlite>,
}

impl SqliteUserRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `database_url` and apply
    /// migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid DATABASE_URL: {database_url}"))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to connect to database")?;

        Self::migrated(pool).await
    }

    /// Private in-memory database, gone when the repository is dropped.
    pub async fn in_memory() -> Result<Self> {
        // Every connection to :memory: is its own database, so pin the pool
        // to a single connection that never expires.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("failed to open in-memory database")?;

        Self::migrated(pool).await
    }

    async fn migrated(pool: Pool<Sqlite>) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run migrations")?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create_user(&self, username: &str, hashed_password: &str) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, hashed_password)
            VALUES (?1, ?2)
            RETURNING id, username, hashed_password
            "#,
        )
        .bind(username)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, hashed_password FROM users WHERE username = ?1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
    }

    async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
