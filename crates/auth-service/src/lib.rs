//! User accounts and bearer tokens.
//!
//! Accounts live in SQLite behind [`UserRepository`]; passwords are hashed
//! with Argon2 and sessions are stateless HS256 tokens whose subject is the
//! username.

pub mod config;
pub mod crypto;
pub mod error;
pub mod models;
pub mod repository;
pub mod routes;
pub mod service;
pub mod state;

pub use config::AuthConfig;
pub use error::ApiError;
pub use models::{LoginForm, RegisterRequest, TokenResponse, User};
pub use repository::{SqliteUserRepository, UserRepository};
pub use service::AuthService;
pub use state::AuthState;
