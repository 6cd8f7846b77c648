//! Face recognition service workspace.
//!
//! The crates are re-exported so integration tests and embedders can depend
//! on a single package.

pub use auth_service;
pub use common;
pub use face_core;
pub use face_service;
pub use telemetry;
